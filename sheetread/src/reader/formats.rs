//! Number formats, styles and serial-date conversion

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::workbook::{CellValue, Number};

/// Epoch used to interpret serial day numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSystem {
    /// Day 1 is 1900-01-01, with the phantom 1900-02-29
    #[default]
    V1900,
    /// Day 0 is 1904-01-01
    V1904,
}

/// Built-in number format ids that render dates, times or durations
const BUILTIN_DATE_IDS: &[u32] = &[
    14, 15, 16, 17, 18, 19, 20, 21, 22, // short/long date and time
    27, 28, 29, 30, 31, 32, 33, 34, 35, 36, // East Asian dates
    45, 46, 47, // mm:ss, [h]:mm:ss, mmss.0
    50, 51, 52, 53, 54, 55, 56, 57, 58, // East Asian dates
];

/// Built-in codes (simplified subset)
/// See https://github.com/dtjohnson/xlsx-populate/blob/master/lib/NumFmt.js
const BUILTIN_FORMATS: &[(u32, &str)] = &[
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (3, "#,##0"),
    (4, "#,##0.00"),
    (9, "0%"),
    (10, "0.00%"),
    (11, "0.00E+00"),
    (12, "# ?/?"),
    (13, "# ??/??"),
    (14, "mm-dd-yy"),
    (15, "d-mmm-yy"),
    (16, "d-mmm"),
    (17, "mmm-yy"),
    (18, "h:mm AM/PM"),
    (19, "h:mm:ss AM/PM"),
    (20, "h:mm"),
    (21, "h:mm:ss"),
    (22, "m/d/yy h:mm"),
    (37, "#,##0 ;(#,##0)"),
    (38, "#,##0 ;[Red](#,##0)"),
    (39, "#,##0.00;(#,##0.00)"),
    (40, "#,##0.00;[Red](#,##0.00)"),
    (45, "mm:ss"),
    (46, "[h]:mm:ss"),
    (47, "mmss.0"),
    (48, "##0.0E+0"),
    (49, "@"),
];

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""[^"]*""#).unwrap());
// Backslash-escaped literal, or the character following `_` (padding) / `*` (fill)
static ESCAPED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\\_*].").unwrap());
static NUMERIC_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0#?,.%$€£¥Ee+\-()/\s;]*$").unwrap());
static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)[ymdhs]").unwrap());

/// Decide whether a number format renders a date or time.
pub fn is_date_format(format_id: u32, format_code: Option<&str>) -> bool {
    if BUILTIN_DATE_IDS.contains(&format_id) {
        return true;
    }
    format_code.is_some_and(is_date_format_code)
}

/// Heuristic check on a format code string
pub fn is_date_format_code(code: &str) -> bool {
    let trimmed = code.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("general") || trimmed == "@" {
        return false;
    }
    let stripped = BRACKETED.replace_all(trimmed, "");
    let stripped = QUOTED.replace_all(&stripped, "");
    let stripped = ESCAPED.replace_all(&stripped, "");
    if NUMERIC_ONLY.is_match(&stripped) {
        return false;
    }
    DATE_TOKEN.is_match(&stripped)
}

fn epoch(system: DateSystem) -> Option<NaiveDateTime> {
    let date = match system {
        DateSystem::V1900 => NaiveDate::from_ymd_opt(1899, 12, 30)?,
        DateSystem::V1904 => NaiveDate::from_ymd_opt(1904, 1, 1)?,
    };
    date.and_hms_opt(0, 0, 0)
}

/// Convert a serial day number to a calendar timestamp.
///
/// In the 1900 system serials below 1 are invalid and serials below 60 are
/// shifted by one day, because serial 60 stands for the non-existent
/// 1900-02-29.
pub fn excel_serial_to_datetime(serial: f64, system: DateSystem) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let serial = match system {
        DateSystem::V1900 => {
            if serial < 1.0 {
                return None;
            }
            if serial < 60.0 { serial + 1.0 } else { serial }
        }
        DateSystem::V1904 => {
            if serial < 0.0 {
                return None;
            }
            serial
        }
    };
    let days = serial.floor();
    let fraction = serial - days;
    // Beyond the calendar range chrono can represent
    if days > 3_000_000.0 {
        return None;
    }
    let seconds = days as i64 * 86_400 + (fraction * 86_400.0).round() as i64;
    epoch(system)?.checked_add_signed(Duration::try_seconds(seconds)?)
}

/// Render a number with one of the common built-in numeric codes.
/// Returns `None` for codes that are not handled here.
pub fn render_number(value: f64, format_code: &str) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    match format_code {
        "0" => Some(format!("{value:.0}")),
        "0.00" => Some(format!("{value:.2}")),
        "#,##0" => Some(group_thousands(&format!("{value:.0}"))),
        "#,##0.00" => Some(group_thousands(&format!("{value:.2}"))),
        "0%" => Some(format!("{:.0}%", value * 100.0)),
        "0.00%" => Some(format!("{:.2}%", value * 100.0)),
        _ => None,
    }
}

fn group_thousands(plain: &str) -> String {
    let (sign, digits) = match plain.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", plain),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Append-only pool of strings referenced by index from cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedStringTable {
    strings: Vec<String>,
}

impl SharedStringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string and return its index
    pub fn push(&mut self, value: String) -> usize {
        self.strings.push(value);
        self.strings.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Format id to format code, seeded with the built-in codes
#[derive(Debug, Clone, PartialEq)]
pub struct NumberFormatTable {
    codes: HashMap<u32, String>,
}

impl Default for NumberFormatTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NumberFormatTable {
    pub fn new() -> Self {
        let codes = BUILTIN_FORMATS
            .iter()
            .map(|(id, code)| (*id, code.to_string()))
            .collect();
        Self { codes }
    }

    /// Overlay a format declared by the file
    pub fn insert(&mut self, id: u32, code: impl Into<String>) {
        self.codes.insert(id, code.into());
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.codes.get(&id).map(String::as_str)
    }

    pub fn is_date(&self, id: u32) -> bool {
        is_date_format(id, self.get(id))
    }
}

/// Style index to format id, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellFormatTable {
    format_ids: Vec<u32>,
}

impl CellFormatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, format_id: u32) {
        self.format_ids.push(format_id);
    }

    pub fn format_id(&self, style: usize) -> Option<u32> {
        self.format_ids.get(style).copied()
    }

    pub fn len(&self) -> usize {
        self.format_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.format_ids.is_empty()
    }
}

/// Turns raw numbers into cell values through the style -> format indirection
#[derive(Debug, Clone, Default)]
pub struct NumberResolver {
    pub formats: NumberFormatTable,
    pub styles: CellFormatTable,
    pub date_system: DateSystem,
    pub convert_dates: bool,
}

impl NumberResolver {
    pub fn new(convert_dates: bool) -> Self {
        Self {
            convert_dates,
            ..Self::default()
        }
    }

    /// Format id behind a style index; unknown styles resolve to nothing
    pub fn format_id(&self, style: usize) -> Option<u32> {
        self.styles.format_id(style)
    }

    pub fn is_date_style(&self, style: usize) -> bool {
        self.format_id(style)
            .is_some_and(|id| self.formats.is_date(id))
    }

    /// Resolve a number and its optional pre-rendered string
    pub fn resolve(&self, value: f64, style: usize) -> (CellValue, Option<String>) {
        if self.convert_dates && self.is_date_style(style) {
            if let Some(dt) = excel_serial_to_datetime(value, self.date_system) {
                return (CellValue::Temporal(dt), None);
            }
        }
        let formatted = self
            .format_id(style)
            .and_then(|id| self.formats.get(id))
            .and_then(|code| render_number(value, code));
        (CellValue::Number(Number::from_f64(value)), formatted)
    }
}
