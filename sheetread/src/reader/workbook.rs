//! Workbook data structures

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;

use super::formats::DateSystem;
use super::parser_utils::{column_index, column_letters, parse_cell_ref};

/// Rendering pattern for calendar values
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Numeric cell payload, integral whenever the value is exactly whole
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Normalize a raw float: whole values that fit `i64` become integers.
    pub fn from_f64(value: f64) -> Self {
        // 2^63 is exactly representable; anything at or above it overflows i64
        const LIMIT: f64 = 9_223_372_036_854_775_808.0;
        if value.is_finite() && value.fract() == 0.0 && value >= -LIMIT && value < LIMIT {
            Number::Int(value as i64)
        } else {
            Number::Float(value)
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Cell value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(Number),
    Boolean(bool),
    Temporal(NaiveDateTime),
    /// Cached result of a formula; never nests another `FormulaCached`
    FormulaCached(Box<CellValue>),
}

/// Type tag of a [`CellValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    Empty,
    Text,
    Number,
    Boolean,
    Temporal,
    Formula,
}

impl CellValue {
    /// Build a numeric value, normalizing whole floats to integers
    pub fn number(value: f64) -> Self {
        CellValue::Number(Number::from_f64(value))
    }

    /// Wrap a resolved value as a cached formula result.
    /// Empty results stay empty; already-wrapped values are not wrapped twice.
    pub fn formula_cached(value: CellValue) -> Self {
        match value {
            CellValue::Empty => CellValue::Empty,
            v @ CellValue::FormulaCached(_) => v,
            v => CellValue::FormulaCached(Box::new(v)),
        }
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            CellValue::Empty => CellType::Empty,
            CellValue::Text(_) => CellType::Text,
            CellValue::Number(_) => CellType::Number,
            CellValue::Boolean(_) => CellType::Boolean,
            CellValue::Temporal(_) => CellType::Temporal,
            CellValue::FormulaCached(_) => CellType::Formula,
        }
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// The value with any formula wrapper removed
    pub fn resolved(&self) -> &CellValue {
        match self {
            CellValue::FormulaCached(inner) => inner.resolved(),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.resolved() {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.resolved() {
            CellValue::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Temporal(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            CellValue::FormulaCached(inner) => write!(f, "{inner}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Number(Number::Int(i))
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

/// Represents a single cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    row: u32,
    col: u32,
    value: CellValue,
    formatted: Option<String>,
}

impl Cell {
    /// `row` is 1-based, `col` is 0-based
    pub(crate) fn new(row: u32, col: u32, value: CellValue) -> Self {
        Self {
            row,
            col,
            value,
            formatted: None,
        }
    }

    pub(crate) fn with_formatted(mut self, formatted: Option<String>) -> Self {
        self.formatted = formatted;
        self
    }

    pub fn value(&self) -> &CellValue {
        &self.value
    }

    pub fn cell_type(&self) -> CellType {
        self.value.cell_type()
    }

    /// 1-based row number
    pub fn row(&self) -> u32 {
        self.row
    }

    /// 0-based column index
    pub fn column(&self) -> u32 {
        self.col
    }

    pub fn column_letter(&self) -> String {
        column_letters(self.col)
    }

    /// Coordinate such as `"B3"`
    pub fn coordinate(&self) -> String {
        format!("{}{}", column_letters(self.col), self.row)
    }

    /// Explicit formatted value if one was rendered during decode
    pub fn formatted(&self) -> Option<&str> {
        self.formatted.as_deref()
    }

    /// Display string: the pre-rendered value if any, else the value's natural form
    pub fn formatted_value(&self) -> String {
        match &self.formatted {
            Some(s) => s.clone(),
            None => self.value.to_string(),
        }
    }
}

/// Sparse row of cells keyed by 0-based column
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    index: u32,
    cells: BTreeMap<u32, Cell>,
}

impl Row {
    fn new(index: u32) -> Self {
        Self {
            index,
            cells: BTreeMap::new(),
        }
    }

    /// 1-based row index
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn cell(&self, col: u32) -> Option<&Cell> {
        self.cells.get(&col)
    }

    pub fn cell_by_letter(&self, letters: &str) -> Option<&Cell> {
        column_index(letters).and_then(|col| self.cells.get(&col))
    }

    /// Populated cells in column order
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Highest populated column in this row
    pub fn highest_column(&self) -> Option<u32> {
        self.cells.keys().next_back().copied()
    }

    /// Dense values from column 0 up to `max_col` (or the row's own highest
    /// column), gaps filled with `CellValue::Empty`.
    pub fn to_array(&self, max_col: Option<u32>) -> Vec<CellValue> {
        let Some(last) = max_col.or_else(|| self.highest_column()) else {
            return Vec::new();
        };
        (0..=last)
            .map(|col| {
                self.cells
                    .get(&col)
                    .map(|c| c.value.clone())
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// Visibility state declared for a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetVisibility {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

/// One keyed record produced by [`Worksheet::to_associative_array`]
pub type Record = Vec<(String, CellValue)>;

/// Represents a worksheet
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    name: String,
    index: usize,
    visibility: SheetVisibility,
    rows: BTreeMap<u32, Row>,
    highest_row: u32,
    highest_column: Option<u32>,
}

impl Worksheet {
    pub(crate) fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            visibility: SheetVisibility::Visible,
            rows: BTreeMap::new(),
            highest_row: 0,
            highest_column: None,
        }
    }

    pub(crate) fn set_visibility(&mut self, visibility: SheetVisibility) {
        self.visibility = visibility;
    }

    /// Insert or replace a cell, keeping the running bounds current
    pub(crate) fn insert_cell(&mut self, cell: Cell) {
        let (row, col) = (cell.row, cell.col);
        self.rows
            .entry(row)
            .or_insert_with(|| Row::new(row))
            .cells
            .insert(col, cell);
        self.highest_row = self.highest_row.max(row);
        self.highest_column = Some(self.highest_column.map_or(col, |c| c.max(col)));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 0-based position of the sheet in its workbook
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn visibility(&self) -> SheetVisibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == SheetVisibility::Visible
    }

    /// Highest 1-based row index ever inserted, 0 for an empty sheet
    pub fn highest_row(&self) -> u32 {
        self.highest_row
    }

    /// Highest 0-based column index ever inserted
    pub fn highest_column(&self) -> Option<u32> {
        self.highest_column
    }

    pub fn highest_column_letter(&self) -> Option<String> {
        self.highest_column.map(column_letters)
    }

    pub fn row(&self, index: u32) -> Option<&Row> {
        self.rows.get(&index)
    }

    /// Stored rows in index order
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Get a cell at a 1-based row and 0-based column
    pub fn cell_at(&self, row: u32, col: u32) -> Option<&Cell> {
        self.rows.get(&row).and_then(|r| r.cell(col))
    }

    /// Get a cell by coordinate such as `"B3"`
    pub fn cell(&self, coordinate: &str) -> Option<&Cell> {
        let (row, col) = parse_cell_ref(coordinate)?;
        self.cell_at(row, col)
    }

    pub fn cell_count(&self) -> usize {
        self.rows.values().map(Row::len).sum()
    }

    /// Dense grid from row 1 to the highest row, every row padded to the
    /// highest column. Missing rows and cells become `CellValue::Empty`.
    pub fn to_array(&self) -> Vec<Vec<CellValue>> {
        let Some(max_col) = self.highest_column else {
            return Vec::new();
        };
        (1..=self.highest_row)
            .map(|r| match self.rows.get(&r) {
                Some(row) => row.to_array(Some(max_col)),
                None => vec![CellValue::Empty; max_col as usize + 1],
            })
            .collect()
    }

    /// Records keyed by the first stored row.
    ///
    /// An empty or missing header cell at column k gets the key `column_{k}`.
    pub fn to_associative_array(&self) -> Vec<Record> {
        let mut rows = self.rows.values();
        let Some(header) = rows.next() else {
            return Vec::new();
        };
        let width = self.highest_column.map_or(0, |c| c + 1);
        let keys: Vec<String> = (0..width)
            .map(|col| match header.cell(col).map(|c| c.value.to_string()) {
                Some(key) if !key.is_empty() => key,
                _ => format!("column_{col}"),
            })
            .collect();

        rows.map(|row| {
            keys.iter()
                .enumerate()
                .map(|(col, key)| {
                    let value = row
                        .cell(col as u32)
                        .map(|c| c.value.clone())
                        .unwrap_or_default();
                    (key.clone(), value)
                })
                .collect()
        })
        .collect()
    }
}

/// Represents a complete workbook
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workbook {
    source: String,
    date_system: DateSystem,
    sheets: BTreeMap<usize, Worksheet>,
}

impl Workbook {
    pub(crate) fn new(source: impl Into<String>, date_system: DateSystem) -> Self {
        Self {
            source: source.into(),
            date_system,
            sheets: BTreeMap::new(),
        }
    }

    pub(crate) fn insert_sheet(&mut self, sheet: Worksheet) {
        self.sheets.insert(sheet.index, sheet);
    }

    /// Path or name the workbook was decoded from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn date_system(&self) -> DateSystem {
        self.date_system
    }

    /// Get a sheet by its original 0-based index
    pub fn sheet(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(&index)
    }

    /// Get a sheet by name, ignoring case
    pub fn sheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        let wanted = name.to_lowercase();
        self.sheets
            .values()
            .find(|s| s.name.to_lowercase() == wanted)
    }

    /// Sheets in index order
    pub fn sheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.sheets.values()
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.values().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }
}
