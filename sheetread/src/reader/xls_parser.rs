//! Legacy binary workbook decoding (BIFF5/BIFF8 inside a compound file)

use log::{debug, warn};

use super::WorkbookDecoder;
use super::biff::{
    self, BiffVersion, Codepage, RecordReader, SstCursor, decode_rk, error_text, read_string,
    record,
};
use super::binary::{read_f64_le, read_u8, read_u16_le, read_u32_le};
use super::cfb::{CompoundFile, is_compound_file};
use super::formats::{DateSystem, NumberResolver, SharedStringTable};
use super::workbook::{Cell, CellValue, SheetVisibility, Workbook, Worksheet};
use crate::config::ReaderConfig;
use crate::error::{ReadError, Result};

/// Decoder for `.xls` compound files
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsDecoder;

impl WorkbookDecoder for XlsDecoder {
    fn name(&self) -> &str {
        "xls"
    }

    fn probe(&self, bytes: &[u8]) -> bool {
        is_compound_file(bytes)
    }

    fn decode(&self, bytes: &[u8], source: &str, config: &ReaderConfig) -> Result<Workbook> {
        let container = CompoundFile::parse(bytes, config.max_chain_length)?;
        let stream = container.workbook_stream()?;
        parse_workbook_stream(&stream, source, config)
    }

    fn list_sheet_names(&self, bytes: &[u8], config: &ReaderConfig) -> Result<Vec<String>> {
        let container = CompoundFile::parse(bytes, config.max_chain_length)?;
        let stream = container.workbook_stream()?;
        list_sheet_names(&stream)
    }
}

#[derive(Debug, Clone)]
struct BoundSheet {
    name: String,
    offset: usize,
    visibility: SheetVisibility,
    kind: u8,
}

impl BoundSheet {
    fn is_worksheet(&self) -> bool {
        self.kind == 0x00
    }
}

/// Everything the global substream declares
struct Globals {
    version: BiffVersion,
    codepage: Codepage,
    resolver: NumberResolver,
    strings: SharedStringTable,
    sheets: Vec<BoundSheet>,
}

/// Decode a workbook stream into a [`Workbook`]
pub fn parse_workbook_stream(
    stream: &[u8],
    source: &str,
    config: &ReaderConfig,
) -> Result<Workbook> {
    let globals = scan_globals(stream, config.convert_dates, false)?;
    let mut workbook = Workbook::new(source, globals.resolver.date_system);

    let worksheets = globals.sheets.iter().filter(|s| s.is_worksheet());
    for (index, bound) in worksheets.enumerate() {
        if !config.wants_sheet(&bound.name) {
            continue;
        }
        let mut sheet = Worksheet::new(bound.name.clone(), index);
        sheet.set_visibility(bound.visibility);
        SheetParser::new(&globals, &mut sheet).run(stream, bound.offset);
        debug!(
            "sheet '{}' decoded: {} cells, {} rows",
            sheet.name(),
            sheet.cell_count(),
            sheet.highest_row()
        );
        workbook.insert_sheet(sheet);
    }
    Ok(workbook)
}

/// Worksheet names in declaration order, without decoding any cells
pub fn list_sheet_names(stream: &[u8]) -> Result<Vec<String>> {
    let globals = scan_globals(stream, false, true)?;
    Ok(globals
        .sheets
        .into_iter()
        .filter(BoundSheet::is_worksheet)
        .map(|s| s.name)
        .collect())
}

fn scan_globals(stream: &[u8], convert_dates: bool, names_only: bool) -> Result<Globals> {
    let mut reader = RecordReader::new(stream);
    let bof = match reader.next_record() {
        Some(Ok(rec)) if rec.record_type == record::BOF => rec,
        Some(Err(e)) => return Err(e),
        _ => {
            return Err(ReadError::ContainerCorrupt(
                "workbook stream does not start with a BOF record".to_string(),
            ));
        }
    };
    let version = BiffVersion::from_bof(&bof.data).ok_or_else(|| {
        ReadError::UnsupportedFormat(format!(
            "BIFF version {:#06x} is not supported",
            read_u16_le(&bof.data, 0).unwrap_or(0)
        ))
    })?;

    let mut globals = Globals {
        version,
        codepage: Codepage::default(),
        resolver: NumberResolver::new(convert_dates),
        strings: SharedStringTable::new(),
        sheets: Vec::new(),
    };

    for rec in reader {
        let rec = match rec {
            Ok(rec) => rec,
            Err(e) => {
                warn!("global records cut short: {e}");
                break;
            }
        };
        match rec.record_type {
            record::EOF => break,
            record::CODEPAGE => {
                if let Some(id) = read_u16_le(&rec.data, 0) {
                    globals.codepage = Codepage::from_id(id);
                }
            }
            record::DATEMODE => {
                if read_u16_le(&rec.data, 0) == Some(1) {
                    globals.resolver.date_system = DateSystem::V1904;
                }
            }
            record::BOUNDSHEET => match parse_boundsheet(&rec.data, &globals) {
                Some(sheet) => globals.sheets.push(sheet),
                None => debug!("skipping malformed BOUNDSHEET at {}", rec.offset),
            },
            record::SST if !names_only => parse_sst(&rec, &mut globals.strings),
            record::FORMAT if !names_only => {
                let id = read_u16_le(&rec.data, 0);
                let code = read_string(
                    &rec.data,
                    2,
                    version == BiffVersion::Biff8,
                    version,
                    globals.codepage,
                );
                match (id, code) {
                    (Some(id), Some(code)) => globals.resolver.formats.insert(u32::from(id), code),
                    _ => debug!("skipping malformed FORMAT at {}", rec.offset),
                }
            }
            record::XF if !names_only => {
                let format_id = read_u16_le(&rec.data, 2).unwrap_or(0);
                globals.resolver.styles.push(u32::from(format_id));
            }
            _ => {}
        }
    }

    debug!(
        "globals: {:?}, {} sheets, {} shared strings, {} styles",
        globals.version,
        globals.sheets.len(),
        globals.strings.len(),
        globals.resolver.styles.len()
    );
    Ok(globals)
}

fn parse_boundsheet(data: &[u8], globals: &Globals) -> Option<BoundSheet> {
    let offset = read_u32_le(data, 0)? as usize;
    let visibility = match read_u8(data, 4)? & 0x03 {
        0 => SheetVisibility::Visible,
        1 => SheetVisibility::Hidden,
        _ => SheetVisibility::VeryHidden,
    };
    let kind = read_u8(data, 5)?;
    let name = read_string(data, 6, false, globals.version, globals.codepage)?;
    Some(BoundSheet {
        name,
        offset,
        visibility,
        kind,
    })
}

/// Fill the shared-string table; a damaged entry ends the table early
fn parse_sst(rec: &biff::Record, strings: &mut SharedStringTable) {
    let mut cursor = SstCursor::new(rec);
    let (Some(_total), Some(unique)) = (cursor.read_u32(), cursor.read_u32()) else {
        warn!("SST record too short for its header");
        return;
    };
    // Each entry needs at least three bytes
    let unique = (unique as usize).min(cursor.remaining() / 3);
    for i in 0..unique {
        match read_sst_entry(&mut cursor) {
            Some(text) => {
                strings.push(text);
            }
            None => {
                warn!("shared string table truncated after {i} of {unique} entries");
                return;
            }
        }
    }
}

fn read_sst_entry(cursor: &mut SstCursor<'_>) -> Option<String> {
    let count = cursor.read_u16()? as usize;
    let flags = cursor.read_u8()?;
    let runs = if flags & 0x08 != 0 {
        cursor.read_u16()? as usize
    } else {
        0
    };
    let ext_len = if flags & 0x04 != 0 {
        cursor.read_u32()? as usize
    } else {
        0
    };
    let text = cursor.read_chars(count, flags & 0x01 != 0)?;
    cursor.skip(runs * 4)?;
    cursor.skip(ext_len)?;
    Some(text)
}

/// Cell records of one sheet substream
struct SheetParser<'g, 's> {
    globals: &'g Globals,
    sheet: &'s mut Worksheet,
    /// FORMULA whose string result arrives in the next STRING record
    pending_formula: Option<(u32, u32)>,
}

impl<'g, 's> SheetParser<'g, 's> {
    fn new(globals: &'g Globals, sheet: &'s mut Worksheet) -> Self {
        Self {
            globals,
            sheet,
            pending_formula: None,
        }
    }

    fn run(&mut self, stream: &[u8], offset: usize) {
        let reader = match RecordReader::at(stream, offset) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("sheet '{}' has no record block: {e}", self.sheet.name());
                return;
            }
        };

        // Embedded chart substreams nest their own BOF/EOF pairs
        let mut depth = 0usize;
        for rec in reader {
            let rec = match rec {
                Ok(rec) => rec,
                Err(e) => {
                    warn!("sheet '{}' cut short: {e}", self.sheet.name());
                    return;
                }
            };
            match rec.record_type {
                record::BOF => depth += 1,
                record::EOF => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ if depth > 1 => {}
                _ => {
                    if self.handle(&rec).is_none() {
                        debug!(
                            "skipping malformed record {:#06x} at {} in sheet '{}'",
                            rec.record_type,
                            rec.offset,
                            self.sheet.name()
                        );
                    }
                }
            }
        }
    }

    fn insert(&mut self, row: u16, col: u16, value: CellValue, formatted: Option<String>) {
        let cell = Cell::new(u32::from(row) + 1, u32::from(col), value).with_formatted(formatted);
        self.sheet.insert_cell(cell);
    }

    fn insert_number(&mut self, row: u16, col: u16, style: u16, value: f64) {
        let (value, formatted) = self.globals.resolver.resolve(value, usize::from(style));
        self.insert(row, col, value, formatted);
    }

    fn read_inline_string(&self, data: &[u8], offset: usize) -> Option<String> {
        read_string(
            data,
            offset,
            true,
            self.globals.version,
            self.globals.codepage,
        )
    }

    /// `None` when the payload is too short for its record type
    fn handle(&mut self, rec: &biff::Record) -> Option<()> {
        let data = rec.data.as_slice();
        match rec.record_type {
            record::NUMBER => {
                let (row, col, style) = cell_header(data)?;
                let value = read_f64_le(data, 6)?;
                self.insert_number(row, col, style, value);
            }
            record::RK => {
                let (row, col, style) = cell_header(data)?;
                let rk = read_u32_le(data, 6)?;
                self.insert_number(row, col, style, decode_rk(rk));
            }
            record::MULRK => {
                let row = read_u16_le(data, 0)?;
                let first_col = read_u16_le(data, 2)?;
                let last_col = read_u16_le(data, data.len().checked_sub(2)?)?;
                let pairs = data.len().saturating_sub(6) / 6;
                let span = usize::from(last_col.checked_sub(first_col)?) + 1;
                for i in 0..pairs.min(span) {
                    let base = 4 + i * 6;
                    let style = read_u16_le(data, base)?;
                    let rk = read_u32_le(data, base + 2)?;
                    self.insert_number(row, first_col + i as u16, style, decode_rk(rk));
                }
            }
            record::LABELSST => {
                let (row, col, _) = cell_header(data)?;
                let index = read_u32_le(data, 6)? as usize;
                let text = self.globals.strings.get(index).unwrap_or_else(|| {
                    debug!("shared string {index} out of range");
                    ""
                });
                self.insert(row, col, CellValue::Text(text.to_string()), None);
            }
            record::LABEL | record::RSTRING => {
                let (row, col, _) = cell_header(data)?;
                let text = self.read_inline_string(data, 6)?;
                self.insert(row, col, CellValue::Text(text), None);
            }
            record::BOOLERR => {
                let (row, col, _) = cell_header(data)?;
                let value = read_u8(data, 6)?;
                let is_error = read_u8(data, 7)? != 0;
                let value = if is_error {
                    CellValue::Text(error_text(value).to_string())
                } else {
                    CellValue::Boolean(value != 0)
                };
                self.insert(row, col, value, None);
            }
            record::FORMULA => self.handle_formula(data)?,
            record::STRING => {
                if let Some((row, col)) = self.pending_formula.take() {
                    let text = self.read_inline_string(data, 0)?;
                    if !text.is_empty() {
                        let value = CellValue::formula_cached(CellValue::Text(text));
                        let cell = Cell::new(row, col, value);
                        self.sheet.insert_cell(cell);
                    }
                }
            }
            // Position-only records
            record::BLANK | record::MULBLANK => {}
            _ => {}
        }
        Some(())
    }

    fn handle_formula(&mut self, data: &[u8]) -> Option<()> {
        let (row, col, style) = cell_header(data)?;
        self.pending_formula = None;
        let result = data.get(6..14)?;
        if read_u16_le(result, 6)? != 0xFFFF {
            let value = read_f64_le(result, 0)?;
            let (value, formatted) = self.globals.resolver.resolve(value, usize::from(style));
            self.insert(row, col, CellValue::formula_cached(value), formatted);
            return Some(());
        }
        match result[0] {
            0x00 => self.pending_formula = Some((u32::from(row) + 1, u32::from(col))),
            0x01 => self.insert(
                row,
                col,
                CellValue::formula_cached(CellValue::Boolean(result[2] != 0)),
                None,
            ),
            0x02 => self.insert(
                row,
                col,
                CellValue::formula_cached(CellValue::Text(error_text(result[2]).to_string())),
                None,
            ),
            // Empty string result
            _ => {}
        }
        Some(())
    }
}

/// Row, column and style index shared by every cell record
fn cell_header(data: &[u8]) -> Option<(u16, u16, u16)> {
    Some((
        read_u16_le(data, 0)?,
        read_u16_le(data, 2)?,
        read_u16_le(data, 4)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::cfb::testing::CfbBuilder;
    use crate::reader::workbook::CellType;
    use chrono::NaiveDate;

    fn raw(record_type: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&record_type.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn bof() -> Vec<u8> {
        raw(record::BOF, &[0x00, 0x06, 0x05, 0x00, 0, 0, 0, 0])
    }

    fn short_string(text: &str) -> Vec<u8> {
        let mut out = vec![text.len() as u8, 0];
        out.extend_from_slice(text.as_bytes());
        out
    }

    fn wide_string(text: &str) -> Vec<u8> {
        let mut out = (text.len() as u16).to_le_bytes().to_vec();
        out.push(0);
        out.extend_from_slice(text.as_bytes());
        out
    }

    fn boundsheet(offset: u32, hidden: u8, name: &str) -> Vec<u8> {
        let mut payload = offset.to_le_bytes().to_vec();
        payload.extend_from_slice(&[hidden, 0]);
        payload.extend(short_string(name));
        raw(record::BOUNDSHEET, &payload)
    }

    fn xf(format_id: u16) -> Vec<u8> {
        let mut payload = vec![0u8; 20];
        payload[2..4].copy_from_slice(&format_id.to_le_bytes());
        raw(record::XF, &payload)
    }

    fn cell(record_type: u16, row: u16, col: u16, style: u16, tail: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&row.to_le_bytes());
        payload.extend_from_slice(&col.to_le_bytes());
        payload.extend_from_slice(&style.to_le_bytes());
        payload.extend_from_slice(tail);
        raw(record_type, &payload)
    }

    fn rk_int(n: i32) -> [u8; 4] {
        (((n << 2) as u32) | 0x02).to_le_bytes()
    }

    /// Globals with XF 0 = General, XF 1 = built-in date 14; one sheet of `cells`
    fn stream_with(names: &[&str], cells: &[Vec<u8>]) -> Vec<u8> {
        let mut head = bof();
        head.extend(xf(0));
        head.extend(xf(14));
        let mut sst = Vec::new();
        sst.extend_from_slice(&2u32.to_le_bytes());
        sst.extend_from_slice(&2u32.to_le_bytes());
        sst.extend(wide_string("alpha"));
        sst.extend(wide_string("beta"));
        head.extend(raw(record::SST, &sst));

        let boundsheets_len: usize = names.iter().map(|n| boundsheet(0, 0, n).len()).sum();
        let globals_len = head.len() + boundsheets_len + 4;

        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for (i, _) in names.iter().enumerate() {
            offsets.push((globals_len + body.len()) as u32);
            body.extend(bof());
            if i == 0 {
                for c in cells {
                    body.extend_from_slice(c);
                }
            }
            body.extend(raw(record::EOF, &[]));
        }

        let mut stream = head;
        for (name, offset) in names.iter().zip(&offsets) {
            stream.extend(boundsheet(*offset, 0, name));
        }
        stream.extend(raw(record::EOF, &[]));
        stream.extend(body);
        stream
    }

    #[test]
    fn test_mulrk_classifies_each_cell() {
        // Row 10 (stored as 9), columns 2..5, alternating General and date styles
        let mut payload = Vec::new();
        payload.extend_from_slice(&9u16.to_le_bytes());
        payload.extend_from_slice(&2u16.to_le_bytes());
        for (style, n) in [(0u16, 7), (1, 44941), (0, 44941), (1, 45000)] {
            payload.extend_from_slice(&style.to_le_bytes());
            payload.extend_from_slice(&rk_int(n));
        }
        payload.extend_from_slice(&5u16.to_le_bytes());
        let stream = stream_with(&["Data"], &[raw(record::MULRK, &payload)]);

        let workbook = parse_workbook_stream(&stream, "mem", &ReaderConfig::default()).unwrap();
        let sheet = workbook.sheet(0).unwrap();
        assert_eq!(sheet.row(10).unwrap().len(), 4);
        assert_eq!(sheet.cell_at(10, 2).unwrap().value(), &CellValue::from(7i64));
        let jan15 = NaiveDate::from_ymd_opt(2023, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            sheet.cell_at(10, 3).unwrap().value(),
            &CellValue::Temporal(jan15)
        );
        assert_eq!(sheet.cell_at(10, 4).unwrap().value(), &CellValue::from(44941i64));
        assert_eq!(sheet.cell_at(10, 5).unwrap().cell_type(), CellType::Temporal);
        assert_eq!(sheet.highest_column(), Some(5));
    }

    #[test]
    fn test_cell_records() {
        let rk_div100 = u32::from_le_bytes(rk_int(12345)) | 0x01;
        let cells = vec![
            cell(record::NUMBER, 0, 0, 0, &2.5f64.to_le_bytes()),
            cell(record::LABELSST, 0, 1, 0, &1u32.to_le_bytes()),
            cell(record::LABELSST, 0, 2, 0, &99u32.to_le_bytes()),
            cell(record::LABEL, 1, 0, 0, &wide_string("inline")),
            cell(record::BOOLERR, 1, 1, 0, &[1, 0]),
            cell(record::BOOLERR, 1, 2, 0, &[0x07, 1]),
            cell(record::RK, 2, 0, 0, &rk_div100.to_le_bytes()),
            cell(record::BLANK, 3, 3, 0, &[]),
        ];
        let stream = stream_with(&["S"], &cells);
        let workbook = parse_workbook_stream(&stream, "mem", &ReaderConfig::default()).unwrap();
        let sheet = workbook.sheet(0).unwrap();

        assert_eq!(sheet.cell("A1").unwrap().value(), &CellValue::number(2.5));
        assert_eq!(sheet.cell("B1").unwrap().value(), &CellValue::from("beta"));
        assert_eq!(sheet.cell("C1").unwrap().value(), &CellValue::from(""));
        assert_eq!(sheet.cell("A2").unwrap().value(), &CellValue::from("inline"));
        assert_eq!(sheet.cell("B2").unwrap().value(), &CellValue::Boolean(true));
        assert_eq!(sheet.cell("C2").unwrap().value(), &CellValue::from("#DIV/0!"));
        assert_eq!(sheet.cell("A3").unwrap().value(), &CellValue::number(123.45));
        assert!(sheet.cell("D4").is_none());
        assert_eq!(sheet.highest_row(), 3);
    }

    #[test]
    fn test_formula_results() {
        let mut numeric = 42.0f64.to_le_bytes().to_vec();
        numeric.extend_from_slice(&[0; 6]);
        let mut string_result = vec![0x00, 0, 0, 0, 0, 0, 0xFF, 0xFF];
        string_result.extend_from_slice(&[0; 6]);
        let mut bool_result = vec![0x01, 0, 1, 0, 0, 0, 0xFF, 0xFF];
        bool_result.extend_from_slice(&[0; 6]);
        let mut empty_result = vec![0x03, 0, 0, 0, 0, 0, 0xFF, 0xFF];
        empty_result.extend_from_slice(&[0; 6]);

        let cells = vec![
            cell(record::FORMULA, 0, 0, 0, &numeric),
            cell(record::FORMULA, 0, 1, 0, &string_result),
            raw(record::STRING, &wide_string("cached")),
            cell(record::FORMULA, 0, 2, 0, &bool_result),
            cell(record::FORMULA, 0, 3, 0, &empty_result),
        ];
        let stream = stream_with(&["F"], &cells);
        let workbook = parse_workbook_stream(&stream, "mem", &ReaderConfig::default()).unwrap();
        let sheet = workbook.sheet(0).unwrap();

        assert_eq!(
            sheet.cell("A1").unwrap().value(),
            &CellValue::FormulaCached(Box::new(CellValue::from(42i64)))
        );
        assert_eq!(
            sheet.cell("B1").unwrap().value(),
            &CellValue::FormulaCached(Box::new(CellValue::from("cached")))
        );
        assert_eq!(sheet.cell("C1").unwrap().value().resolved(), &CellValue::Boolean(true));
        assert!(sheet.cell("D1").is_none());
        assert_eq!(sheet.cell("A1").unwrap().cell_type(), CellType::Formula);
    }

    #[test]
    fn test_sheet_filter_keeps_index() {
        let stream = stream_with(&["One", "Two", "Three"], &[]);
        let config = ReaderConfig::for_sheets(["two"]);
        let workbook = parse_workbook_stream(&stream, "mem", &config).unwrap();
        assert_eq!(workbook.sheet_count(), 1);
        let sheet = workbook.sheet_by_name("Two").unwrap();
        assert_eq!(sheet.index(), 1);
        assert!(workbook.sheet(0).is_none());
    }

    #[test]
    fn test_list_sheet_names() {
        let stream = stream_with(&["One", "Two"], &[]);
        assert_eq!(list_sheet_names(&stream).unwrap(), vec!["One", "Two"]);
    }

    #[test]
    fn test_truncated_sheet_keeps_decoded_cells() {
        let cells = vec![
            cell(record::NUMBER, 0, 0, 0, &1.0f64.to_le_bytes()),
            cell(record::NUMBER, 1, 0, 0, &2.0f64.to_le_bytes()),
        ];
        let mut stream = stream_with(&["S"], &cells);
        // Drop the sheet EOF and half of the second NUMBER record
        stream.truncate(stream.len() - 4 - 10);
        let workbook = parse_workbook_stream(&stream, "mem", &ReaderConfig::default()).unwrap();
        let sheet = workbook.sheet(0).unwrap();
        assert_eq!(sheet.cell("A1").unwrap().value(), &CellValue::from(1i64));
        assert!(sheet.cell("A2").is_none());
    }

    #[test]
    fn test_biff5_strings_follow_codepage() {
        let biff5_bof = || raw(record::BOF, &[0x00, 0x05, 0x05, 0x00, 0, 0, 0, 0]);
        // Length-prefixed raw bytes, no flag byte
        let narrow = |bytes: &[u8]| {
            let mut out = vec![bytes.len() as u8];
            out.extend_from_slice(bytes);
            out
        };
        let wide = |bytes: &[u8]| {
            let mut out = (bytes.len() as u16).to_le_bytes().to_vec();
            out.extend_from_slice(bytes);
            out
        };

        let mut head = biff5_bof();
        head.extend(raw(record::CODEPAGE, &1251u16.to_le_bytes()));
        let mut format = 164u16.to_le_bytes().to_vec();
        format.extend(narrow(b"yyyy-mm-dd"));
        head.extend(raw(record::FORMAT, &format));
        head.extend(xf(0));
        head.extend(xf(164));

        // "Лист" in windows-1251
        let mut bound = Vec::new();
        bound.extend_from_slice(&[0, 0]);
        bound.extend(narrow(&[0xCB, 0xE8, 0xF1, 0xF2]));
        let globals_len = head.len() + 4 + 4 + bound.len() + 4;

        let mut string_result = vec![0x00, 0, 0, 0, 0, 0, 0xFF, 0xFF];
        string_result.extend_from_slice(&[0; 6]);
        let mut body = biff5_bof();
        body.extend(cell(record::LABEL, 0, 0, 0, &wide(&[0xC4, 0xE0])));
        body.extend(cell(record::NUMBER, 0, 1, 1, &44941.0f64.to_le_bytes()));
        body.extend(cell(record::FORMULA, 0, 2, 0, &string_result));
        body.extend(raw(record::STRING, &wide(b"ok")));
        body.extend(raw(record::EOF, &[]));

        let mut payload = (globals_len as u32).to_le_bytes().to_vec();
        payload.extend(bound);
        let mut stream = head;
        stream.extend(raw(record::BOUNDSHEET, &payload));
        stream.extend(raw(record::EOF, &[]));
        assert_eq!(stream.len(), globals_len);
        stream.extend(body);

        assert_eq!(list_sheet_names(&stream).unwrap(), vec!["Лист"]);
        let workbook = parse_workbook_stream(&stream, "old.xls", &ReaderConfig::default()).unwrap();
        let sheet = workbook.sheet_by_name("Лист").unwrap();
        assert_eq!(sheet.cell("A1").unwrap().value(), &CellValue::from("Да"));
        let jan15 = NaiveDate::from_ymd_opt(2023, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(sheet.cell("B1").unwrap().value(), &CellValue::Temporal(jan15));
        assert_eq!(sheet.cell("C1").unwrap().value().as_str(), Some("ok"));
    }

    #[test]
    fn test_missing_bof_is_fatal() {
        let stream = raw(record::EOF, &[]);
        assert!(matches!(
            parse_workbook_stream(&stream, "mem", &ReaderConfig::default()),
            Err(ReadError::ContainerCorrupt(_))
        ));
    }

    #[test]
    fn test_decoder_reads_compound_file() {
        let stream = stream_with(&["Only"], &[cell(record::NUMBER, 4, 1, 0, &3.0f64.to_le_bytes())]);
        let file = CfbBuilder::new().mini().stream("Workbook", &stream).build();
        let decoder = XlsDecoder;
        assert!(decoder.probe(&file));
        let workbook = decoder
            .decode(&file, "book.xls", &ReaderConfig::default())
            .unwrap();
        assert_eq!(workbook.source(), "book.xls");
        assert_eq!(workbook.sheet(0).unwrap().cell("B5").unwrap().value(), &CellValue::from(3i64));
    }
}
