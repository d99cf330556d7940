//! XML parsing for the ZIP package format (`.xlsx` / `.xlsm`)

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use zip::ZipArchive;
use zip::result::ZipError;

use super::WorkbookDecoder;
use super::formats::{
    CellFormatTable, DateSystem, NumberFormatTable, NumberResolver, SharedStringTable,
};
use super::parser_utils::{parse_cell_ref, read_text_node, unescape_placeholders};
use super::workbook::{Cell, CellValue, SheetVisibility, Workbook, Worksheet};
use crate::config::ReaderConfig;
use crate::error::{ReadError, Result};

const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const DEFAULT_WORKBOOK_PATH: &str = "xl/workbook.xml";

/// Decoder for ZIP/XML workbook packages
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxDecoder;

impl WorkbookDecoder for XlsxDecoder {
    fn name(&self) -> &str {
        "xlsx"
    }

    fn probe(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&ZIP_SIGNATURE)
    }

    fn decode(&self, bytes: &[u8], source: &str, config: &ReaderConfig) -> Result<Workbook> {
        let mut archive = open_archive(bytes)?;
        parse_package(&mut archive, source, config)
    }

    fn list_sheet_names(&self, bytes: &[u8], _config: &ReaderConfig) -> Result<Vec<String>> {
        let mut archive = open_archive(bytes)?;
        list_sheet_names(&mut archive)
    }
}

/// The input is already in memory, so a read failure here means a broken archive
fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| match e {
        ZipError::Io(e) => ReadError::ContainerCorrupt(e.to_string()),
        other => other.into(),
    })
}

/// Decode every wanted sheet of an opened package
pub fn parse_package<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    source: &str,
    config: &ReaderConfig,
) -> Result<Workbook> {
    let mut package = PackageReader::open(archive);
    let definition = package.read_workbook_definition()?;

    let mut resolver = NumberResolver::new(config.convert_dates);
    resolver.date_system = definition.date_system;
    package.read_styles(&mut resolver);
    let strings = package.read_shared_strings();

    let mut workbook = Workbook::new(source, definition.date_system);
    for (index, entry) in definition.sheets.iter().enumerate() {
        if !config.wants_sheet(&entry.name) {
            continue;
        }
        let mut sheet = Worksheet::new(entry.name.clone(), index);
        sheet.set_visibility(entry.visibility);
        let path = package.worksheet_path(entry, index);
        package.read_worksheet(&path, &mut sheet, &strings, &resolver);
        debug!(
            "sheet '{}' ({path}) decoded: {} cells",
            sheet.name(),
            sheet.cell_count()
        );
        workbook.insert_sheet(sheet);
    }
    Ok(workbook)
}

/// Sheet names in declaration order
pub fn list_sheet_names<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut package = PackageReader::open(archive);
    let definition = package.read_workbook_definition()?;
    Ok(definition.sheets.into_iter().map(|s| s.name).collect())
}

#[derive(Debug, Clone)]
struct Relationship {
    rel_type: String,
    target: String,
}

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    rel_id: Option<String>,
    visibility: SheetVisibility,
}

struct WorkbookDefinition {
    sheets: Vec<SheetEntry>,
    date_system: DateSystem,
}

/// Directory of a part path including the trailing slash
fn part_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..=pos],
        None => "",
    }
}

/// Resolve a relationship target against the directory of its source part
fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{base_dir}{target}"),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn is_true(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

struct PackageReader<'a, R: Read + Seek> {
    archive: &'a mut ZipArchive<R>,
    workbook_path: String,
    relationships: HashMap<String, Relationship>,
}

impl<'a, R: Read + Seek> PackageReader<'a, R> {
    fn open(archive: &'a mut ZipArchive<R>) -> Self {
        let workbook_path = match read_relationships(archive, "_rels/.rels", "") {
            Ok(rels) => rels
                .values()
                .find(|r| r.rel_type.ends_with("/officeDocument"))
                .map(|r| r.target.clone())
                .unwrap_or_else(|| DEFAULT_WORKBOOK_PATH.to_string()),
            Err(e) => {
                warn!("package relationships unreadable, using {DEFAULT_WORKBOOK_PATH}: {e}");
                DEFAULT_WORKBOOK_PATH.to_string()
            }
        };

        let base = part_dir(&workbook_path).to_string();
        let file_name = &workbook_path[base.len()..];
        let rels_path = format!("{base}_rels/{file_name}.rels");
        let relationships = read_relationships(archive, &rels_path, &base).unwrap_or_else(|e| {
            warn!("workbook relationships unreadable: {e}");
            HashMap::new()
        });
        debug!(
            "workbook part {workbook_path}, {} relationships",
            relationships.len()
        );

        Self {
            archive,
            workbook_path,
            relationships,
        }
    }

    fn base_dir(&self) -> &str {
        part_dir(&self.workbook_path)
    }

    /// Path of the first relationship with the given type suffix, or the default
    fn related_part(&self, type_suffix: &str, default_name: &str) -> String {
        self.relationships
            .values()
            .find(|r| r.rel_type.ends_with(type_suffix))
            .map(|r| r.target.clone())
            .unwrap_or_else(|| format!("{}{default_name}", self.base_dir()))
    }

    fn worksheet_path(&self, entry: &SheetEntry, position: usize) -> String {
        entry
            .rel_id
            .as_ref()
            .and_then(|id| self.relationships.get(id))
            .map(|r| r.target.clone())
            .unwrap_or_else(|| format!("{}worksheets/sheet{}.xml", self.base_dir(), position + 1))
    }

    fn read_workbook_definition(&mut self) -> Result<WorkbookDefinition> {
        let part = self.workbook_path.clone();
        let file = match self.archive.by_name(&part) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(ReadError::StructuralPartMissing(format!(
                    "workbook part {part} not found"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let mut reader = Reader::from_reader(BufReader::new(file));
        reader.config_mut().trim_text(true);

        let mut sheets = Vec::new();
        let mut date_system = DateSystem::V1900;
        let mut buf = Vec::new();
        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| ReadError::markup(&part, e))?
            {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"sheet" => sheets.push(sheet_entry(&e).map_err(|e| ReadError::markup(&part, e))?),
                    b"workbookPr" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"date1904"
                                && is_true(&attr.unescape_value().map_err(|e| ReadError::markup(&part, e))?)
                            {
                                date_system = DateSystem::V1904;
                            }
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(WorkbookDefinition {
            sheets,
            date_system,
        })
    }

    fn read_shared_strings(&mut self) -> SharedStringTable {
        let path = self.related_part("/sharedStrings", "sharedStrings.xml");
        match self.archive.by_name(&path) {
            Ok(file) => match parse_shared_strings(BufReader::new(file)) {
                Ok(strings) => {
                    debug!("{} shared strings from {path}", strings.len());
                    strings
                }
                Err(e) => {
                    warn!("shared strings unavailable, {path}: {e}");
                    SharedStringTable::new()
                }
            },
            Err(ZipError::FileNotFound) => SharedStringTable::new(),
            Err(e) => {
                warn!("shared strings unavailable, {path}: {e}");
                SharedStringTable::new()
            }
        }
    }

    /// Overlay custom formats and the style list onto `resolver`.
    /// A damaged styles part leaves only the built-in formats.
    fn read_styles(&mut self, resolver: &mut NumberResolver) {
        let path = self.related_part("/styles", "styles.xml");
        let file = match self.archive.by_name(&path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return,
            Err(e) => {
                warn!("styles unavailable, {path}: {e}");
                return;
            }
        };
        match parse_styles(BufReader::new(file)) {
            Ok((formats, styles)) => {
                resolver.formats = formats;
                resolver.styles = styles;
            }
            Err(e) => warn!("styles unavailable, {path}: {e}"),
        }
    }

    fn read_worksheet(
        &mut self,
        path: &str,
        sheet: &mut Worksheet,
        strings: &SharedStringTable,
        resolver: &NumberResolver,
    ) {
        let file = match self.archive.by_name(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("worksheet part {path} unavailable: {e}");
                return;
            }
        };
        let mut reader = Reader::from_reader(BufReader::new(file));
        let cells = CellContext { strings, resolver };
        if let Err(e) = cells.parse_sheet(&mut reader, sheet) {
            warn!(
                "worksheet part {path} malformed, keeping {} cells: {e}",
                sheet.cell_count()
            );
        }
    }
}

fn sheet_entry(e: &BytesStart<'_>) -> std::result::Result<SheetEntry, quick_xml::Error> {
    let mut entry = SheetEntry {
        name: String::new(),
        rel_id: None,
        visibility: SheetVisibility::Visible,
    };
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"name" => entry.name = attr.unescape_value()?.to_string(),
            b"id" => entry.rel_id = Some(attr.unescape_value()?.to_string()),
            b"state" => {
                entry.visibility = match &*attr.unescape_value()? {
                    "hidden" => SheetVisibility::Hidden,
                    "veryHidden" => SheetVisibility::VeryHidden,
                    _ => SheetVisibility::Visible,
                }
            }
            _ => {}
        }
    }
    Ok(entry)
}

/// Relationship id → (type, resolved target) for one `.rels` part.
/// A missing part yields an empty map.
fn read_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    rels_path: &str,
    base_dir: &str,
) -> Result<HashMap<String, Relationship>> {
    let mut relationships = HashMap::new();
    let file = match archive.by_name(rels_path) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(relationships),
        Err(e) => return Err(e.into()),
    };
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| ReadError::markup(rels_path, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut external = false;
                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map_err(|e| ReadError::markup(rels_path, e))?;
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = value.to_string(),
                        b"Type" => rel_type = value.to_string(),
                        b"Target" => target = value.to_string(),
                        b"TargetMode" => external = value == "External",
                        _ => {}
                    }
                }
                if !id.is_empty() && !external {
                    let target = resolve_target(base_dir, &target);
                    relationships.insert(id, Relationship { rel_type, target });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

fn parse_shared_strings<B: BufRead>(
    source: B,
) -> std::result::Result<SharedStringTable, quick_xml::Error> {
    let mut reader = Reader::from_reader(source);
    let mut strings = SharedStringTable::new();
    let mut current = String::new();
    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => current.push_str(&read_text_node(&mut reader)?),
                // Phonetic guide text is not part of the value
                b"rPh" => {
                    reader.read_to_end_into(e.name(), &mut skip_buf)?;
                    skip_buf.clear();
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Event::End(e) if e.local_name().as_ref() == b"si" => {
                strings.push(unescape_placeholders(&current));
                current.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn parse_styles<B: BufRead>(
    source: B,
) -> std::result::Result<(NumberFormatTable, CellFormatTable), quick_xml::Error> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut formats = NumberFormatTable::new();
    let mut styles = CellFormatTable::new();
    let mut in_cell_xfs = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"numFmt" => {
                    let mut id = None;
                    let mut code = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"numFmtId" => id = attr.unescape_value()?.parse::<u32>().ok(),
                            b"formatCode" => code = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    if let Some(id) = id
                        && !code.is_empty()
                    {
                        formats.insert(id, code);
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let mut num_fmt_id = 0u32;
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"numFmtId"
                            && let Ok(val) = attr.unescape_value()?.parse::<u32>()
                        {
                            num_fmt_id = val;
                        }
                    }
                    styles.push(num_fmt_id);
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((formats, styles))
}

/// Raw pieces of one `<c>` element
#[derive(Debug, Default)]
struct RawCell {
    value: Option<String>,
    inline: Option<String>,
    has_formula: bool,
}

/// Read up to the closing `</c>`
fn read_cell_contents<B: BufRead>(
    reader: &mut Reader<B>,
) -> std::result::Result<RawCell, quick_xml::Error> {
    let mut raw = RawCell::default();
    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => raw.value = Some(read_text_node(reader)?),
                b"t" => raw
                    .inline
                    .get_or_insert_with(String::new)
                    .push_str(&read_text_node(reader)?),
                b"f" => {
                    raw.has_formula = true;
                    reader.read_to_end_into(e.name(), &mut skip_buf)?;
                    skip_buf.clear();
                }
                b"rPh" => {
                    reader.read_to_end_into(e.name(), &mut skip_buf)?;
                    skip_buf.clear();
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"f" => raw.has_formula = true,
            Event::End(e) if e.local_name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(raw)
}

/// Lookup tables a worksheet needs to turn raw cells into values
struct CellContext<'t> {
    strings: &'t SharedStringTable,
    resolver: &'t NumberResolver,
}

impl CellContext<'_> {
    fn parse_sheet<B: BufRead>(
        &self,
        reader: &mut Reader<B>,
        sheet: &mut Worksheet,
    ) -> std::result::Result<(), quick_xml::Error> {
        let mut buf = Vec::new();
        let mut current_row = 0u32;
        let mut next_col = 0u32;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                    let mut row = None;
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"r" {
                            row = attr.unescape_value()?.parse::<u32>().ok();
                        }
                    }
                    current_row = row.filter(|r| *r > 0).unwrap_or(current_row + 1);
                    next_col = 0;
                }
                Event::Start(e) if e.local_name().as_ref() == b"c" => {
                    let (coords, cell_type, style) = cell_attributes(&e)?;
                    let (row, col) = coords.unwrap_or((current_row.max(1), next_col));
                    next_col = col + 1;
                    let raw = read_cell_contents(reader)?;
                    if let Some((value, formatted)) = self.cell_value(&cell_type, style, raw) {
                        sheet.insert_cell(Cell::new(row, col, value).with_formatted(formatted));
                    }
                }
                Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                    let (coords, _, _) = cell_attributes(&e)?;
                    next_col = coords.map_or(next_col, |(_, c)| c) + 1;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(())
    }

    /// Value of a cell by its type flag; `None` for cells with nothing to store
    fn cell_value(
        &self,
        cell_type: &str,
        style: usize,
        raw: RawCell,
    ) -> Option<(CellValue, Option<String>)> {
        let text = raw.value.unwrap_or_default();
        let (value, formatted) = match cell_type {
            "inlineStr" => {
                let inline = raw.inline.unwrap_or(text);
                (CellValue::Text(unescape_placeholders(&inline)), None)
            }
            "s" => {
                let value = match text.trim().parse::<usize>() {
                    Ok(index) => self.strings.get(index).unwrap_or_else(|| {
                        debug!("shared string {index} out of range");
                        ""
                    }),
                    Err(_) => {
                        debug!("shared string cell without a usable index: {text:?}");
                        ""
                    }
                };
                (CellValue::Text(value.to_string()), None)
            }
            "b" => (CellValue::Boolean(is_true(text.trim())), None),
            "e" | "str" => {
                if text.is_empty() {
                    return None;
                }
                (CellValue::Text(unescape_placeholders(&text)), None)
            }
            "d" => {
                let stamp = text.trim();
                let parsed = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(stamp, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })?;
                (CellValue::Temporal(parsed), None)
            }
            // Only an untyped (numeric) result is tagged as a formula
            _ => {
                let number = text.trim().parse::<f64>().ok()?;
                let (value, formatted) = self.resolver.resolve(number, style);
                if raw.has_formula {
                    (CellValue::formula_cached(value), formatted)
                } else {
                    (value, formatted)
                }
            }
        };
        Some((value, formatted))
    }
}

type CellAttributes = (Option<(u32, u32)>, String, usize);

fn cell_attributes(e: &BytesStart<'_>) -> std::result::Result<CellAttributes, quick_xml::Error> {
    let mut coords = None;
    let mut cell_type = String::new();
    let mut style = 0usize;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"r" => coords = parse_cell_ref(&attr.unescape_value()?),
            b"t" => cell_type = attr.unescape_value()?.to_string(),
            b"s" => style = attr.unescape_value()?.parse::<usize>().unwrap_or(0),
            _ => {}
        }
    }
    Ok((coords, cell_type, style))
}
