#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

// ---------------------------------------------------------------------------
// Package fixtures
// ---------------------------------------------------------------------------

/// Minimal package with one worksheet part per `(name, sheetData body)`
#[derive(Default)]
pub struct MockXlsx {
    pub sheets: Vec<(String, String)>,
    pub shared_strings: Option<String>,
    pub styles: Option<String>,
    pub date1904: bool,
}

impl MockXlsx {
    pub fn sheet(mut self, name: &str, rows: &str) -> Self {
        self.sheets.push((name.to_string(), rows.to_string()));
        self
    }

    pub fn shared_strings(mut self, entries: &[&str]) -> Self {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        for entry in entries {
            xml.push_str(&format!("<si><t>{entry}</t></si>"));
        }
        xml.push_str("</sst>");
        self.shared_strings = Some(xml);
        self
    }

    pub fn styles(mut self, xml: &str) -> Self {
        self.styles = Some(xml.to_string());
        self
    }

    pub fn date1904(mut self) -> Self {
        self.date1904 = true;
        self
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#.as_bytes())?;

        let mut workbook_xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
"#,
        );
        if self.date1904 {
            workbook_xml.push_str(r#"<workbookPr date1904="1"/>"#);
        }
        workbook_xml.push_str("<sheets>");
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
"#,
        );
        for (i, (name, _)) in self.sheets.iter().enumerate() {
            workbook_xml.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                name,
                i + 1,
                i + 1
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i + 1,
                i + 1
            ));
        }
        workbook_xml.push_str("</sheets></workbook>");
        rels.push_str(r#"<Relationship Id="rIdS" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#);
        rels.push_str(r#"<Relationship Id="rIdT" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#);
        rels.push_str("</Relationships>");

        zip.start_file("xl/workbook.xml", options)?;
        zip.write_all(workbook_xml.as_bytes())?;
        zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        zip.write_all(rels.as_bytes())?;

        for (i, (_, rows)) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            zip.write_all(
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#
                )
                .as_bytes(),
            )?;
        }
        if let Some(xml) = &self.shared_strings {
            zip.start_file("xl/sharedStrings.xml", options)?;
            zip.write_all(xml.as_bytes())?;
        }
        if let Some(xml) = &self.styles {
            zip.start_file("xl/styles.xml", options)?;
            zip.write_all(xml.as_bytes())?;
        }
        zip.finish()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BIFF8 record stream fixtures
// ---------------------------------------------------------------------------

pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000A;
pub const CONTINUE: u16 = 0x003C;
pub const DATEMODE: u16 = 0x0022;
pub const BOUNDSHEET: u16 = 0x0085;
pub const SST: u16 = 0x00FC;
pub const FORMAT: u16 = 0x041E;
pub const XF: u16 = 0x00E0;
pub const NUMBER: u16 = 0x0203;
pub const RK: u16 = 0x027E;
pub const MULRK: u16 = 0x00BD;
pub const LABELSST: u16 = 0x00FD;
pub const LABEL: u16 = 0x0204;
pub const BOOLERR: u16 = 0x0205;
pub const FORMULA: u16 = 0x0006;
pub const STRING: u16 = 0x0207;

pub fn record(record_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&record_type.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// XLUnicodeString with a 16-bit count, compressed characters
pub fn unicode_string(text: &str) -> Vec<u8> {
    let mut out = (text.len() as u16).to_le_bytes().to_vec();
    out.push(0);
    out.extend_from_slice(text.as_bytes());
    out
}

pub fn cell(record_type: u16, row: u16, col: u16, style: u16, tail: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&row.to_le_bytes());
    payload.extend_from_slice(&col.to_le_bytes());
    payload.extend_from_slice(&style.to_le_bytes());
    payload.extend_from_slice(tail);
    record(record_type, &payload)
}

pub fn rk_int(n: i32) -> u32 {
    ((n << 2) as u32) | 0x02
}

/// Workbook stream assembled from globals and per-sheet cell records
#[derive(Default)]
pub struct BiffStream {
    pub strings: Vec<String>,
    pub formats: Vec<(u16, String)>,
    /// Format id used by each XF, in style-index order
    pub xfs: Vec<u16>,
    pub date1904: bool,
    pub sheets: Vec<(String, u8, Vec<Vec<u8>>)>,
    /// Split the SST after this many payload bytes with a CONTINUE record,
    /// optionally opening the CONTINUE with a character-width flag byte
    pub sst_split: Option<(usize, Option<u8>)>,
}

impl BiffStream {
    pub fn new() -> Self {
        Self {
            xfs: vec![0],
            ..Self::default()
        }
    }

    pub fn sheet(mut self, name: &str, cells: Vec<Vec<u8>>) -> Self {
        self.sheets.push((name.to_string(), 0, cells));
        self
    }

    pub fn hidden_sheet(mut self, name: &str) -> Self {
        self.sheets.push((name.to_string(), 1, Vec::new()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut head = record(BOF, &[0x00, 0x06, 0x05, 0x00, 0, 0, 0, 0]);
        if self.date1904 {
            head.extend(record(DATEMODE, &1u16.to_le_bytes()));
        }
        for (id, code) in &self.formats {
            let mut payload = id.to_le_bytes().to_vec();
            payload.extend(unicode_string(code));
            head.extend(record(FORMAT, &payload));
        }
        for format_id in &self.xfs {
            let mut payload = vec![0u8; 20];
            payload[2..4].copy_from_slice(&format_id.to_le_bytes());
            head.extend(record(XF, &payload));
        }
        if !self.strings.is_empty() {
            let mut sst = Vec::new();
            sst.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
            sst.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
            for s in &self.strings {
                sst.extend(unicode_string(s));
            }
            match self.sst_split {
                Some((at, flag)) if at < sst.len() => {
                    head.extend(record(SST, &sst[..at]));
                    let mut tail: Vec<u8> = flag.into_iter().collect();
                    tail.extend_from_slice(&sst[at..]);
                    head.extend(record(CONTINUE, &tail));
                }
                _ => head.extend(record(SST, &sst)),
            }
        }

        let boundsheet = |offset: u32, hidden: u8, name: &str| {
            let mut payload = offset.to_le_bytes().to_vec();
            payload.extend_from_slice(&[hidden, 0, name.len() as u8, 0]);
            payload.extend_from_slice(name.as_bytes());
            record(BOUNDSHEET, &payload)
        };
        let boundsheets_len: usize = self
            .sheets
            .iter()
            .map(|(name, _, _)| boundsheet(0, 0, name).len())
            .sum();
        let globals_len = head.len() + boundsheets_len + 4;

        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for (_, _, cells) in &self.sheets {
            offsets.push((globals_len + body.len()) as u32);
            body.extend(record(BOF, &[0x00, 0x06, 0x10, 0x00, 0, 0, 0, 0]));
            for c in cells {
                body.extend_from_slice(c);
            }
            body.extend(record(EOF, &[]));
        }

        let mut stream = head;
        for ((name, hidden, _), offset) in self.sheets.iter().zip(&offsets) {
            stream.extend(boundsheet(*offset, *hidden, name));
        }
        stream.extend(record(EOF, &[]));
        stream.extend(body);
        stream
    }
}

// ---------------------------------------------------------------------------
// Compound-file fixtures (version 3, 512-byte sectors)
// ---------------------------------------------------------------------------

const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const SECTOR: usize = 512;
const MINI: usize = 64;
const FREESECT: u32 = 0xFFFF_FFFF;
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FATSECT: u32 = 0xFFFF_FFFD;
const DIFSECT: u32 = 0xFFFF_FFFC;

#[derive(Default)]
pub struct CompoundFileBuilder {
    streams: Vec<(String, Vec<u8>)>,
    use_mini: bool,
    difat_chain: bool,
}

impl CompoundFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, name: &str, data: &[u8]) -> Self {
        self.streams.push((name.to_string(), data.to_vec()));
        self
    }

    /// Store streams below the cutoff in the mini stream
    pub fn mini(mut self) -> Self {
        self.use_mini = true;
        self
    }

    /// List FAT sectors in a chained DIFAT sector instead of the header
    pub fn difat_chain(mut self) -> Self {
        self.difat_chain = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut sectors: Vec<Vec<u8>> = Vec::new();
        let mut fat: Vec<u32> = Vec::new();
        let mut starts = Vec::new();
        let (mut root_start, mut root_size) = (ENDOFCHAIN, 0u64);
        let (mut mini_fat_start, mut mini_fat_count) = (ENDOFCHAIN, 0u32);

        if self.use_mini {
            let mut mini_stream = Vec::new();
            let mut mini_fat = Vec::new();
            for (_, data) in &self.streams {
                let first = (mini_stream.len() / MINI) as u32;
                let count = data.len().div_ceil(MINI).max(1);
                for i in 0..count {
                    let id = first + i as u32;
                    mini_fat.push(if i + 1 == count { ENDOFCHAIN } else { id + 1 });
                }
                mini_stream.extend_from_slice(data);
                mini_stream.resize((first as usize + count) * MINI, 0);
                starts.push(first);
            }
            let bytes: Vec<u8> = mini_fat.iter().flat_map(|v| v.to_le_bytes()).collect();
            mini_fat_count = bytes.len().div_ceil(SECTOR) as u32;
            mini_fat_start = chain(&mut sectors, &mut fat, &bytes);
            root_size = mini_stream.len() as u64;
            root_start = chain(&mut sectors, &mut fat, &mini_stream);
        } else {
            for (_, data) in &self.streams {
                starts.push(chain(&mut sectors, &mut fat, data));
            }
        }

        let mut directory = dir_entry("Root Entry", 5, root_start, root_size);
        for ((name, data), start) in self.streams.iter().zip(&starts) {
            directory.extend(dir_entry(name, 2, *start, data.len() as u64));
        }
        let dir_start = chain(&mut sectors, &mut fat, &directory);

        let per_fat = (SECTOR / 4) as u32;
        let extra = u32::from(self.difat_chain);
        let mut fat_count = 1u32;
        while sectors.len() as u32 + fat_count + extra > fat_count * per_fat {
            fat_count += 1;
        }
        let first_fat = sectors.len() as u32;
        fat.extend(std::iter::repeat_n(FATSECT, fat_count as usize));
        let difat_sector = first_fat + fat_count;
        if self.difat_chain {
            fat.push(DIFSECT);
        }
        fat.resize((fat_count * per_fat) as usize, FREESECT);
        for part in fat.chunks(per_fat as usize) {
            sectors.push(part.iter().flat_map(|v| v.to_le_bytes()).collect());
        }
        if self.difat_chain {
            let mut ids: Vec<u32> = (0..fat_count).map(|i| first_fat + i).collect();
            ids.resize(per_fat as usize - 1, FREESECT);
            ids.push(ENDOFCHAIN);
            sectors.push(ids.iter().flat_map(|v| v.to_le_bytes()).collect());
        }

        let mut out = vec![0u8; SECTOR];
        out[..8].copy_from_slice(&SIGNATURE);
        put16(&mut out, 0x18, 0x003E);
        put16(&mut out, 0x1A, 3);
        put16(&mut out, 0x1C, 0xFFFE);
        put16(&mut out, 0x1E, 9);
        put16(&mut out, 0x20, 6);
        put32(&mut out, 0x2C, fat_count);
        put32(&mut out, 0x30, dir_start);
        put32(&mut out, 0x38, 4096);
        put32(&mut out, 0x3C, mini_fat_start);
        put32(&mut out, 0x40, mini_fat_count);
        if self.difat_chain {
            put32(&mut out, 0x44, difat_sector);
            put32(&mut out, 0x48, 1);
        } else {
            put32(&mut out, 0x44, ENDOFCHAIN);
            put32(&mut out, 0x48, 0);
        }
        for i in 0..109u32 {
            let id = if !self.difat_chain && i < fat_count {
                first_fat + i
            } else {
                FREESECT
            };
            put32(&mut out, 0x4C + i as usize * 4, id);
        }
        for sector in sectors {
            out.extend_from_slice(&sector);
        }
        out
    }
}

fn put16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn chain(sectors: &mut Vec<Vec<u8>>, fat: &mut Vec<u32>, data: &[u8]) -> u32 {
    if data.is_empty() {
        return ENDOFCHAIN;
    }
    let first = sectors.len() as u32;
    let pieces: Vec<&[u8]> = data.chunks(SECTOR).collect();
    for (i, piece) in pieces.iter().enumerate() {
        let mut sector = piece.to_vec();
        sector.resize(SECTOR, 0);
        sectors.push(sector);
        let id = first + i as u32;
        fat.push(if i + 1 == pieces.len() { ENDOFCHAIN } else { id + 1 });
    }
    first
}

fn dir_entry(name: &str, entry_type: u8, start: u32, size: u64) -> Vec<u8> {
    let mut raw = vec![0u8; 128];
    let units: Vec<u16> = name.encode_utf16().collect();
    for (i, unit) in units.iter().enumerate() {
        raw[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    put16(&mut raw, 0x40, ((units.len() + 1) * 2) as u16);
    raw[0x42] = entry_type;
    raw[0x43] = 1;
    put32(&mut raw, 0x44, FREESECT);
    put32(&mut raw, 0x48, FREESECT);
    put32(&mut raw, 0x4C, if entry_type == 5 { 1 } else { FREESECT });
    put32(&mut raw, 0x74, start);
    raw[0x78..0x80].copy_from_slice(&size.to_le_bytes());
    raw
}
