//! BIFF record framing and primitive decoding
//!
//! A workbook stream is a flat sequence of `type:u16, length:u16, payload`
//! records. Payloads longer than one physical record continue in CONTINUE
//! records; [`RecordReader`] glues those back on and remembers where each
//! piece started, because string data that crosses a boundary restarts with
//! a fresh flag byte.

use encoding_rs::Encoding;

use super::binary::{decode_latin1, decode_utf16le, read_u8, read_u16_le, read_u32_le};
use crate::error::{ReadError, Result};

pub mod record {
    pub const FORMULA: u16 = 0x0006;
    pub const EOF: u16 = 0x000A;
    pub const DATEMODE: u16 = 0x0022;
    pub const CONTINUE: u16 = 0x003C;
    pub const CODEPAGE: u16 = 0x0042;
    pub const BOUNDSHEET: u16 = 0x0085;
    pub const MULRK: u16 = 0x00BD;
    pub const MULBLANK: u16 = 0x00BE;
    pub const RSTRING: u16 = 0x00D6;
    pub const XF: u16 = 0x00E0;
    pub const SST: u16 = 0x00FC;
    pub const LABELSST: u16 = 0x00FD;
    pub const BLANK: u16 = 0x0201;
    pub const NUMBER: u16 = 0x0203;
    pub const LABEL: u16 = 0x0204;
    pub const BOOLERR: u16 = 0x0205;
    pub const STRING: u16 = 0x0207;
    pub const RK: u16 = 0x027E;
    pub const FORMAT: u16 = 0x041E;
    pub const BOF: u16 = 0x0809;
}

/// Binary dialect announced by the BOF record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiffVersion {
    Biff5,
    Biff8,
}

impl BiffVersion {
    pub fn from_bof(payload: &[u8]) -> Option<Self> {
        match read_u16_le(payload, 0)? {
            0x0600 => Some(BiffVersion::Biff8),
            0x0500 => Some(BiffVersion::Biff5),
            _ => None,
        }
    }
}

/// One logical record with any CONTINUE payloads appended
#[derive(Debug, Clone)]
pub struct Record {
    pub record_type: u16,
    /// Offset of the record header within the stream
    pub offset: usize,
    pub data: Vec<u8>,
    /// Positions in `data` where a CONTINUE payload begins
    pub continue_offsets: Vec<usize>,
}

/// Sequential reader over the records of a workbook stream
pub struct RecordReader<'a> {
    stream: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self { stream, pos: 0 }
    }

    /// Reader positioned at `offset`; fails if the offset lies outside the stream
    pub fn at(stream: &'a [u8], offset: usize) -> Result<Self> {
        if offset >= stream.len() {
            return Err(ReadError::StreamTruncated(format!(
                "record offset {offset} beyond stream of {} bytes",
                stream.len()
            )));
        }
        Ok(Self {
            stream,
            pos: offset,
        })
    }

    fn header_at(&self, pos: usize) -> Option<(u16, usize)> {
        let record_type = read_u16_le(self.stream, pos)?;
        let len = read_u16_le(self.stream, pos + 2)? as usize;
        Some((record_type, len))
    }

    fn payload(&self, pos: usize, len: usize) -> Result<&'a [u8]> {
        let start = pos + 4;
        self.stream.get(start..start + len).ok_or_else(|| {
            ReadError::StreamTruncated(format!(
                "record at offset {pos} declares {len} bytes, {} available",
                self.stream.len().saturating_sub(start)
            ))
        })
    }

    /// Next logical record, `None` at a clean end of stream
    pub fn next_record(&mut self) -> Option<Result<Record>> {
        if self.pos >= self.stream.len() {
            return None;
        }
        let offset = self.pos;
        let Some((record_type, len)) = self.header_at(offset) else {
            self.pos = self.stream.len();
            return Some(Err(ReadError::StreamTruncated(format!(
                "incomplete record header at offset {offset}"
            ))));
        };
        let first = match self.payload(offset, len) {
            Ok(p) => p,
            Err(e) => {
                self.pos = self.stream.len();
                return Some(Err(e));
            }
        };
        self.pos = offset + 4 + len;

        let mut data = first.to_vec();
        let mut continue_offsets = Vec::new();
        while let Some((next_type, next_len)) = self.header_at(self.pos) {
            if next_type != record::CONTINUE {
                break;
            }
            let Ok(chunk) = self.payload(self.pos, next_len) else {
                break;
            };
            continue_offsets.push(data.len());
            data.extend_from_slice(chunk);
            self.pos += 4 + next_len;
        }

        Some(Ok(Record {
            record_type,
            offset,
            data,
            continue_offsets,
        }))
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

/// Decode a packed RK value.
///
/// Bit 0 divides the result by 100; bit 1 selects a 30-bit signed integer
/// instead of the top 30 bits of an IEEE-754 double.
pub fn decode_rk(rk: u32) -> f64 {
    let div100 = rk & 0x01 != 0;
    let is_int = rk & 0x02 != 0;
    let value = if is_int {
        ((rk as i32) >> 2) as f64
    } else {
        f64::from_bits(u64::from(rk & 0xFFFF_FFFC) << 32)
    };
    if div100 { value / 100.0 } else { value }
}

/// Text decoding for 8-bit strings, driven by the CODEPAGE record
#[derive(Debug, Clone, Copy)]
pub struct Codepage {
    encoding: &'static Encoding,
}

impl Default for Codepage {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::WINDOWS_1252,
        }
    }
}

impl Codepage {
    pub fn from_id(codepage: u16) -> Self {
        let encoding = match codepage {
            874 => encoding_rs::WINDOWS_874,
            932 => encoding_rs::SHIFT_JIS,
            936 => encoding_rs::GBK,
            949 => encoding_rs::EUC_KR,
            950 => encoding_rs::BIG5,
            1250 => encoding_rs::WINDOWS_1250,
            1251 => encoding_rs::WINDOWS_1251,
            1253 => encoding_rs::WINDOWS_1253,
            1254 => encoding_rs::WINDOWS_1254,
            1255 => encoding_rs::WINDOWS_1255,
            1256 => encoding_rs::WINDOWS_1256,
            1257 => encoding_rs::WINDOWS_1257,
            1258 => encoding_rs::WINDOWS_1258,
            10000 => encoding_rs::MACINTOSH,
            _ => encoding_rs::WINDOWS_1252,
        };
        Self { encoding }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, _, _) = self.encoding.decode(bytes);
        text.into_owned()
    }
}

/// Read a string whose character count is a u16 (`wide_len`) or u8.
///
/// BIFF8 strings carry a flag byte after the count (bit 0: two-byte
/// characters, bit 2: extended data, bit 3: rich-text runs). BIFF5 strings
/// are raw bytes in the workbook code page.
pub fn read_string(
    data: &[u8],
    offset: usize,
    wide_len: bool,
    version: BiffVersion,
    codepage: Codepage,
) -> Option<String> {
    let (count, mut pos) = if wide_len {
        (read_u16_le(data, offset)? as usize, offset + 2)
    } else {
        (read_u8(data, offset)? as usize, offset + 1)
    };

    if version == BiffVersion::Biff5 {
        let bytes = data.get(pos..pos + count)?;
        return Some(codepage.decode(bytes));
    }

    let flags = read_u8(data, pos)?;
    pos += 1;
    // Rich-text run count and extended-data length precede the characters
    if flags & 0x08 != 0 {
        pos += 2;
    }
    if flags & 0x04 != 0 {
        pos += 4;
    }
    if flags & 0x01 != 0 {
        data.get(pos..pos + count * 2).map(decode_utf16le)
    } else {
        data.get(pos..pos + count).map(decode_latin1)
    }
}

/// Cursor over a merged SST payload that honours CONTINUE boundaries
pub struct SstCursor<'a> {
    data: &'a [u8],
    boundaries: &'a [usize],
    pos: usize,
}

impl<'a> SstCursor<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self {
            data: &record.data,
            boundaries: &record.continue_offsets,
            pos: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let v = read_u8(self.data, self.pos)?;
        self.pos += 1;
        Some(v)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        let v = read_u16_le(self.data, self.pos)?;
        self.pos += 2;
        Some(v)
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        let v = read_u32_le(self.data, self.pos)?;
        self.pos += 4;
        Some(v)
    }

    pub fn skip(&mut self, len: usize) -> Option<()> {
        let end = self.pos.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        self.pos = end;
        Some(())
    }

    fn next_boundary(&self) -> Option<usize> {
        self.boundaries.iter().copied().find(|&b| b > self.pos)
    }

    /// Read `count` characters. Whenever characters are still owed at the
    /// start of a CONTINUE piece, including right at the call, that piece
    /// opens with a flag byte giving the new width.
    pub fn read_chars(&mut self, count: usize, mut wide: bool) -> Option<String> {
        let mut units: Vec<u16> = Vec::with_capacity(count.min(self.remaining()));
        let mut remaining = count;
        let mut continuation = count > 0;
        while remaining > 0 {
            if self.pos >= self.data.len() {
                return None;
            }
            if continuation && self.boundaries.contains(&self.pos) {
                wide = self.read_u8()? & 0x01 != 0;
            }
            let limit = self.next_boundary().unwrap_or(self.data.len());
            let width = if wide { 2 } else { 1 };
            let take = (limit.saturating_sub(self.pos) / width).min(remaining);
            if take == 0 {
                self.pos = limit;
                continuation = true;
                continue;
            }
            let bytes = self.data.get(self.pos..self.pos + take * width)?;
            if wide {
                units.extend(
                    bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
                );
            } else {
                units.extend(bytes.iter().map(|&b| u16::from(b)));
            }
            self.pos += take * width;
            remaining -= take;
            continuation = remaining > 0 && self.pos == limit;
        }
        Some(String::from_utf16_lossy(&units))
    }
}

/// Text of a BIFF error code
pub fn error_text(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERR!",
    }
}
