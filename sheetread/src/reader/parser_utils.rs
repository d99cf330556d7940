//! Common parsing utilities shared between the XLSX and XLS parsers

use quick_xml::Reader;
use quick_xml::events::Event;

/// Convert a 0-based column index to letters: 0 -> "A", 26 -> "AA"
pub fn column_letters(index: u32) -> String {
    let mut n = index as u64 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert column letters to a 0-based index: "A" -> 0, "AA" -> 26.
/// Case-insensitive; `None` for empty, non-alphabetic or overflowing input.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    Some(col - 1)
}

/// Parse a cell reference like "B3" into (1-based row, 0-based col).
/// `$` anchors are ignored.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let cleaned: String = cell_ref.chars().filter(|c| *c != '$').collect();
    let split = cleaned.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cleaned.split_at(split);
    let col = column_index(letters)?;
    let row = digits.parse::<u32>().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, col))
}

/// Decode `_xHHHH_` placeholders used by the package format for characters
/// XML cannot carry. `_x005F_` escapes a literal underscore sequence.
pub fn unescape_placeholders(text: &str) -> String {
    if !text.contains("_x") {
        return text.to_string();
    }
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut units: Vec<u16> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(unit) = placeholder_at(bytes, i) {
            units.push(unit);
            i += 7;
            continue;
        }
        if !units.is_empty() {
            out.push_str(&String::from_utf16_lossy(&units));
            units.clear();
        }
        // Advance by a whole character
        let ch = text[i..].chars().next().unwrap_or('\u{FFFD}');
        out.push(ch);
        i += ch.len_utf8().max(1);
    }
    if !units.is_empty() {
        out.push_str(&String::from_utf16_lossy(&units));
    }
    out
}

fn placeholder_at(bytes: &[u8], i: usize) -> Option<u16> {
    let window = bytes.get(i..i + 7)?;
    if window[0] != b'_' || window[1] != b'x' || window[6] != b'_' {
        return None;
    }
    let hex = std::str::from_utf8(&window[2..6]).ok()?;
    u16::from_str_radix(hex, 16).ok()
}

/// Read text content up to the end of the current element
pub fn read_text_node<R: std::io::BufRead>(
    reader: &mut Reader<R>,
) -> Result<String, quick_xml::Error> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
