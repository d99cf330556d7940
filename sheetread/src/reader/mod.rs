//! Workbook decoders and the registry that dispatches between them

use log::debug;
use std::fs;
use std::path::Path;

pub mod biff;
pub mod binary;
pub mod cfb;
pub mod formats;
pub mod parser_utils;
pub mod workbook;
pub mod xls_parser;
pub mod xlsx_parser;

use self::xls_parser::XlsDecoder;
use self::xlsx_parser::XlsxDecoder;
use crate::config::ReaderConfig;
use crate::error::{ReadError, Result};
pub use formats::DateSystem;
pub use workbook::{
    Cell, CellType, CellValue, Number, Record, Row, SheetVisibility, Workbook, Worksheet,
};

/// Capability implemented by each container format
pub trait WorkbookDecoder: Send + Sync {
    /// Short identifier used in logs (e.g., "xlsx")
    fn name(&self) -> &str;

    /// Cheap signature check; must not decode anything
    fn probe(&self, bytes: &[u8]) -> bool;

    /// Decode the whole input in one pass
    fn decode(&self, bytes: &[u8], source: &str, config: &ReaderConfig) -> Result<Workbook>;

    /// Declared sheet names, in order, without decoding cells
    fn list_sheet_names(&self, bytes: &[u8], config: &ReaderConfig) -> Result<Vec<String>>;
}

/// Ordered list of decoders; the first whose probe accepts the input wins
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn WorkbookDecoder>>,
}

impl DecoderRegistry {
    /// Registry with the built-in package and compound-file decoders
    pub fn new() -> Self {
        Self {
            decoders: vec![Box::new(XlsxDecoder), Box::new(XlsDecoder)],
        }
    }

    /// Registry with no decoders at all
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Add a decoder ahead of every existing one
    pub fn register(&mut self, decoder: Box<dyn WorkbookDecoder>) {
        self.decoders.insert(0, decoder);
    }

    pub fn decoders(&self) -> impl Iterator<Item = &dyn WorkbookDecoder> {
        self.decoders.iter().map(|d| d.as_ref())
    }

    pub fn decoder_for(&self, bytes: &[u8]) -> Result<&dyn WorkbookDecoder> {
        self.decoders()
            .find(|d| d.probe(bytes))
            .ok_or_else(|| {
                let head: Vec<String> = bytes.iter().take(8).map(|b| format!("{b:02X}")).collect();
                ReadError::UnsupportedFormat(format!(
                    "no decoder recognizes input starting with [{}]",
                    head.join(" ")
                ))
            })
    }

    pub fn load_bytes(&self, bytes: &[u8], source: &str, config: &ReaderConfig) -> Result<Workbook> {
        let decoder = self.decoder_for(bytes)?;
        debug!("decoding {source} with the {} decoder", decoder.name());
        decoder.decode(bytes, source, config)
    }

    pub fn list_sheet_names_bytes(&self, bytes: &[u8], config: &ReaderConfig) -> Result<Vec<String>> {
        self.decoder_for(bytes)?.list_sheet_names(bytes, config)
    }

    /// Read a file and decode it
    pub fn load_path<P: AsRef<Path>>(&self, path: P, config: &ReaderConfig) -> Result<Workbook> {
        let path_ref = path.as_ref();
        let bytes = fs::read(path_ref)?;
        self.load_bytes(&bytes, &path_ref.display().to_string(), config)
    }

    pub fn list_sheet_names_path<P: AsRef<Path>>(
        &self,
        path: P,
        config: &ReaderConfig,
    ) -> Result<Vec<String>> {
        let bytes = fs::read(path.as_ref())?;
        self.list_sheet_names_bytes(&bytes, config)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
