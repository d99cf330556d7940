//! sheetread: read-only decoding of spreadsheet files
//!
//! Two container formats are understood: the ZIP/XML package (`.xlsx`,
//! `.xlsm`) and the legacy compound file carrying a BIFF5/BIFF8 record
//! stream (`.xls`). Both decode into the same immutable [`Workbook`] model.
//!
//! ```no_run
//! let workbook = sheetread::load("report.xlsx")?;
//! for sheet in workbook.sheets() {
//!     println!("{}: {} rows", sheet.name(), sheet.highest_row());
//! }
//! # Ok::<(), sheetread::ReadError>(())
//! ```

pub mod config;
pub mod error;
pub mod reader;

use std::path::Path;

pub use config::ReaderConfig;
pub use error::{ReadError, Result};
pub use reader::{
    Cell, CellType, CellValue, DateSystem, DecoderRegistry, Number, Record, Row, SheetVisibility,
    Workbook, WorkbookDecoder, Worksheet,
};

/// Load every sheet of a workbook file with default options
pub fn load<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    load_with_config(path, &ReaderConfig::default())
}

/// Load a workbook file with explicit options
pub fn load_with_config<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Workbook> {
    DecoderRegistry::new().load_path(path, config)
}

/// Load only the named sheets; each keeps its original index
pub fn load_sheets<P, I, S>(path: P, names: I) -> Result<Workbook>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    load_with_config(path, &ReaderConfig::for_sheets(names))
}

/// Sheet names in declaration order, without decoding cells
pub fn list_sheet_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    DecoderRegistry::new().list_sheet_names_path(path, &ReaderConfig::default())
}
