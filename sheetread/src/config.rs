//! Decode options

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ReadError, Result};

/// Default cap on sector-chain walks, independent of anything the file declares.
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 4 * 1024 * 1024;

/// Options applied to a single decode call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Restrict loading to these sheet names (case-insensitive).
    /// Loaded sheets keep their original 0-based index.
    pub sheets: Option<Vec<String>>,
    /// Turn numbers with a date/time format into calendar values
    pub convert_dates: bool,
    /// Hard upper bound on the number of steps of any sector chain walk
    pub max_chain_length: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            sheets: None,
            convert_dates: true,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
        }
    }
}

impl ReaderConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReaderConfig =
            toml::from_str(content).map_err(|e| ReadError::Config(e.to_string()))?;
        if config.max_chain_length == 0 {
            return Err(ReadError::Config(
                "max_chain_length must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    /// Configuration that loads only the named sheets
    pub fn for_sheets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sheets: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Check if a sheet passes the name filter
    pub fn wants_sheet(&self, name: &str) -> bool {
        match &self.sheets {
            None => true,
            Some(names) => {
                let name = name.to_lowercase();
                names.iter().any(|n| n.to_lowercase() == name)
            }
        }
    }
}
