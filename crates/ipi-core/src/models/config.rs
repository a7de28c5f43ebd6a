//! Configuration structures for the IPI pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// NF-e XML namespace.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Main configuration for the ipi pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Activity log configuration.
    pub log: LogConfig,

    /// TIPI table configuration.
    pub table: TableConfig,

    /// Input document configuration.
    pub documents: DocumentConfig,
}

/// Activity log configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Root directory of the dated log files.
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

/// What to do with a table line that has fewer than two fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLinePolicy {
    /// Treat the line as the end of the table.
    #[default]
    Stop,
    /// Skip the line and keep loading.
    Skip,
}

/// TIPI table configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Field delimiter.
    pub delimiter: char,

    /// Handling of lines with a missing rate column.
    pub malformed_line: MalformedLinePolicy,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            delimiter: ';',
            malformed_line: MalformedLinePolicy::Stop,
        }
    }
}

/// Input document configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Namespace of the `det` and `prod` elements.
    pub namespace: String,

    /// File extension of the documents, matched case-insensitively.
    pub extension: String,

    /// Process files in lexicographic path order.
    pub sort_by_name: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            namespace: NFE_NAMESPACE.to_string(),
            extension: "xml".to_string(),
            sort_by_name: true,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

impl TableConfig {
    /// Delimiter as a single byte.
    pub fn delimiter_byte(&self) -> Result<u8, crate::IpiError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                crate::IpiError::Config(format!(
                    "table delimiter must be a single ASCII character, got {:?}",
                    self.delimiter
                ))
            })
    }
}
