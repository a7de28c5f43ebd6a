//! TIPI reference table: NCM code to IPI rate.

mod loader;

pub use loader::{LoadOutcome, TableLoader};

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use rust_decimal::Decimal;

use crate::error::TableError;

/// In-memory TIPI table.
///
/// Keys are NCM codes exactly as they appear in the source file, so
/// `"01012100"` and `"1012100"` are different entries. Rates are percentages
/// (`5.0` means 5%).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    rates: HashMap<String, Decimal>,
}

impl ReferenceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a `;`-separated source with the default loader.
    pub fn load<R: Read>(source: R) -> Result<Self, TableError> {
        let mut table = Self::new();
        TableLoader::new().populate(&mut table, source)?;
        Ok(table)
    }

    /// Load a table file with the default loader.
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let mut table = Self::new();
        TableLoader::new().populate_from_path(&mut table, path)?;
        Ok(table)
    }

    /// Rate for an NCM code. No trimming or case folding is applied.
    pub fn lookup(&self, code: &str) -> Option<Decimal> {
        self.rates.get(code).copied()
    }

    /// Number of distinct codes.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterate over `(code, rate)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.rates.iter().map(|(code, rate)| (code.as_str(), *rate))
    }

    /// Insert or replace a rate, returning the previous one.
    pub(crate) fn insert(&mut self, code: String, rate: Decimal) -> Option<Decimal> {
        self.rates.insert(code, rate)
    }
}
