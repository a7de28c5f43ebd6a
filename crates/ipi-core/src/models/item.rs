//! Line item and batch report models.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ItemError;

/// Name of the classification code field inside `prod`.
pub const NCM_FIELD: &str = "NCM";

/// Name of the gross value field inside `prod`.
pub const VPROD_FIELD: &str = "vProd";

/// One `det` element as read from a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemRecord {
    /// Position of the item in its document (1-indexed).
    pub ordinal: usize,
    /// Text content of the `prod` children, keyed by local name.
    pub fields: HashMap<String, String>,
}

impl ItemRecord {
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            fields: HashMap::new(),
        }
    }

    /// Builder used by tests and in-memory readers.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Value of a field, `None` when absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// A product line ready for calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// NCM classification code, kept verbatim.
    pub code: String,
    /// Pre-tax value of the line.
    pub gross_value: Decimal,
}

impl LineItem {
    pub fn new(code: impl Into<String>, gross_value: Decimal) -> Self {
        Self {
            code: code.into(),
            gross_value,
        }
    }

    /// Extract the NCM code and `vProd` value from a record.
    pub fn from_record(record: &ItemRecord) -> Result<Self, ItemError> {
        let code = required(record, NCM_FIELD)?;
        let raw_value = required(record, VPROD_FIELD)?;

        let gross_value = Decimal::from_str(raw_value)
            .ok()
            .filter(|v| !v.is_sign_negative())
            .ok_or_else(|| ItemError::InvalidValue {
                field: VPROD_FIELD,
                value: raw_value.to_string(),
            })?;

        Ok(Self::new(code, gross_value))
    }
}

fn required<'r>(record: &'r ItemRecord, name: &'static str) -> Result<&'r str, ItemError> {
    record
        .field(name)
        .filter(|v| !v.is_empty())
        .ok_or(ItemError::MissingField(name))
}

/// Tax computed for one line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// NCM code the rate was resolved with.
    pub code: String,
    /// Base value.
    pub gross_value: Decimal,
    /// Rate in percent, as found in the table.
    pub rate_percent: Decimal,
    /// `gross_value * rate_percent / 100`, unrounded.
    pub tax_amount: Decimal,
}

/// Summary of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Entries in the TIPI table after warm-up.
    pub table_entries: usize,
    /// Documents matching the extension filter.
    pub files_found: usize,
    /// Documents read successfully.
    pub files_processed: usize,
    /// Documents that could not be read.
    pub files_failed: usize,
    /// Items that contributed a calculated amount.
    pub items_calculated: usize,
    /// Items skipped because of an item error.
    pub items_skipped: usize,
    /// Grand total of the IPI, unrounded.
    pub total: Decimal,
}
