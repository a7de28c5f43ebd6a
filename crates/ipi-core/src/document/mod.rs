//! Input document reading.

mod nfe;

pub use nfe::NfeReader;

use std::path::Path;

use crate::error::DocumentError;
use crate::models::item::ItemRecord;

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Trait for readers that turn one input file into line-item records.
pub trait DocumentReader {
    /// Read every item of the document at `path`.
    ///
    /// A malformed document is an error; readers never return the items
    /// found before the fault.
    fn read_items(&self, path: &Path) -> Result<Vec<ItemRecord>>;
}
