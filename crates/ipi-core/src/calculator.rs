//! IPI calculation for a single line item.

use rust_decimal::Decimal;

use crate::error::ItemError;
use crate::models::item::{CalculationResult, ItemRecord, LineItem};
use crate::table::ReferenceTable;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Compute the IPI of one line item.
///
/// `tax_amount = gross_value * rate / 100`, unrounded. A code absent from
/// the table is [`ItemError::NoRate`]; a product outside the `Decimal` range
/// is [`ItemError::Overflow`]. The table is never modified.
pub fn compute(item: &LineItem, table: &ReferenceTable) -> Result<CalculationResult, ItemError> {
    let rate_percent = table.lookup(&item.code).ok_or_else(|| ItemError::NoRate {
        code: item.code.clone(),
    })?;

    let tax_amount = item
        .gross_value
        .checked_mul(rate_percent / HUNDRED)
        .ok_or_else(|| ItemError::Overflow {
            code: item.code.clone(),
        })?;

    Ok(CalculationResult {
        code: item.code.clone(),
        gross_value: item.gross_value,
        rate_percent,
        tax_amount,
    })
}

/// Extract the line item from a document record and compute its IPI.
pub fn compute_record(
    record: &ItemRecord,
    table: &ReferenceTable,
) -> Result<CalculationResult, ItemError> {
    let item = LineItem::from_record(record)?;
    compute(&item, table)
}
