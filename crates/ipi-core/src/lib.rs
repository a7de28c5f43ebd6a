//! Core library for IPI calculation over NF-e documents.
//!
//! This crate provides:
//! - TIPI reference table loading (NCM code to IPI rate)
//! - NF-e line item extraction (`det/prod` records)
//! - Per-item IPI calculation with decimal arithmetic
//! - Batch processing of a document directory with failure isolation
//! - A buffered, date-partitioned activity log

pub mod activity_log;
pub mod batch;
pub mod calculator;
pub mod document;
pub mod error;
pub mod models;
pub mod table;

pub use activity_log::{ActivityLog, Clock, SystemClock};
pub use batch::{BatchRunner, Progress};
pub use calculator::{compute, compute_record};
pub use document::{DocumentReader, NfeReader};
pub use error::{DocumentError, IpiError, ItemError, LogError, Result, TableError};
pub use models::config::{MalformedLinePolicy, ResolverConfig};
pub use models::item::{BatchReport, CalculationResult, ItemRecord, LineItem};
pub use table::{LoadOutcome, ReferenceTable, TableLoader};
