//! Batch IPI calculation over a directory of NF-e documents.
//!
//! A run validates the input directory, warms up the TIPI table once, then
//! reads every matching document and sums the IPI of its items. Failures are
//! contained at the smallest unit: a bad item contributes zero to its
//! document, a bad document contributes zero to the batch, and an unusable
//! table leaves every item without a rate. Only an input path that is not a
//! directory (or an invalid configuration) aborts the run.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern, glob_with};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::activity_log::ActivityLog;
use crate::calculator::compute_record;
use crate::document::{DocumentReader, NfeReader};
use crate::error::{IpiError, ItemError, Result, TableError};
use crate::models::config::ResolverConfig;
use crate::models::item::{BatchReport, ItemRecord};
use crate::table::{ReferenceTable, TableLoader};

const BANNER: &str = "*******************************************************";

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone, Copy)]
pub enum Progress<'a> {
    /// Documents were listed; `files` of them will be read.
    Started { files: usize },
    /// A document was handled, successfully or not.
    FileFinished {
        path: &'a Path,
        subtotal: Decimal,
        failed: bool,
    },
}

/// Runs the IPI calculation over a directory.
pub struct BatchRunner<R = NfeReader> {
    config: ResolverConfig,
    reader: R,
}

impl BatchRunner<NfeReader> {
    /// Runner reading NF-e documents as configured.
    pub fn new(config: ResolverConfig) -> Self {
        let reader = NfeReader::from_config(&config.documents);
        Self { config, reader }
    }
}

impl<R: DocumentReader> BatchRunner<R> {
    /// Runner with a custom document reader.
    pub fn with_reader(config: ResolverConfig, reader: R) -> Self {
        Self { config, reader }
    }

    /// Run the batch, narrating to `log`.
    pub fn run(&self, input_dir: &Path, table_path: &Path, log: &mut ActivityLog) -> Result<BatchReport> {
        self.run_with_progress(input_dir, table_path, log, |_| {})
    }

    /// Run the batch, reporting each finished document to `progress`.
    pub fn run_with_progress<F>(
        &self,
        input_dir: &Path,
        table_path: &Path,
        log: &mut ActivityLog,
        mut progress: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(Progress<'_>),
    {
        log.info(format!("{} Starting IPI Resolver {}", BANNER, BANNER));

        if !input_dir.is_dir() {
            log.info(format!(
                "The path given for the XML files is not a directory: {}",
                input_dir.display()
            ));
            return Err(IpiError::NotADirectory(input_dir.to_path_buf()));
        }

        let table = self.load_table(table_path, log)?;
        let mut report = BatchReport {
            table_entries: table.len(),
            ..BatchReport::default()
        };

        log.info("");
        log.info(format!("{} Starting IPI calculation {}", BANNER, BANNER));
        log.info(format!(
            "All .{} files in {} will be analysed.",
            self.config.documents.extension,
            input_dir.display()
        ));

        let files = self.list_documents(input_dir)?;
        report.files_found = files.len();
        log.info(format!("{} file(s) found.", files.len()));
        progress(Progress::Started { files: files.len() });

        for path in &files {
            let outcome = self.process_file(path, &table, log, &mut report);

            progress(Progress::FileFinished {
                path,
                subtotal: outcome.unwrap_or_default(),
                failed: outcome.is_none(),
            });
        }

        log.info(format!("{} IPI calculation finished {}", BANNER, BANNER));
        log.info(format!(
            "{} file(s) processed, {} failed; {} item(s) calculated, {} skipped.",
            report.files_processed, report.files_failed, report.items_calculated, report.items_skipped
        ));
        log.info("");
        log.info(format!("TOTAL CALCULATED (UNROUNDED): {}", report.total));
        log.info(format!("{} Execution finished successfully {}", BANNER, BANNER));

        Ok(report)
    }

    /// Warm up the TIPI table.
    ///
    /// Load problems are logged and leave the table with whatever was read
    /// before them. Only an invalid delimiter setting is an error.
    pub fn load_table(&self, path: &Path, log: &mut ActivityLog) -> Result<ReferenceTable> {
        let loader = TableLoader::from_config(&self.config.table)?;
        let mut table = ReferenceTable::new();

        log.info("");
        log.info(format!("{} Starting TIPI table warm-up {}", BANNER, BANNER));

        match loader.populate_from_path(&mut table, path) {
            Ok(outcome) => {
                for line in &outcome.skipped {
                    log.info(format!(
                        "Line {} skipped, not all required columns were provided.",
                        line
                    ));
                }
                if let Some(line) = outcome.stopped_at {
                    log.info(format!(
                        "Line {} ignored, not all required columns were provided. Loading stopped.",
                        line
                    ));
                }
                debug!("TIPI load outcome: {:?}", outcome);
            }
            Err(e @ TableError::Open { .. }) => {
                warn!("{}", e);
                log.info("The TIPI table could not be opened and will not be loaded into memory.");
                log.info(format!("Cause: {}", e));
            }
            Err(e) => {
                warn!("{}", e);
                log.info(format!("Unexpected error while loading the TIPI table: {}", e));
            }
        }

        log.info(format!(
            "{} TIPI table warm-up finished, {} NCM code(s) loaded {}",
            BANNER,
            table.len(),
            BANNER
        ));
        log.info("");

        Ok(table)
    }

    /// List documents with the configured extension, case-insensitively.
    fn list_documents(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*.{}",
            Pattern::escape(&dir.to_string_lossy()),
            Pattern::escape(&self.config.documents.extension)
        );
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let mut files: Vec<PathBuf> = glob_with(&pattern, options)
            .map_err(|e| IpiError::Config(format!("invalid document pattern {}: {}", pattern, e)))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();

        if self.config.documents.sort_by_name {
            files.sort();
        }

        Ok(files)
    }

    /// Process one document and add its subtotal to `report.total`.
    ///
    /// Returns the subtotal, or `None` if the document could not be read or
    /// its subtotal would overflow the batch total.
    pub fn process_file(
        &self,
        path: &Path,
        table: &ReferenceTable,
        log: &mut ActivityLog,
        report: &mut BatchReport,
    ) -> Option<Decimal> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        log.info(format!("Reading XML {}", name));

        let records = match self.reader.read_items(path) {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                log.info(format!("Unexpected error in {}: {}", name, e));
                report.files_failed += 1;
                return None;
            }
        };

        if records.is_empty() {
            log.info("The NF-e has no items.");
        }

        let subtotal = self.process_items(&records, table, log, report);

        let Some(total) = report.total.checked_add(subtotal) else {
            warn!("Subtotal of {} overflows the batch total", path.display());
            log.info(format!(
                "Subtotal {} of {} overflows the batch total, the file was not counted.",
                subtotal, name
            ));
            report.files_failed += 1;
            return None;
        };
        report.total = total;
        report.files_processed += 1;

        log.info(format!("Finished reading XML {}, subtotal {}.", name, subtotal));
        Some(subtotal)
    }

    fn process_items(
        &self,
        records: &[ItemRecord],
        table: &ReferenceTable,
        log: &mut ActivityLog,
        report: &mut BatchReport,
    ) -> Decimal {
        let mut subtotal = Decimal::ZERO;

        for record in records {
            log.info(format!("*** Reading item {} of the NF-e.", record.ordinal));

            let computed = compute_record(record, table).and_then(|result| {
                match subtotal.checked_add(result.tax_amount) {
                    Some(sum) => Ok((result, sum)),
                    None => Err(ItemError::Overflow { code: result.code }),
                }
            });

            match computed {
                Ok((result, sum)) => {
                    log.info(format!("       * NCM: {}", result.code));
                    log.info(format!("       * Value: {}", result.gross_value));
                    log.info(format!(
                        "       * Calculation: ({} * {}%) = {}",
                        result.gross_value, result.rate_percent, result.tax_amount
                    ));
                    subtotal = sum;
                    report.items_calculated += 1;
                }
                Err(e) => {
                    log.info(format!(
                        "****** Error reading item {}, execution will continue. Error: {}",
                        record.ordinal, e
                    ));
                    report.items_skipped += 1;
                }
            }
        }

        subtotal
    }
}
