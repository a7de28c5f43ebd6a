//! Batch run - calculate the IPI of a directory of NF-e files.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::debug;

use ipi_core::{ActivityLog, BatchReport, BatchRunner, Progress};

use super::config::load_config;

/// Arguments for a batch run.
#[derive(Args)]
pub struct RunArgs {
    /// Directory containing the NF-e XML files
    #[arg(required = true)]
    input_dir: Option<PathBuf>,

    /// TIPI table file (`NCM;rate` per line)
    #[arg(required = true)]
    table: Option<PathBuf>,

    /// Root directory of the activity log (overrides the config)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Output format of the summary
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text summary
    Text,
    /// JSON output
    Json,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    #[serde(flatten)]
    report: &'a BatchReport,
    log_file: &'a Path,
}

pub fn run(args: RunArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let start = Instant::now();

    let (Some(input_dir), Some(table)) = (args.input_dir, args.table) else {
        anyhow::bail!("both the XML directory and the TIPI table are required");
    };

    let mut config = load_config(config_path)?;
    if let Some(log_dir) = args.log_dir {
        config.log.dir = log_dir;
    }

    let mut log = ActivityLog::new(&config.log.dir)
        .with_context(|| format!("cannot use log directory {}", config.log.dir.display()))?;
    let runner = BatchRunner::new(config);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let result = runner.run_with_progress(&input_dir, &table, &mut log, |event| match event {
        Progress::Started { files } => pb.set_length(files as u64),
        Progress::FileFinished { path, failed, .. } => {
            if failed {
                pb.println(format!("{} Failed to read {}", style("✗").red(), path.display()));
            }
            pb.inc(1);
        }
    });
    pb.finish_and_clear();

    // The log is written even when the run aborts.
    let flushed = log.flush().context("failed to write the activity log");
    let report = result?;
    let log_file = flushed?;

    debug!("Total processing time: {:?}", start.elapsed());

    match args.format {
        OutputFormat::Json => {
            let summary = RunSummary {
                report: &report,
                log_file: &log_file,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => print_summary(&report, &log_file, start),
    }

    Ok(())
}

fn print_summary(report: &BatchReport, log_file: &Path, start: Instant) {
    println!(
        "{} Processed {} of {} files in {:?}",
        style("✓").green(),
        report.files_processed,
        report.files_found,
        start.elapsed()
    );
    println!(
        "   {} items calculated, {} skipped, {} files failed",
        style(report.items_calculated).green(),
        style(report.items_skipped).yellow(),
        style(report.files_failed).red()
    );
    println!("   {} NCM codes loaded from the TIPI table", report.table_entries);
    println!();
    println!(
        "{} Total IPI (unrounded): {}",
        style("ℹ").blue(),
        style(report.total).bold()
    );
    println!("{} Log written to {}", style("ℹ").blue(), log_file.display());
}
