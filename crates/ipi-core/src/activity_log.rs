//! Buffered activity log written to date-partitioned text files.
//!
//! Entries are kept in memory during a run and appended to
//! `<root>/<yyyy>/<MM>/<dd-MM-yyyy>.txt` on [`ActivityLog::flush`]. Each line
//! is `dd/MM/yyyy HH:mm:ss - message`.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info};

use crate::error::LogError;

const LINE_TIMESTAMP: &str = "%d/%m/%Y %H:%M:%S";

/// Source of the timestamps used by the log.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Append-only run log.
pub struct ActivityLog {
    root: PathBuf,
    buffer: Vec<String>,
    clock: Box<dyn Clock>,
}

impl ActivityLog {
    /// Create a log rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LogError> {
        Self::with_clock(root, SystemClock)
    }

    /// Create a log with a custom clock.
    pub fn with_clock(root: impl Into<PathBuf>, clock: impl Clock + 'static) -> Result<Self, LogError> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|source| LogError::Io {
                path: root.clone(),
                source,
            })?;
        } else if !root.is_dir() {
            return Err(LogError::InvalidRoot(root));
        }

        Ok(Self {
            root,
            buffer: Vec::new(),
            clock: Box::new(clock),
        })
    }

    /// Root directory of the log files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Buffer a timestamped entry.
    pub fn info(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{}", message);

        let timestamp = self.clock.now().format(LINE_TIMESTAMP);
        self.buffer.push(format!("{} - {}", timestamp, message));
    }

    /// Entries buffered since the last flush.
    pub fn entries(&self) -> &[String] {
        &self.buffer
    }

    /// Path of the file the next flush writes to.
    pub fn current_file(&self) -> PathBuf {
        let now = self.clock.now();
        self.root
            .join(now.format("%Y").to_string())
            .join(now.format("%m").to_string())
            .join(format!("{}.txt", now.format("%d-%m-%Y")))
    }

    /// Append the buffered entries to today's file and clear the buffer.
    pub fn flush(&mut self) -> Result<PathBuf, LogError> {
        let path = self.current_file();
        let io_error = |source| LogError::Io {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error)?;
        let mut writer = BufWriter::new(file);

        for line in &self.buffer {
            writeln!(writer, "{}", line).map_err(io_error)?;
        }
        writer.flush().map_err(io_error)?;

        debug!("Flushed {} log entries to {}", self.buffer.len(), path.display());
        self.buffer.clear();
        Ok(path)
    }
}

impl std::fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLog")
            .field("root", &self.root)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    /// Clock frozen at a given instant.
    pub(crate) struct FixedClock(pub NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    pub(crate) fn fixed_clock() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2024, 3, 7)
                .unwrap()
                .and_hms_opt(9, 5, 30)
                .unwrap(),
        )
    }

    #[test]
    fn test_entries_are_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ActivityLog::with_clock(dir.path(), fixed_clock()).unwrap();

        log.info("Starting");
        log.info("");

        assert_eq!(
            log.entries(),
            &["07/03/2024 09:05:30 - Starting", "07/03/2024 09:05:30 - "]
        );
    }

    #[test]
    fn test_flush_writes_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ActivityLog::with_clock(dir.path(), fixed_clock()).unwrap();

        log.info("first");
        let path = log.flush().unwrap();

        assert_eq!(path, dir.path().join("2024").join("03").join("07-03-2024.txt"));
        assert!(log.entries().is_empty());

        log.info("second");
        log.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "07/03/2024 09:05:30 - first\n07/03/2024 09:05:30 - second\n"
        );
    }

    #[test]
    fn test_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("logs");

        let log = ActivityLog::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(log.root(), root.as_path());
    }

    #[test]
    fn test_rejects_file_as_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        assert!(matches!(ActivityLog::new(&file), Err(LogError::InvalidRoot(_))));
    }
}
