//! Delimited-text loader for the TIPI table.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use csv::{ByteRecord, ReaderBuilder};
use rust_decimal::Decimal;
use tracing::{debug, trace};

use super::ReferenceTable;
use crate::error::TableError;
use crate::models::config::{MalformedLinePolicy, TableConfig};

/// Summary of one population pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Lines that produced an entry, including ones that replaced a code.
    pub loaded: usize,
    /// Lines whose code was already present.
    pub replaced: usize,
    /// Line that ended the load under [`MalformedLinePolicy::Stop`].
    pub stopped_at: Option<u64>,
    /// Lines ignored under [`MalformedLinePolicy::Skip`].
    pub skipped: Vec<u64>,
}

/// Reads `code;rate` lines into a [`ReferenceTable`].
#[derive(Debug, Clone)]
pub struct TableLoader {
    delimiter: u8,
    malformed_line: MalformedLinePolicy,
}

impl TableLoader {
    /// Loader with `;` as delimiter that stops at the first malformed line.
    pub fn new() -> Self {
        Self {
            delimiter: b';',
            malformed_line: MalformedLinePolicy::Stop,
        }
    }

    /// Build a loader from the table configuration.
    pub fn from_config(config: &TableConfig) -> crate::Result<Self> {
        Ok(Self::new()
            .with_delimiter(config.delimiter_byte()?)
            .with_malformed_line(config.malformed_line))
    }

    /// Set the field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the policy for lines without a rate column.
    pub fn with_malformed_line(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_line = policy;
        self
    }

    /// Open `path` and populate `table` from it.
    pub fn populate_from_path(
        &self,
        table: &mut ReferenceTable,
        path: &Path,
    ) -> Result<LoadOutcome, TableError> {
        let file = File::open(path).map_err(|source| TableError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.populate(table, file)
    }

    /// Populate `table` line by line.
    ///
    /// Field 0 is the code, kept verbatim; field 1 is the rate. Further
    /// fields are ignored and need not be UTF-8. A line with fewer than two
    /// non-empty fields is handled per the malformed-line policy. A code that
    /// is not UTF-8, or an unparseable or negative rate, is returned as an
    /// error; the entries read before it stay in `table`. Blank lines are
    /// ignored.
    pub fn populate<R: Read>(
        &self,
        table: &mut ReferenceTable,
        source: R,
    ) -> Result<LoadOutcome, TableError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(source);

        let mut outcome = LoadOutcome::default();
        let mut record = ByteRecord::new();

        while reader.read_byte_record(&mut record)? {
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            let Some((code, raw_rate)) = split_line(&record) else {
                match self.malformed_line {
                    MalformedLinePolicy::Stop => {
                        debug!("TIPI line {} has no rate column, stopping", line);
                        outcome.stopped_at = Some(line);
                        break;
                    }
                    MalformedLinePolicy::Skip => {
                        debug!("TIPI line {} has no rate column, skipping", line);
                        outcome.skipped.push(line);
                        continue;
                    }
                }
            };

            let code = std::str::from_utf8(code).map_err(|_| TableError::InvalidCode {
                line,
                value: String::from_utf8_lossy(code).into_owned(),
            })?;
            let rate = std::str::from_utf8(raw_rate)
                .ok()
                .and_then(|r| Decimal::from_str(r).ok())
                .filter(|r| !r.is_sign_negative())
                .ok_or_else(|| TableError::InvalidRate {
                    line,
                    value: String::from_utf8_lossy(raw_rate).into_owned(),
                })?;

            trace!("TIPI {} -> {}%", code, rate);
            if table.insert(code.to_string(), rate).is_some() {
                outcome.replaced += 1;
            }
            outcome.loaded += 1;
        }

        Ok(outcome)
    }
}

impl Default for TableLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn split_line(record: &ByteRecord) -> Option<(&[u8], &[u8])> {
    let code = record.get(0).filter(|c| !c.is_empty())?;
    let rate = record.get(1).map(<[u8]>::trim_ascii).filter(|r| !r.is_empty())?;
    Some((code, rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn populate(loader: &TableLoader, source: &str) -> (ReferenceTable, Result<LoadOutcome, TableError>) {
        let mut table = ReferenceTable::new();
        let result = loader.populate(&mut table, source.as_bytes());
        (table, result)
    }

    #[test]
    fn test_stops_at_line_with_one_field() {
        let source = "01012100;0\n01012900;10\n02011000\n02012010;5\n";
        let (table, result) = populate(&TableLoader::new(), source);
        let outcome = result.unwrap();

        assert_eq!(outcome.loaded, 2);
        assert_eq!(outcome.stopped_at, Some(3));
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("02012010"), None);
    }

    #[test]
    fn test_skip_policy_continues() {
        let loader = TableLoader::new().with_malformed_line(MalformedLinePolicy::Skip);
        let source = "01012100;0\n02011000\n02012010;5\n";
        let (table, result) = populate(&loader, source);
        let outcome = result.unwrap();

        assert_eq!(outcome.loaded, 2);
        assert_eq!(outcome.skipped, vec![2]);
        assert_eq!(outcome.stopped_at, None);
        assert_eq!(table.lookup("02012010"), Some(Decimal::new(5, 0)));
    }

    #[test]
    fn test_empty_rate_is_malformed() {
        let (table, result) = populate(&TableLoader::new(), "01012100;3\n01012900;\n");

        assert_eq!(result.unwrap().stopped_at, Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_invalid_rate_is_an_error() {
        let (table, result) = populate(&TableLoader::new(), "01012100;3\n01012900;NT\n03019100;4\n");

        match result {
            Err(TableError::InvalidRate { line, value }) => {
                assert_eq!(line, 2);
                assert_eq!(value, "NT");
            }
            other => panic!("expected InvalidRate, got {:?}", other),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_negative_rate_is_an_error() {
        let (_, result) = populate(&TableLoader::new(), "01012100;-3\n");
        assert!(matches!(result, Err(TableError::InvalidRate { line: 1, .. })));
    }

    #[test]
    fn test_extra_columns_and_whitespace() {
        let source = "8471.30.19; 5.0 ;Máquinas automáticas\r\n\n0101.21.00;0;Cavalos\r\n";
        let (table, result) = populate(&TableLoader::new(), source);

        assert_eq!(result.unwrap().loaded, 2);
        assert_eq!(table.lookup("8471.30.19"), Some(Decimal::new(50, 1)));
        assert_eq!(table.lookup("0101.21.00"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_custom_delimiter() {
        let loader = TableLoader::new().with_delimiter(b',');
        let (table, result) = populate(&loader, "22021000,4\n");

        assert_eq!(result.unwrap().loaded, 1);
        assert_eq!(table.lookup("22021000"), Some(Decimal::new(4, 0)));
    }

    #[test]
    fn test_replaced_count() {
        let (table, result) = populate(&TableLoader::new(), "1;1\n1;2\n2;3\n");
        let outcome = result.unwrap();

        assert_eq!(outcome.loaded, 3);
        assert_eq!(outcome.replaced, 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let mut table = ReferenceTable::new();
        let result = TableLoader::new()
            .populate_from_path(&mut table, Path::new("/nonexistent/tipi.csv"));

        assert!(matches!(result, Err(TableError::Open { .. })));
        assert!(table.is_empty());
    }

    #[test]
    fn test_latin1_description_column() {
        let source: &[u8] = b"01012100;0;Cavalos\n8471.30.19;5.0;M\xE1quinas\n22030000;10;Cerveja\n";
        let mut table = ReferenceTable::new();
        let outcome = TableLoader::new().populate(&mut table, source).unwrap();

        assert_eq!(outcome.loaded, 3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("8471.30.19"), Some(Decimal::from_str("5.0").unwrap()));
    }

    #[test]
    fn test_non_utf8_code_is_an_error() {
        let source: &[u8] = b"01012100;0\nM\xE1q;5\n22030000;10\n";
        let mut table = ReferenceTable::new();
        let result = TableLoader::new().populate(&mut table, source);

        assert!(matches!(result, Err(TableError::InvalidCode { line: 2, .. })));
        assert_eq!(table.len(), 1);
    }
}
