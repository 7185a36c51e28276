//! Append-only JSON-lines record of verification runs.
//!
//! Each run is one line. A torn final line from a crash only affects that
//! line; every earlier entry stays readable.

use crate::error::{Result, VerifyError};
use crate::metrics::AgreementReport;
use crate::models::{Disagreement, Unscored};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Summary of one verification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub timestamp: DateTime<Utc>,
    pub judge_model: String,
    pub dataset_source: String,
    #[serde(default)]
    pub category_filter: Option<String>,
    /// Requested sample size, if any
    #[serde(default)]
    pub sample_size: Option<usize>,
    pub seed: u64,
    #[serde(default)]
    pub train_test: bool,
    /// Records handed to the runner
    pub selected: usize,
    /// Records whose judge call completed, successfully or not
    pub attempted: usize,
    /// Records that produced a verdict and feed the report
    pub scored: usize,
    /// Set when the run was interrupted before every selected record was judged
    #[serde(default)]
    pub partial: bool,
    pub report: AgreementReport,
    #[serde(default)]
    pub disagreements: Vec<Disagreement>,
    #[serde(default)]
    pub unscored: Vec<Unscored>,
}

/// A ledger line that could not be parsed
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct MalformedLine {
    pub line: usize,
    pub message: String,
}

/// Append one entry as a single line
pub fn append(path: &Path, entry: &RunEntry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            VerifyError::ledger(format!("Failed to create directory: {}", parent.display()), e)
        })?;
    }

    let mut line = serde_json::to_string(entry)
        .map_err(|e| VerifyError::ledger("Failed to serialize run entry", e.into()))?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| VerifyError::ledger(format!("Failed to open ledger: {}", path.display()), e))?;

    // A torn line left by a crash must not swallow this entry
    if !ends_with_newline(&mut file)
        .map_err(|e| VerifyError::ledger(format!("Failed to inspect ledger: {}", path.display()), e))?
    {
        warn!(path = %path.display(), "Ledger ends with an incomplete line");
        line.insert(0, '\n');
    }

    // One write of the whole line keeps concurrent appenders from interleaving
    file.write_all(line.as_bytes())
        .map_err(|e| VerifyError::ledger(format!("Failed to append to ledger: {}", path.display()), e))?;

    debug!(path = %path.display(), judge_model = %entry.judge_model, "Run appended to ledger");
    Ok(())
}

/// True for an empty file or one whose last byte is a newline
fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Open a ledger for lazy, line-by-line reading
pub fn read_all(path: &Path) -> Result<LedgerReader<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| VerifyError::ledger(format!("Failed to open ledger: {}", path.display()), e))?;
    Ok(LedgerReader::new(BufReader::new(file)))
}

/// Valid entries in append order; malformed lines are logged and skipped.
/// A ledger that does not exist yet has no entries.
pub fn entries(path: &Path) -> Result<Vec<RunEntry>> {
    let reader = match read_all(path) {
        Ok(reader) => reader,
        Err(VerifyError::Ledger { source, .. }) if source.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No ledger yet");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    Ok(reader
        .filter_map(|item| match item {
            Ok(entry) => Some(entry),
            Err(malformed) => {
                warn!(path = %path.display(), line = malformed.line, error = %malformed.message, "Skipping malformed ledger line");
                None
            }
        })
        .collect())
}

/// Iterator over ledger lines
pub struct LedgerReader<R> {
    reader: R,
    line: usize,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> LedgerReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: Vec::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for LedgerReader<R> {
    type Item = std::result::Result<RunEntry, MalformedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            self.line += 1;

            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    if self.buf.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Some(serde_json::from_slice(&self.buf).map_err(|e| MalformedLine {
                        line: self.line,
                        message: e.to_string(),
                    }));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(MalformedLine {
                        line: self.line,
                        message: e.to_string(),
                    }));
                }
            }
        }
        None
    }
}
