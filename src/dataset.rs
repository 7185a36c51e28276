use crate::error::{Result, VerifyError};
use crate::models::{Record, Verdict};
use std::fs::File;
use std::io;
use std::path::Path;

const REQUIRED_COLUMNS: [&str; 3] = ["question", "response", "label"];

/// Column positions resolved from the header row
struct Columns {
    question: usize,
    response: usize,
    label: usize,
    category: Option<usize>,
    id: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        if let Some(missing) = REQUIRED_COLUMNS.iter().find(|&&c| find(c).is_none()) {
            return Err(VerifyError::DatasetFormat {
                row: 1,
                message: format!("missing required column '{}'", missing),
            });
        }

        Ok(Self {
            question: find("question").unwrap_or_default(),
            response: find("response").unwrap_or_default(),
            label: find("label").unwrap_or_default(),
            category: find("category"),
            id: find("id"),
        })
    }
}

/// Load labeled records from a CSV file
pub fn load_dataset(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).map_err(|e| VerifyError::DatasetIo {
        path: path.display().to_string(),
        source: e.into(),
    })?;

    let records = load_from_reader(file)?;
    tracing::debug!(path = %path.display(), count = records.len(), "Dataset loaded");
    Ok(records)
}

/// Load labeled records from any CSV reader
pub fn load_from_reader<R: io::Read>(input: R) -> Result<Vec<Record>> {
    read_records(csv::ReaderBuilder::new().from_reader(input))
}

fn read_records<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<Record>> {
    let headers = reader
        .headers()
        .map_err(|e| VerifyError::DatasetFormat {
            row: 1,
            message: format!("unreadable header: {}", e),
        })?
        .clone();
    let columns = Columns::resolve(&headers)?;

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let ordinal = index + 1;
        // Header is line 1, so the first data row is line 2 unless quoting spans lines
        let fallback_line = ordinal + 1;

        let row = row.map_err(|e| VerifyError::DatasetFormat {
            row: e
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(fallback_line),
            message: e.to_string(),
        })?;
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        records.push(parse_row(&row, &columns, ordinal, line)?);
    }

    Ok(records)
}

fn parse_row(row: &csv::StringRecord, columns: &Columns, ordinal: usize, line: usize) -> Result<Record> {
    let field = |index: usize, name: &str| {
        row.get(index).ok_or_else(|| VerifyError::DatasetFormat {
            row: line,
            message: format!("missing value for column '{}'", name),
        })
    };

    let raw_label = field(columns.label, "label")?.trim();
    let label: Verdict = raw_label.parse().map_err(|e| VerifyError::DatasetFormat {
        row: line,
        message: format!("invalid label: {}", e),
    })?;

    let optional = |index: Option<usize>| {
        index
            .and_then(|i| row.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Ok(Record {
        id: optional(columns.id).unwrap_or_else(|| ordinal.to_string()),
        question: field(columns.question, "question")?.to_string(),
        response: field(columns.response, "response")?.to_string(),
        label,
        category: optional(columns.category),
    })
}

/// Keep only records in the given category
pub fn filter_by_category(records: Vec<Record>, category: &str) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| r.category.as_deref() == Some(category))
        .collect()
}

/// Ground truth label counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelDistribution {
    pub pass: usize,
    pub fail: usize,
}

impl LabelDistribution {
    pub fn of(records: &[Record]) -> Self {
        records.iter().fold(Self::default(), |mut acc, r| {
            match r.label {
                Verdict::Pass => acc.pass += 1,
                Verdict::Fail => acc.fail += 1,
            }
            acc
        })
    }

    pub fn failure_rate(&self) -> f64 {
        let total = self.pass + self.fail;
        if total == 0 {
            0.0
        } else {
            self.fail as f64 / total as f64
        }
    }
}
