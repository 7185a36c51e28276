use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary verdict shared by ground truth labels and judge output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Verdict::Pass),
            "fail" => Ok(Verdict::Fail),
            other => Err(format!("expected 'pass' or 'fail', got '{}'", other)),
        }
    }
}

/// A labeled question/response pair from the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Explicit `id` column, or the 1-based data row when the column is absent
    pub id: String,
    pub question: String,
    pub response: String,
    /// Ground truth verdict
    pub label: Verdict,
    #[serde(default)]
    pub category: Option<String>,
}

/// Judge verdict for a single record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub record_id: String,
    pub verdict: Verdict,
    /// Raw tool-call arguments returned by the judge, kept for diagnostics
    #[serde(default)]
    pub raw_judge_output: Option<serde_json::Value>,
}

/// A scored record where the judge disagreed with ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub record_id: String,
    #[serde(default)]
    pub category: Option<String>,
    pub expected: Verdict,
    pub predicted: Verdict,
}

/// A record whose judge call failed and was left out of the statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unscored {
    pub record_id: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Verdict::Pass).unwrap(), "\"pass\"");
        assert_eq!(serde_json::to_string(&Verdict::Fail).unwrap(), "\"fail\"");
    }

    #[test]
    fn test_verdict_rejects_other_strings() {
        assert!(serde_json::from_str::<Verdict>("\"PASS\"").is_err());
        assert!(serde_json::from_str::<Verdict>("\"maybe\"").is_err());
        assert!("pass ".parse::<Verdict>().is_err());
        assert_eq!("fail".parse::<Verdict>().unwrap(), Verdict::Fail);
    }
}
