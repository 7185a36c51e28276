use crate::error::{Result, VerifyError};
use crate::models::Verdict;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confusion matrix with `fail` as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Ground truth fail, predicted fail
    pub true_positive: usize,
    /// Ground truth fail, predicted pass
    pub false_negative: usize,
    /// Ground truth pass, predicted fail
    pub false_positive: usize,
    /// Ground truth pass, predicted pass
    pub true_negative: usize,
}

impl ConfusionMatrix {
    pub fn from_pairs(pairs: &[(Verdict, Verdict)]) -> Self {
        let mut matrix = Self::default();
        for pair in pairs {
            match pair {
                (Verdict::Fail, Verdict::Fail) => matrix.true_positive += 1,
                (Verdict::Fail, Verdict::Pass) => matrix.false_negative += 1,
                (Verdict::Pass, Verdict::Fail) => matrix.false_positive += 1,
                (Verdict::Pass, Verdict::Pass) => matrix.true_negative += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_negative + self.false_positive + self.true_negative
    }

    pub fn agreements(&self) -> usize {
        self.true_positive + self.true_negative
    }
}

/// Agreement between ground truth and judge over one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementReport {
    pub n: usize,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision_fail: f64,
    pub recall_fail: f64,
    pub f1_fail: f64,
    /// NaN when chance agreement is 1; stored as `null` in JSON
    #[serde(with = "nan_as_null")]
    pub cohens_kappa: f64,
}

impl AgreementReport {
    pub fn kappa_band(&self) -> KappaBand {
        KappaBand::of(self.cohens_kappa)
    }
}

/// Compute the agreement report for (ground truth, predicted) pairs
pub fn compute(pairs: &[(Verdict, Verdict)]) -> Result<AgreementReport> {
    if pairs.is_empty() {
        return Err(VerifyError::EmptyReport);
    }

    let confusion = ConfusionMatrix::from_pairs(pairs);
    let n = confusion.total();

    let accuracy = ratio(confusion.agreements(), n);
    let precision_fail = ratio(
        confusion.true_positive,
        confusion.true_positive + confusion.false_positive,
    );
    let recall_fail = ratio(
        confusion.true_positive,
        confusion.true_positive + confusion.false_negative,
    );
    let f1_fail = if precision_fail + recall_fail == 0.0 {
        0.0
    } else {
        2.0 * precision_fail * recall_fail / (precision_fail + recall_fail)
    };

    Ok(AgreementReport {
        n,
        confusion,
        accuracy,
        precision_fail,
        recall_fail,
        f1_fail,
        cohens_kappa: cohens_kappa(&confusion),
    })
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Cohen's kappa from marginal label frequencies of both raters
fn cohens_kappa(m: &ConfusionMatrix) -> f64 {
    let n = m.total() as u128;
    let truth_fail = (m.true_positive + m.false_negative) as u128;
    let truth_pass = n - truth_fail;
    let predicted_fail = (m.true_positive + m.false_positive) as u128;
    let predicted_pass = n - predicted_fail;

    // p_e * n^2, kept integral so the degenerate case is detected exactly
    let chance = truth_fail * predicted_fail + truth_pass * predicted_pass;
    let n_squared = n * n;
    if chance == n_squared {
        return f64::NAN;
    }

    let observed = m.agreements() as f64 / n as f64;
    let expected = chance as f64 / n_squared as f64;
    (observed - expected) / (1.0 - expected)
}

/// Landis & Koch reading of a kappa value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KappaBand {
    WorseThanChance,
    Slight,
    Fair,
    Moderate,
    Substantial,
    AlmostPerfect,
    Undefined,
}

impl KappaBand {
    pub fn of(kappa: f64) -> Self {
        match kappa {
            k if k.is_nan() => Self::Undefined,
            k if k < 0.0 => Self::WorseThanChance,
            k if k <= 0.2 => Self::Slight,
            k if k <= 0.4 => Self::Fair,
            k if k <= 0.6 => Self::Moderate,
            k if k <= 0.8 => Self::Substantial,
            _ => Self::AlmostPerfect,
        }
    }
}

impl fmt::Display for KappaBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::WorseThanChance => "worse than chance",
            Self::Slight => "slight agreement",
            Self::Fair => "fair agreement",
            Self::Moderate => "moderate agreement",
            Self::Substantial => "substantial agreement",
            Self::AlmostPerfect => "almost perfect agreement",
            Self::Undefined => "no label variation",
        };
        f.write_str(label)
    }
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
