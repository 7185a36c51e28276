use crate::dataset::{self, LabelDistribution};
use crate::error::{Result, VerifyError};
use crate::judge::Judge;
use crate::ledger::RunEntry;
use crate::metrics;
use crate::models::{Disagreement, Record, Unscored};
use crate::runner::{EvaluationRunner, Progress, RunOutcome};
use crate::sampling;
use chrono::Utc;
use std::future::Future;
use tracing::{info, warn};

/// How the evaluation set is drawn from the dataset
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationPlan {
    pub dataset_source: String,
    pub category: Option<String>,
    pub sample_size: Option<usize>,
    pub train_test: bool,
    pub seed: u64,
    pub train_fraction: f64,
}

/// The records selected for judging, with counts for the report header
#[derive(Debug, Clone)]
pub struct Prepared {
    pub records: Vec<Record>,
    /// Size of the population after category filtering
    pub population: usize,
    pub distribution: LabelDistribution,
    /// Records held back for prompt tuning when splitting
    pub train_size: Option<usize>,
}

/// Filter, sample and split the dataset
pub fn prepare(records: Vec<Record>, plan: &VerificationPlan) -> Result<Prepared> {
    let records = match &plan.category {
        Some(category) => {
            let filtered = dataset::filter_by_category(records, category);
            info!(category = %category, count = filtered.len(), "Filtered by category");
            filtered
        }
        None => records,
    };

    if records.is_empty() {
        return Err(VerifyError::InsufficientData { needed: 1, found: 0 });
    }

    let population = records.len();
    let distribution = LabelDistribution::of(&records);

    let selected = sampling::select(&records, plan.sample_size, plan.seed);
    if plan.sample_size.is_some() {
        info!(count = selected.len(), seed = plan.seed, "Sampled records");
    }

    let (records, train_size) = if plan.train_test {
        let (train, test) = sampling::split(&selected, plan.seed, plan.train_fraction)?;
        info!(train = train.len(), test = test.len(), "Split into train and test");
        (test, Some(train.len()))
    } else {
        (selected, None)
    };

    Ok(Prepared {
        records,
        population,
        distribution,
        train_size,
    })
}

/// Judge the prepared records and summarize the run
pub async fn verify<J, P, S>(
    runner: &EvaluationRunner<J>,
    records: Vec<Record>,
    plan: &VerificationPlan,
    progress: P,
    shutdown: S,
) -> Result<RunEntry>
where
    J: Judge,
    P: FnMut(Progress),
    S: Future<Output = ()>,
{
    let run = runner.run(records, progress, shutdown).await;
    if run.interrupted {
        warn!(
            completed = run.outcomes.len(),
            total = run.total,
            "Run interrupted, reporting partial results"
        );
    }
    summarize(&run, plan, runner.judge().model())
}

/// Build the ledger entry for a finished or interrupted run
pub fn summarize(run: &RunOutcome, plan: &VerificationPlan, judge_model: &str) -> Result<RunEntry> {
    let mut pairs = Vec::with_capacity(run.outcomes.len());
    let mut disagreements = Vec::new();
    let mut unscored = Vec::new();

    for outcome in &run.outcomes {
        match &outcome.result {
            Ok(prediction) => {
                pairs.push((outcome.record.label, prediction.verdict));
                if prediction.verdict != outcome.record.label {
                    disagreements.push(Disagreement {
                        record_id: outcome.record.id.clone(),
                        category: outcome.record.category.clone(),
                        expected: outcome.record.label,
                        predicted: prediction.verdict,
                    });
                }
            }
            Err(e) => unscored.push(Unscored {
                record_id: outcome.record.id.clone(),
                error: e.to_string(),
            }),
        }
    }

    if pairs.is_empty() {
        warn!(
            attempted = run.outcomes.len(),
            unscored = unscored.len(),
            "No judge call produced a verdict"
        );
    }
    let report = metrics::compute(&pairs)?;

    Ok(RunEntry {
        timestamp: Utc::now(),
        judge_model: judge_model.to_string(),
        dataset_source: plan.dataset_source.clone(),
        category_filter: plan.category.clone(),
        sample_size: plan.sample_size,
        seed: plan.seed,
        train_test: plan.train_test,
        selected: run.total,
        attempted: run.outcomes.len(),
        scored: pairs.len(),
        partial: run.interrupted,
        report,
        disagreements,
        unscored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JudgeError;
    use crate::models::Verdict;
    use crate::runner::tests::{ScriptedJudge, record};
    use std::sync::Arc;
    use std::time::Duration;

    fn plan() -> VerificationPlan {
        VerificationPlan {
            dataset_source: "data/questions.csv".to_string(),
            category: None,
            sample_size: None,
            train_test: false,
            seed: 42,
            train_fraction: 0.75,
        }
    }

    fn categorized(n: usize) -> Vec<Record> {
        (1..=n)
            .map(|i| {
                let mut r = record(&i.to_string(), if i % 4 == 0 { Verdict::Fail } else { Verdict::Pass });
                r.category = Some(if i % 2 == 0 { "math" } else { "history" }.to_string());
                r
            })
            .collect()
    }

    #[test]
    fn test_prepare_filters_before_sampling() {
        let mut plan = plan();
        plan.category = Some("math".to_string());
        plan.sample_size = Some(5);

        let prepared = prepare(categorized(40), &plan).unwrap();
        assert_eq!(prepared.population, 20);
        assert_eq!(prepared.records.len(), 5);
        assert!(prepared.records.iter().all(|r| r.category.as_deref() == Some("math")));

        let filtered = dataset::filter_by_category(categorized(40), "math");
        assert_eq!(prepared.records, sampling::select(&filtered, Some(5), 42));
    }

    #[test]
    fn test_prepare_uses_test_partition() {
        let mut plan = plan();
        plan.train_test = true;

        let prepared = prepare(categorized(20), &plan).unwrap();
        assert_eq!(prepared.train_size, Some(15));
        assert_eq!(prepared.records.len(), 5);

        let (_, test) = sampling::split(&categorized(20), 42, 0.75).unwrap();
        assert_eq!(prepared.records, test);
    }

    #[test]
    fn test_prepare_empty_category_is_insufficient() {
        let mut plan = plan();
        plan.category = Some("chemistry".to_string());

        let err = prepare(categorized(10), &plan).unwrap_err();
        assert!(matches!(err, VerifyError::InsufficientData { found: 0, .. }));
    }

    #[test]
    fn test_prepare_split_needs_two_records() {
        let mut plan = plan();
        plan.train_test = true;
        plan.sample_size = Some(1);

        let err = prepare(categorized(10), &plan).unwrap_err();
        assert!(matches!(err, VerifyError::InsufficientData { needed: 2, found: 1 }));
    }

    #[tokio::test]
    async fn test_verify_excludes_schema_violations_from_n() {
        let judge = ScriptedJudge::new(vec![
            ("1", Ok(Verdict::Fail)),
            ("2", Ok(Verdict::Pass)),
            ("3", Ok(Verdict::Pass)),
            ("4", Ok(Verdict::Pass)),
            ("5", Err(JudgeError::SchemaViolation("response contains no tool call".to_string()))),
        ]);
        let records = vec![
            record("1", Verdict::Fail),
            record("2", Verdict::Fail),
            record("3", Verdict::Pass),
            record("4", Verdict::Pass),
            record("5", Verdict::Fail),
        ];

        let runner = EvaluationRunner::new(Arc::new(judge), 2);
        let entry = verify(&runner, records, &plan(), |_| {}, std::future::pending())
            .await
            .unwrap();

        assert_eq!(entry.judge_model, "scripted-judge");
        assert_eq!(entry.selected, 5);
        assert_eq!(entry.attempted, 5);
        assert_eq!(entry.scored, 4);
        assert_eq!(entry.report.n, 4);
        assert_eq!(entry.report.confusion.true_positive, 1);
        assert_eq!(entry.report.confusion.false_negative, 1);
        assert_eq!(entry.report.confusion.true_negative, 2);
        assert_eq!(entry.report.accuracy, 0.75);
        assert_eq!(entry.report.recall_fail, 0.5);
        assert_eq!(entry.report.precision_fail, 1.0);

        assert_eq!(entry.unscored.len(), 1);
        assert_eq!(entry.unscored[0].record_id, "5");
        assert!(entry.unscored[0].error.contains("schema"));
        assert_eq!(entry.disagreements.len(), 1);
        assert_eq!(entry.disagreements[0].record_id, "2");
        assert!(!entry.partial);
    }

    #[tokio::test]
    async fn test_report_is_independent_of_concurrency() {
        let records = categorized(30);
        let script: Vec<(String, Verdict)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), if i % 3 == 0 { Verdict::Fail } else { Verdict::Pass }))
            .collect();

        let mut reports = Vec::new();
        for concurrency in [1, 4, 16] {
            let judge = ScriptedJudge::new(script.iter().map(|(id, v)| (id.as_str(), Ok(*v))).collect());
            let runner = EvaluationRunner::new(Arc::new(judge), concurrency);
            let entry = verify(&runner, records.clone(), &plan(), |_| {}, std::future::pending())
                .await
                .unwrap();
            reports.push((entry.report, entry.disagreements));
        }

        assert_eq!(reports[0], reports[1]);
        assert_eq!(reports[1], reports[2]);
    }

    #[tokio::test]
    async fn test_all_failures_is_empty_report() {
        let judge = ScriptedJudge::new(vec![
            ("1", Err(JudgeError::Api("down".to_string()))),
            ("2", Err(JudgeError::Timeout(Duration::from_secs(1)))),
        ]);
        let records = vec![record("1", Verdict::Pass), record("2", Verdict::Fail)];

        let runner = EvaluationRunner::new(Arc::new(judge), 2);
        let err = verify(&runner, records, &plan(), |_| {}, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::EmptyReport));
    }

    #[test]
    fn test_summarize_marks_partial_runs() {
        let outcomes = vec![crate::runner::Outcome {
            record: record("1", Verdict::Pass),
            result: Ok(crate::models::Prediction {
                record_id: "1".to_string(),
                verdict: Verdict::Pass,
                raw_judge_output: None,
            }),
        }];
        let run = RunOutcome {
            outcomes,
            total: 3,
            interrupted: true,
        };

        let entry = summarize(&run, &plan(), "judge").unwrap();
        assert!(entry.partial);
        assert_eq!(entry.selected, 3);
        assert_eq!(entry.attempted, 1);
        assert_eq!(entry.scored, 1);
        assert_eq!(entry.report.n, 1);
    }
}
