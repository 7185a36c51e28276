use crate::error::JudgeError;
use crate::judge::Judge;
use crate::models::{Prediction, Record};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Progress event emitted after every completed record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// Accuracy over scored predictions so far, `None` until one is scored
    pub running_accuracy: Option<f64>,
}

/// Judge outcome for one record
#[derive(Debug, Clone)]
pub struct Outcome {
    pub record: Record,
    pub result: Result<Prediction, JudgeError>,
}

/// Everything a run produced, in input order
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Completed records only; fewer than `total` when interrupted
    pub outcomes: Vec<Outcome>,
    pub total: usize,
    pub interrupted: bool,
}

/// Drives a judge over selected records with bounded concurrency
pub struct EvaluationRunner<J: Judge> {
    judge: Arc<J>,
    concurrency: usize,
}

impl<J: Judge> EvaluationRunner<J> {
    pub fn new(judge: Arc<J>, concurrency: usize) -> Self {
        Self {
            judge,
            concurrency: concurrency.max(1),
        }
    }

    pub fn judge(&self) -> &J {
        &self.judge
    }

    /// Judge every record, or stop early once `shutdown` resolves
    pub async fn run<P, S>(&self, records: Vec<Record>, mut progress: P, shutdown: S) -> RunOutcome
    where
        P: FnMut(Progress),
        S: Future<Output = ()>,
    {
        let total = records.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        let mut task_index = HashMap::with_capacity(records.len());

        for (index, record) in records.iter().cloned().enumerate() {
            let judge = Arc::clone(&self.judge);
            let semaphore = Arc::clone(&semaphore);
            let handle = join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => judge.invoke(&record).await,
                    Err(_) => Err(JudgeError::Aborted("semaphore closed".to_string())),
                };
                (index, result)
            });
            task_index.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<Result<Prediction, JudgeError>>> = vec![None; total];
        let mut completed = 0;
        let mut scored = 0;
        let mut agreed = 0;
        let mut interrupted = false;

        tokio::pin!(shutdown);
        loop {
            let joined = tokio::select! {
                biased;
                _ = &mut shutdown, if !interrupted => {
                    // Tasks that already finished still drain below; the rest are cancelled
                    join_set.abort_all();
                    interrupted = true;
                    continue;
                }
                joined = join_set.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    let Some(&index) = task_index.get(&e.id()) else {
                        warn!(error = %e, "Judge task failed");
                        continue;
                    };
                    (index, Err(JudgeError::Aborted(format!("judge task failed: {}", e))))
                }
            };

            let record = &records[index];
            match &result {
                Ok(prediction) => {
                    scored += 1;
                    if prediction.verdict == record.label {
                        agreed += 1;
                    }
                }
                Err(e) => warn!(record_id = %record.id, error = %e, "Judge call failed"),
            }
            slots[index] = Some(result);
            completed += 1;

            debug!(record_id = %record.id, completed, total, "Record judged");
            progress(Progress {
                completed,
                total,
                running_accuracy: (scored > 0).then(|| agreed as f64 / scored as f64),
            });
        }

        let outcomes = records
            .into_iter()
            .zip(slots)
            .filter_map(|(record, slot)| match slot {
                Some(result) => Some(Outcome { record, result }),
                None if interrupted => None,
                None => Some(Outcome {
                    record,
                    result: Err(JudgeError::Aborted("judge task did not complete".to_string())),
                }),
            })
            .collect();

        RunOutcome {
            outcomes,
            total,
            interrupted,
        }
    }
}
