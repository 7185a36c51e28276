use crate::ledger::RunEntry;
use crate::runner::Progress;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print one run in the specified format
pub fn print_run(entry: &RunEntry, format: OutputFormat) {
    match format {
        OutputFormat::Plain => println!("{}", RunSummary(entry)),
        OutputFormat::Json => print_json(entry),
    }
}

/// Print ledger history in the specified format
pub fn print_history(entries: &[RunEntry], format: OutputFormat) {
    match format {
        OutputFormat::Plain => println!("{}", HistoryTable(entries)),
        OutputFormat::Json => print_json(entries),
    }
}

/// Single progress line, matching the cadence of the runner callback
pub fn print_progress(progress: Progress) {
    let accuracy = match progress.running_accuracy {
        Some(accuracy) => format!("{:.1}%", accuracy * 100.0),
        None => "n/a".to_string(),
    };
    println!(
        "  Progress: {}/{} | Accuracy so far: {}",
        progress.completed, progress.total, accuracy
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}

fn format_kappa(kappa: f64) -> String {
    if kappa.is_nan() {
        "undefined".to_string()
    } else {
        format!("{:.3}", kappa)
    }
}

/// Plain text report for one run
pub struct RunSummary<'a>(pub &'a RunEntry);

impl fmt::Display for RunSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.0;
        let report = &entry.report;
        let m = &report.confusion;

        writeln!(f, "{}", "=".repeat(70))?;
        writeln!(f, "Verification Results: {}", entry.judge_model)?;
        writeln!(f, "{}", "=".repeat(70))?;
        writeln!(
            f,
            "Dataset: {} | Category: {} | Seed: {}{}",
            entry.dataset_source,
            entry.category_filter.as_deref().unwrap_or("all"),
            entry.seed,
            if entry.train_test { " | test split" } else { "" }
        )?;
        writeln!(
            f,
            "Scored: {} of {} attempted ({} unscored)",
            entry.scored,
            entry.attempted,
            entry.unscored.len()
        )?;
        if entry.partial {
            writeln!(
                f,
                "PARTIAL RUN: interrupted after {} of {} selected records",
                entry.attempted, entry.selected
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Confusion Matrix (fail = positive class)")?;
        writeln!(f, "{:<16} {:>14} {:>14}", "", "Predicted fail", "Predicted pass")?;
        writeln!(f, "{:<16} {:>14} {:>14}", "Actual fail", m.true_positive, m.false_negative)?;
        writeln!(f, "{:<16} {:>14} {:>14}", "Actual pass", m.false_positive, m.true_negative)?;
        writeln!(f)?;

        writeln!(f, "{:<18} {:.1}%", "Accuracy:", report.accuracy * 100.0)?;
        writeln!(f, "{:<18} {:.1}%", "Precision (fail):", report.precision_fail * 100.0)?;
        writeln!(f, "{:<18} {:.1}%", "Recall (fail):", report.recall_fail * 100.0)?;
        writeln!(f, "{:<18} {:.3}", "F1 (fail):", report.f1_fail)?;
        writeln!(
            f,
            "{:<18} {} ({})",
            "Cohen's Kappa:",
            format_kappa(report.cohens_kappa),
            report.kappa_band()
        )?;

        if !entry.disagreements.is_empty() {
            writeln!(f)?;
            writeln!(f, "Disagreements ({})", entry.disagreements.len())?;
            for d in &entry.disagreements {
                write!(f, "  [{}] expected {}, predicted {}", d.record_id, d.expected, d.predicted)?;
                match &d.category {
                    Some(category) => writeln!(f, " ({})", category)?,
                    None => writeln!(f)?,
                }
            }
        }

        if !entry.unscored.is_empty() {
            writeln!(f)?;
            writeln!(f, "Unscored ({})", entry.unscored.len())?;
            for u in &entry.unscored {
                writeln!(f, "  [{}] {}", u.record_id, u.error)?;
            }
        }

        Ok(())
    }
}

/// Plain text table of ledger entries, oldest first
pub struct HistoryTable<'a>(pub &'a [RunEntry]);

impl fmt::Display for HistoryTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "No runs recorded.");
        }

        writeln!(
            f,
            "{:<20} {:<28} {:<12} {:>9} {:>9} {:>9}",
            "Timestamp", "Judge model", "Category", "Scored", "Recall", "Kappa"
        )?;
        write!(f, "{}", "-".repeat(92))?;

        for entry in self.0 {
            writeln!(f)?;
            write!(
                f,
                "{:<20} {:<28} {:<12} {:>9} {:>8.1}% {:>9}{}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.judge_model,
                entry.category_filter.as_deref().unwrap_or("all"),
                format!("{}/{}", entry.scored, entry.attempted),
                entry.report.recall_fail * 100.0,
                format_kappa(entry.report.cohens_kappa),
                if entry.partial { " partial" } else { "" }
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;
    use crate::models::{Disagreement, Unscored, Verdict};
    use chrono::Utc;

    fn create_test_entry() -> RunEntry {
        let report = metrics::compute(&[
            (Verdict::Fail, Verdict::Fail),
            (Verdict::Fail, Verdict::Pass),
            (Verdict::Pass, Verdict::Pass),
            (Verdict::Pass, Verdict::Pass),
        ])
        .unwrap();

        RunEntry {
            timestamp: Utc::now(),
            judge_model: "gpt-5-mini-2025-08-07".to_string(),
            dataset_source: "data/questions_version_2.csv".to_string(),
            category_filter: None,
            sample_size: Some(5),
            seed: 42,
            train_test: false,
            selected: 5,
            attempted: 5,
            scored: 4,
            partial: false,
            report,
            disagreements: vec![Disagreement {
                record_id: "12".to_string(),
                category: Some("precise_calculations".to_string()),
                expected: Verdict::Fail,
                predicted: Verdict::Pass,
            }],
            unscored: vec![Unscored {
                record_id: "31".to_string(),
                error: "Judge API error: rate limited".to_string(),
            }],
        }
    }

    fn line_starting<'t>(text: &'t str, prefix: &str) -> &'t str {
        text.lines()
            .find(|line| line.starts_with(prefix))
            .unwrap_or_else(|| panic!("no line starting with {:?} in:\n{}", prefix, text))
    }

    #[test]
    fn test_run_summary_distinguishes_scored_and_attempted() {
        let text = RunSummary(&create_test_entry()).to_string();

        assert!(text.contains("Verification Results: gpt-5-mini-2025-08-07"));
        assert!(text.contains("Scored: 4 of 5 attempted (1 unscored)"));
        assert!(line_starting(&text, "Accuracy:").ends_with(" 75.0%"));
        assert!(line_starting(&text, "Recall (fail):").ends_with(" 50.0%"));
        assert!(line_starting(&text, "Precision (fail):").ends_with(" 100.0%"));
        assert!(line_starting(&text, "Cohen's Kappa:").ends_with(" 0.500 (moderate agreement)"));
        assert!(text.contains("[12] expected fail, predicted pass (precise_calculations)"));
        assert!(text.contains("[31] Judge API error: rate limited"));
        assert!(!text.contains("PARTIAL RUN"));
    }

    #[test]
    fn test_run_summary_partial_and_undefined_kappa() {
        let mut entry = create_test_entry();
        entry.partial = true;
        entry.selected = 9;
        entry.report = metrics::compute(&[(Verdict::Pass, Verdict::Pass)]).unwrap();

        let text = RunSummary(&entry).to_string();
        assert!(text.contains("PARTIAL RUN: interrupted after 5 of 9 selected records"));
        assert!(line_starting(&text, "Cohen's Kappa:").ends_with(" undefined (no label variation)"));
    }

    #[test]
    fn test_history_table() {
        let mut second = create_test_entry();
        second.judge_model = "gpt-5-nano-2025-08-07".to_string();
        second.partial = true;
        let entries = vec![create_test_entry(), second];

        let text = HistoryTable(&entries).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("gpt-5-mini-2025-08-07"));
        assert!(lines[2].contains("4/5"));
        assert!(lines[3].contains("gpt-5-nano-2025-08-07"));
        assert!(lines[3].ends_with("partial"));
    }

    #[test]
    fn test_history_table_empty() {
        assert_eq!(HistoryTable(&[]).to_string(), "No runs recorded.");
    }

    #[test]
    fn test_print_functions_do_not_panic() {
        let entry = create_test_entry();
        print_run(&entry, OutputFormat::Plain);
        print_run(&entry, OutputFormat::Json);
        print_history(&[entry.clone()], OutputFormat::Plain);
        print_history(&[entry], OutputFormat::Json);
        print_progress(Progress {
            completed: 1,
            total: 2,
            running_accuracy: None,
        });
    }
}
