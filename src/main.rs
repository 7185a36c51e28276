use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

mod config;
mod dataset;
mod error;
mod judge;
mod ledger;
mod metrics;
mod models;
mod output;
mod runner;
mod sampling;
mod verification;

use crate::config::Config;
use crate::judge::OpenAiJudge;
use crate::output::OutputFormat;
use crate::runner::EvaluationRunner;
use crate::verification::VerificationPlan;

/// Verify an LLM judge against ground truth pass/fail labels
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output - log every judge call
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Judge a labeled sample and append the run to the ledger
    Verify(VerifyArgs),

    /// Show prior runs recorded in the ledger
    History {
        /// Ledger file to read
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Output format: plain or json
        #[arg(long, default_value = "plain")]
        format: OutputFormat,
    },
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// CSV file with question, response and label columns
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Evaluate only N random samples
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    sample: Option<u64>,

    /// Evaluate only the test side of a train/test split
    #[arg(long)]
    train_test: bool,

    /// Filter by category
    #[arg(long)]
    category: Option<String>,

    /// Model to use as the judge
    #[arg(long)]
    model: Option<String>,

    /// Ledger file the run is appended to
    #[arg(long)]
    output: Option<PathBuf>,

    /// Seed for sampling and splitting
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum concurrent judge requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Output format: plain or json
    #[arg(long, default_value = "plain")]
    format: OutputFormat,
}

impl VerifyArgs {
    /// Override configuration values given on the command line
    fn apply(&self, config: &mut Config) {
        if let Some(dataset) = &self.dataset {
            config.run.dataset = dataset.clone();
        }
        if let Some(output) = &self.output {
            config.run.ledger = output.clone();
        }
        if let Some(seed) = self.seed {
            config.run.seed = seed;
        }
        if let Some(model) = &self.model {
            config.judge.model = model.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.judge.concurrency = concurrency;
        }
    }

    fn plan(&self, config: &Config) -> VerificationPlan {
        VerificationPlan {
            dataset_source: config.run.dataset.display().to_string(),
            category: self.category.clone(),
            sample_size: self.sample.map(|n| n as usize),
            train_test: self.train_test,
            seed: config.run.seed,
            train_fraction: config.run.train_fraction,
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

async fn run_verify(config: Config, args: &VerifyArgs) -> Result<()> {
    let plan = args.plan(&config);

    let records = dataset::load_dataset(&config.run.dataset)?;
    info!(count = records.len(), dataset = %plan.dataset_source, "Loaded labeled samples");

    let prepared = verification::prepare(records, &plan)?;
    info!(
        population = prepared.population,
        pass = prepared.distribution.pass,
        fail = prepared.distribution.fail,
        failure_rate = %format!("{:.1}%", prepared.distribution.failure_rate() * 100.0),
        "Label distribution"
    );
    if let Some(train) = prepared.train_size {
        info!(train, test = prepared.records.len(), "Train records held back for prompt tuning");
    }

    let judge = OpenAiJudge::from_config(config.judge.clone())?;
    let runner = EvaluationRunner::new(Arc::new(judge), config.judge.concurrency);
    info!(
        model = %config.judge.model,
        samples = prepared.records.len(),
        concurrency = config.judge.concurrency,
        "Evaluating"
    );

    let show_progress = matches!(args.format, OutputFormat::Plain);
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let entry = verification::verify(
        &runner,
        prepared.records,
        &plan,
        |progress| {
            if show_progress {
                output::print_progress(progress);
            }
        },
        shutdown,
    )
    .await?;

    output::print_run(&entry, args.format);

    ledger::append(&config.run.ledger, &entry)?;
    info!(ledger = %config.run.ledger.display(), "Run saved");

    Ok(())
}

fn show_history(config: &Config, ledger: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let path = ledger.unwrap_or_else(|| config.run.ledger.clone());
    let entries = ledger::entries(&path)?;
    output::print_history(&entries, format);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Verify(args) => {
            args.apply(&mut config);
            config.validate()?;
            run_verify(config, &args).await
        }
        Commands::History { ledger, format } => show_history(&config, ledger, format),
    }
}
