use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Judge endpoint and request settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeConfig {
    /// OpenAI-compatible API endpoint
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    #[serde(default = "default_env_var_api_key")]
    pub env_var_api_key: String,
    /// Model acting as the judge
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature, left to the provider when unset
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Token cap for the judge reply, left to the provider when unset
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Rate limit for judge requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: f64,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum outstanding judge requests
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Prompt with `{question}` and `{response}` placeholders
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

/// Dataset, sampling and ledger settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// CSV file with ground truth labels
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,
    /// JSON-lines file that run entries are appended to
    #[serde(default = "default_ledger")]
    pub ledger: PathBuf,
    /// Seed for sampling and train/test splitting
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Share of records kept for prompt tuning when splitting
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,
}

fn default_api_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_env_var_api_key() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-5-mini-2025-08-07".to_string()
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_concurrency() -> usize {
    4
}

fn default_prompt_template() -> String {
    "Evaluate if this response correctly answers the question.\n\n\
     Question: {question}\n\
     Response: {response}\n\n\
     Call submit_evaluation with verdict=\"pass\" if correct, \"fail\" if incorrect."
        .to_string()
}

fn default_dataset() -> PathBuf {
    PathBuf::from("data/questions_version_2.csv")
}

fn default_ledger() -> PathBuf {
    PathBuf::from("results/runs.jsonl")
}

fn default_seed() -> u64 {
    42
}

fn default_train_fraction() -> f64 {
    crate::sampling::DEFAULT_TRAIN_FRACTION
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            env_var_api_key: default_env_var_api_key(),
            model: default_model(),
            temperature: None,
            max_tokens: None,
            rate_limit_rps: default_rate_limit(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            prompt_template: default_prompt_template(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            ledger: default_ledger(),
            seed: default_seed(),
            train_fraction: default_train_fraction(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.judge.concurrency == 0 {
            anyhow::bail!("judge.concurrency must be at least 1");
        }
        if self.judge.timeout_secs == 0 {
            anyhow::bail!("judge.timeout_secs must be at least 1");
        }
        let rps = self.judge.rate_limit_rps;
        if !rps.is_finite() {
            anyhow::bail!("judge.rate_limit_rps must be a finite number, got {}", rps);
        }
        if rps > 0.0 && Duration::try_from_secs_f64(1.0 / rps).is_err() {
            anyhow::bail!("judge.rate_limit_rps is too small to space requests, got {}", rps);
        }
        for placeholder in ["{question}", "{response}"] {
            if !self.judge.prompt_template.contains(placeholder) {
                anyhow::bail!("judge.prompt_template is missing the {} placeholder", placeholder);
            }
        }
        let fraction = self.run.train_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            anyhow::bail!("run.train_fraction must be between 0 and 1 exclusive, got {}", fraction);
        }
        Ok(())
    }
}
