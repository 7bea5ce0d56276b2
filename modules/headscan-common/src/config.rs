use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// TOML-backed pipeline configuration. Every field has a default, so an
/// empty file (or no file) is valid. Endpoints and tokens stay in env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Written in place of absent values in every table the pipeline emits.
    pub null_token: String,
    pub fetch: FetchConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Table with an `original_url` column.
    pub input: PathBuf,
    /// Where `batch_<N>.csv` artifacts live.
    pub results_dir: PathBuf,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub timeout_secs: u64,
    /// Extra time on top of `timeout_secs` before a unit is abandoned.
    /// Unset means the renderer's own default.
    pub grace_secs: Option<u64>,
    /// `domcontentloaded` or `load`.
    pub wait_until: String,
    pub user_agent: Option<String>,
    /// When set, pages with no head metadata (or that fail to load) are
    /// screenshotted here for diagnosis.
    pub screenshot_dir: Option<PathBuf>,
    /// Output of `combine`.
    pub combined_output: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub master: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
    /// Highest batch number expected. Falls back to the highest one on disk.
    pub last_batch: Option<u32>,
    pub excluded: Vec<u32>,
    /// Treat every batch missing from storage as excluded.
    pub discover_missing: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            null_token: "null".to_string(),
            fetch: FetchConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("urls_data.csv"),
            results_dir: PathBuf::from("data/results/batch_results"),
            batch_size: 20,
            max_concurrency: 5,
            timeout_secs: 10,
            grace_secs: None,
            wait_until: "domcontentloaded".to_string(),
            user_agent: None,
            screenshot_dir: None,
            combined_output: PathBuf::from("data/results/head_extraction_results.csv"),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            master: PathBuf::from("urls_data.csv"),
            output: PathBuf::from("urls_data_with_batches.csv"),
            log: PathBuf::from("data/results/merge_log.txt"),
            last_batch: None,
            excluded: Vec::new(),
            discover_missing: false,
        }
    }
}

impl FileConfig {
    /// Load the config file, or the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: FileConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.batch_size == 0 {
            anyhow::bail!("fetch.batch_size must be at least 1");
        }
        if self.fetch.max_concurrency == 0 {
            anyhow::bail!("fetch.max_concurrency must be at least 1");
        }
        if self.fetch.timeout_secs == 0 {
            anyhow::bail!("fetch.timeout_secs must be at least 1");
        }
        if !matches!(self.fetch.wait_until.as_str(), "domcontentloaded" | "load") {
            anyhow::bail!(
                "fetch.wait_until must be \"domcontentloaded\" or \"load\", got {:?}",
                self.fetch.wait_until
            );
        }
        Ok(())
    }
}

/// Endpoints and credentials, from the environment (and `.env`).
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub slack_webhook_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let secrets = Self {
            browserless_url: non_empty_env("BROWSERLESS_URL"),
            browserless_token: non_empty_env("BROWSERLESS_TOKEN"),
            slack_webhook_url: non_empty_env("SLACK_WEBHOOK_URL"),
        };
        secrets.log_redacted();
        secrets
    }

    pub fn require_browserless_url(&self) -> Result<&str> {
        self.browserless_url
            .as_deref()
            .context("BROWSERLESS_URL environment variable is required")
    }

    fn log_redacted(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) => {
                    let n = v.len().min(5);
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                None => "(not set)".to_string(),
            }
        }

        info!(
            browserless_url = self.browserless_url.as_deref().unwrap_or("(not set)"),
            browserless_token = %preview(&self.browserless_token),
            slack_webhook_url = %preview(&self.slack_webhook_url),
            "Secrets loaded"
        );
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
