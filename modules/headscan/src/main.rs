use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use browserless_client::BrowserlessClient;
use headscan::{
    combine, load_urls, notifier, BatchPlan, BatchRunner, BrowserlessRenderer, CheckpointStore,
    DirCheckpointStore, ExtractOptions, Reconciler, RunMode, Sequencer, Table, WaitUntil,
    DEFAULT_UNIT_GRACE,
};
use headscan_common::{FileConfig, Secrets};

#[derive(Parser)]
#[command(name = "headscan", about = "Batch <head> metadata extraction through a remote browser")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, global = true, default_value = "./config/headscan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every URL in the input table, one checkpointed batch at a time
    Fetch {
        /// Only process batches that have no artifact yet
        #[arg(long, conflicts_with = "batches")]
        resume: bool,

        /// Re-run exactly these batch numbers (comma separated)
        #[arg(long, value_delimiter = ',')]
        batches: Vec<u32>,

        #[arg(long)]
        input: Option<PathBuf>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        concurrency: Option<usize>,

        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Print batch numbers that have no artifact
    Missing {
        #[arg(long)]
        last_batch: Option<u32>,
    },

    /// Join batch artifacts onto the master table
    Merge {
        #[arg(long)]
        last_batch: Option<u32>,

        /// Batch numbers to leave out (comma separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<u32>,

        /// Leave out every batch with no artifact on disk
        #[arg(long)]
        discover_missing: bool,
    },

    /// Concatenate every batch artifact into one results table
    Combine,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("headscan=info,headscan_common=info"));
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let config = FileConfig::load(&cli.config)?;
    let secrets = Secrets::from_env();
    let notifier = notifier::from_webhook(secrets.slack_webhook_url.as_deref());

    match cli.command {
        Command::Fetch {
            resume,
            batches,
            input,
            batch_size,
            concurrency,
            timeout_secs,
        } => {
            let mode = if resume {
                RunMode::Resume
            } else if !batches.is_empty() {
                RunMode::Only(batches)
            } else {
                RunMode::Full
            };
            let input = input.unwrap_or_else(|| config.fetch.input.clone());
            let batch_size = batch_size.unwrap_or(config.fetch.batch_size);
            let concurrency = concurrency.unwrap_or(config.fetch.max_concurrency);
            let timeout = Duration::from_secs(timeout_secs.unwrap_or(config.fetch.timeout_secs));

            let wait_until: WaitUntil = config
                .fetch
                .wait_until
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let grace = config
                .fetch
                .grace_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_UNIT_GRACE);

            let mut client = BrowserlessClient::new(
                secrets.require_browserless_url()?,
                secrets.browserless_token.as_deref(),
            )
            .context("Failed to build Browserless client")?;
            if let Some(user_agent) = &config.fetch.user_agent {
                client = client.with_user_agent(user_agent);
            }
            let renderer = Arc::new(BrowserlessRenderer::new(client));

            let urls = load_urls(&input, &config.null_token)
                .with_context(|| format!("Failed to load URLs from {}", input.display()))?;
            info!(input = %input.display(), urls = urls.len(), "Loaded input");

            let store = Arc::new(DirCheckpointStore::new(
                &config.fetch.results_dir,
                &config.null_token,
            ));
            let options = ExtractOptions {
                timeout,
                grace,
                wait_until,
                screenshot_dir: config.fetch.screenshot_dir.clone(),
            };
            let runner = BatchRunner::new(renderer, concurrency, options)?;
            let sequencer = Sequencer::new(runner, store, batch_size);

            match sequencer.run(&urls, &mode).await {
                Ok(stats) => {
                    info!("{stats}");
                    notifier
                        .notify(&format!(
                            "headscan fetch finished: {} batches written, {} URLs, {} timeouts",
                            stats.batches_written, stats.urls_processed, stats.timeouts
                        ))
                        .await;
                }
                Err(e) => {
                    notifier.notify(&format!("headscan fetch aborted: {e}")).await;
                    return Err(e.into());
                }
            }
        }

        Command::Missing { last_batch } => {
            let store = DirCheckpointStore::new(&config.fetch.results_dir, &config.null_token);
            let last = resolve_last_batch(last_batch, &config, &store)?;
            let missing = store.list_missing(1..=last)?;
            info!(last_batch = last, missing = missing.len(), "Checked batch artifacts");
            println!("{missing:?}");
        }

        Command::Merge {
            last_batch,
            exclude,
            discover_missing,
        } => {
            let store = DirCheckpointStore::new(&config.fetch.results_dir, &config.null_token);
            let last = resolve_last_batch(last_batch, &config, &store)?;

            let mut excluded: BTreeSet<u32> = config.merge.excluded.iter().copied().collect();
            excluded.extend(exclude);
            if discover_missing || config.merge.discover_missing {
                excluded.extend(store.list_missing(1..=last)?);
            }

            let master = Table::read_csv(&config.merge.master, &config.null_token)
                .with_context(|| format!("Failed to read master table {}", config.merge.master.display()))?;
            let outcome = Reconciler::new(&store).reconcile(master, 1..=last, &excluded)?;

            outcome
                .persist(&config.merge.output, &config.merge.log, &config.null_token)
                .context("Failed to write merge outputs")?;

            info!(output = %config.merge.output.display(), log = %config.merge.log.display(), "{}", outcome.summary);
            notifier
                .notify(&format!(
                    "headscan merge finished: {} merged, {} missing, {} errored",
                    outcome.summary.merged, outcome.summary.missing, outcome.summary.errored
                ))
                .await;
        }

        Command::Combine => {
            let store = DirCheckpointStore::new(&config.fetch.results_dir, &config.null_token);
            let (table, skipped) = combine(&store)?;
            let output = &config.fetch.combined_output;
            table.write_csv(output, &config.null_token)?;
            for entry in &skipped {
                info!("{entry}");
            }
            info!(rows = table.len(), skipped = skipped.len(), output = %output.display(), "Combined batch artifacts");
        }
    }

    Ok(())
}

/// Explicit flag, then config, then the plan implied by the input table,
/// then the highest batch already on disk.
fn resolve_last_batch(
    flag: Option<u32>,
    config: &FileConfig,
    store: &DirCheckpointStore,
) -> Result<u32> {
    if let Some(last) = flag.or(config.merge.last_batch) {
        return Ok(last);
    }
    if config.fetch.input.is_file() {
        let urls = load_urls(&config.fetch.input, &config.null_token)?;
        return Ok(BatchPlan::count(urls.len(), config.fetch.batch_size));
    }
    Ok(store.existing()?.last().copied().unwrap_or(0))
}
