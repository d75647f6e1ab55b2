pub mod config;
pub mod logging_system;

pub use config::{Config, ConfigError, HarvestMode, LogLevel};
pub use logging_system::{LoggingError, build_filter_string, setup_logging};

use crate::checkpoint::ProgressTracker;
use crate::fetcher::{AwardsClient, AwardsFetcher, RetryPolicy};
use crate::harvest::{Harvester, RunSummary};
use crate::store::{DedupSet, OutputStore, RowMerger};
use chrono::Datelike;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct App {
    config: Config,
    current_year: i32,
    cancel: CancellationToken,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;

        // Load config file if specified
        let final_config = if let Some(config_file) = &config.config_file {
            eprintln!("Loading configuration from file: {}", config_file.display());
            Config::from_file(config_file)?
        } else {
            config
        };

        Ok(Self::from_config(final_config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            current_year: chrono::Local::now().year(),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the calendar year update mode extends to.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that stops the run at the next page boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(self) -> Result<RunSummary, Box<dyn std::error::Error + Send + Sync>> {
        let config = &self.config;
        let range = config.year_range(self.current_year)?;

        info!(
            "Starting nsf-harvest v{} ({:?}, {} → {}, agency {}, country {})",
            crate::VERSION,
            config.mode,
            range.end,
            range.start,
            config.agency,
            config.country_code
        );
        info!("Fields: {}", config.fields.join(","));

        let mut store = OutputStore::new(&config.output_file, &config.fields);
        let tracker = ProgressTracker::new(config.checkpoint_config(range));

        if config.reset {
            match config.mode {
                HarvestMode::Backfill => {
                    store.remove().await?;
                    tracker.remove().await?;
                }
                HarvestMode::Update => {
                    warn!("Reset is ignored in update mode");
                }
            }
        }

        let header_hint = config.mode == HarvestMode::Update && store.has_content().await;
        let state = tracker.load(header_hint).await;
        info!(
            "Starting from year {} offset {} (saved so far: {})",
            state.year, state.offset, state.total_saved
        );

        let merger = match config.mode {
            HarvestMode::Backfill => RowMerger::basic(store),
            HarvestMode::Update => {
                let ids = store.load_existing_ids().await.unwrap_or_else(|e| {
                    warn!("Could not load existing IDs, continuing without duplicate filter: {e}");
                    Default::default()
                });
                info!("Loaded {} existing award IDs", ids.len());
                RowMerger::deduplicating(store, DedupSet::new(ids))
            }
        };

        let client = AwardsClient::new(config.client_config())?;
        let retry = RetryPolicy::new(config.retry_config())?;
        let fetcher = AwardsFetcher::new(client, retry);

        let mut harvester = Harvester::new(
            fetcher,
            tracker,
            merger,
            config.harvest_settings(range),
        )
        .with_cancellation(self.cancel.clone());

        let summary = harvester.run(state).await?;

        info!(
            "{} Total awards saved: {} ({} new this run, {} pages, {} failed)",
            if summary.interrupted {
                "Stopped early."
            } else {
                "Completed."
            },
            summary.total_saved,
            summary.appended,
            summary.pages_fetched,
            summary.failed_pages
        );
        info!("File: {}", config.output_file.display());
        info!("Elapsed: {:.2} min", summary.elapsed.as_secs_f64() / 60.0);

        Ok(summary)
    }
}

/// Cancels `token` on the first Ctrl-C and exits on the second.
fn spawn_interrupt_listener(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping after the current page (press Ctrl-C again to abort)");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Second interrupt, aborting");
            process::exit(130);
        }
    });
}

// Main entry point for the application
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = match App::from_args(std::env::args_os()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(2);
        }
    };

    if let Err(e) = setup_logging(app.config().log_level, app.config().log_json) {
        eprintln!("Logging setup failed: {e}");
    }

    spawn_interrupt_listener(app.cancellation_token());

    if let Err(e) = app.run().await {
        error!("Harvest failed: {}", e);
        process::exit(1);
    }

    Ok(())
}
