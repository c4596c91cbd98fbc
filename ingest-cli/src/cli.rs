use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, PasswordDisplayMode};
use weather_ingest_core::{
    Config, LocalZones, NO_ALERTS, ProviderId, RunResult, RunStatus, run_extraction,
};

/// Exit code for a run that produced no records at all.
const EXIT_RUN_FAILED: u8 = 2;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-ingest", version, about = "Scheduled weather ingestion job")]
pub struct Cli {
    /// Use this config file instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "weatherapi" or "rapidapi".
        provider: String,
    },

    /// List the locations a run will fetch.
    Locations,

    /// Fetch and normalize weather for every configured location once.
    Run {
        /// Write raw and processed zones under this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Keep earlier runs of the same day instead of replacing them.
        #[arg(long)]
        keep_history: bool,

        /// Print the run result as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<ExitCode> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };

        match self.command {
            Command::Configure { provider } => {
                configure(&config_path, &provider)?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Locations => {
                let cfg = Config::load_from(&config_path)?;
                for loc in &cfg.locations {
                    println!("{:<16} {:>9.4} {:>9.4}", loc.name, loc.latitude, loc.longitude);
                }
                Ok(ExitCode::SUCCESS)
            }
            Command::Run { output_dir, keep_history, json } => {
                let mut cfg = Config::load_from(&config_path)?;
                cfg.apply_env_overrides();

                let result = run_extraction(&cfg).await?;

                if let Some(root) = output_dir.or_else(|| cfg.storage.output_dir.clone()) {
                    let zones = LocalZones::new(root)
                        .keep_latest_only(cfg.storage.keep_latest_only && !keep_history);
                    let report = zones.write_all(&result)?;
                    tracing::info!(
                        "wrote {} files under {} ({} old files removed)",
                        report.written.len(),
                        zones.root().display(),
                        report.deleted
                    );
                }

                if json {
                    let out = serde_json::to_string_pretty(&result)
                        .context("Failed to serialize run result")?;
                    println!("{out}");
                } else {
                    print_summary(&result);
                }

                Ok(ExitCode::from(exit_status(&result)))
            }
        }
    }
}

fn configure(config_path: &Path, provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut cfg = Config::load_from(config_path)?;

    let api_key = Password::new(&format!("API key for {id}:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    cfg.upsert_provider_api_key(id, api_key.trim().to_string());

    let is_default = cfg.default_provider_id().ok() == Some(id);
    if !is_default {
        let make_default = Confirm::new(&format!("Use {id} as the default provider?"))
            .with_default(true)
            .prompt()
            .context("Failed to read answer")?;
        if make_default {
            cfg.set_default_provider(id);
        }
    }

    cfg.save_to(config_path)?;
    println!("Saved {id} credentials to {}", config_path.display());
    Ok(())
}

fn print_summary(result: &RunResult) {
    let elapsed = result.finished_at - result.started_at;
    println!(
        "Run {} at {} ({} ms): {} current, {} forecast records",
        status_label(result.status()),
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        elapsed.num_milliseconds(),
        result.currents.len(),
        result.forecasts.len(),
    );

    for record in &result.currents {
        println!(
            "  {:<12} {:>5.1}°C  {:>3.0}%  {:>4.1} m/s  {}",
            record.location,
            record.temperature_c,
            record.humidity_pct,
            record.wind_speed_ms,
            record.condition
        );
        if let Some(alerts) = record.alerts.as_deref().filter(|a| *a != NO_ALERTS) {
            println!("  {:<12} alerts: {alerts}", "");
        }
    }
    for err in &result.fetch_errors {
        println!("  ! {err}");
    }
    for err in &result.normalization_errors {
        println!("  ! {err}");
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "succeeded",
        RunStatus::Degraded => "degraded",
        RunStatus::Failed => "FAILED",
    }
}

/// Degraded runs still exit 0; the scheduler alerts on the logged warning.
fn exit_status(result: &RunResult) -> u8 {
    match result.status() {
        RunStatus::Success => 0,
        RunStatus::Degraded => {
            tracing::warn!(
                "run degraded: {} errors, records only for {}",
                result.error_count(),
                result.succeeded_locations().join(", ")
            );
            0
        }
        RunStatus::Failed => {
            tracing::error!("run failed: no records produced ({} errors)", result.error_count());
            EXIT_RUN_FAILED
        }
    }
}
