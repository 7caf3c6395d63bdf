use std::{future::Future, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use weather_etl_core::{
    CityOutcome, Config, OpenWeatherClient, Pipeline, RunReport, Schedule, SqliteStore,
    StoredObservation, WeatherStore, config::ENV_API_KEY, schedule::run_scheduled,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-etl", version, about = "Daily weather ETL job")]
pub struct Cli {
    /// Path to the config file (defaults to the platform config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, transform and store weather for every configured city once.
    Run {
        /// Override the configured city list; repeat for several cities.
        #[arg(long = "city")]
        cities: Vec<String>,
    },

    /// Run on the configured cron schedule until interrupted.
    Schedule,

    /// Show the most recently stored observations.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Store the OpenWeather API key in the config file.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_path = self.config.as_deref();
        let mut config = Config::load(config_path)?;

        match self.command {
            // Saves the file as-is, without environment overrides baked in.
            Command::Configure => configure(config, config_path)?,
            Command::Run { cities } => {
                config.apply_env(|k| std::env::var(k).ok());
                let cities = if cities.is_empty() { config.cities.clone() } else { cities };
                let pipeline = build_pipeline(&config)?.with_shutdown(shutdown_on_ctrl_c());

                let report = pipeline.run(&cities).await?;
                print_report(&report);
            }
            Command::Schedule => {
                config.apply_env(|k| std::env::var(k).ok());
                let schedule = Schedule::parse(&config.schedule.cron)?;
                let shutdown = shutdown_on_ctrl_c();
                let pipeline = build_pipeline(&config)?.with_shutdown(shutdown.clone());

                log::info!(
                    "Scheduling {} cities on '{}' (retries: {})",
                    config.cities.len(),
                    schedule.expr(),
                    config.schedule.retries
                );
                run_scheduled(&schedule, config.schedule.retry_policy(), shutdown, || {
                    pipeline.run(&config.cities)
                })
                .await?;
            }
            Command::History { limit } => {
                config.apply_env(|k| std::env::var(k).ok());
                let store = SqliteStore::new(&config.database);
                let rows = store
                    .ensure_schema()
                    .and_then(|()| store.recent(limit))
                    .with_context(|| format!("Failed to read {}", config.database.display()))?;
                print_history(&rows);
            }
        }

        Ok(())
    }
}

fn build_pipeline(config: &Config) -> Result<Pipeline<OpenWeatherClient, SqliteStore>> {
    let client = OpenWeatherClient::new(config.client_config()?)
        .context("Failed to build HTTP client")?;
    let store = SqliteStore::new(&config.database);
    Ok(Pipeline::new(client, store))
}

/// Flip the returned channel to `true` on the first Ctrl-C; exit the
/// process on the second one.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if watch_interrupts(tx, tokio::signal::ctrl_c).await == Interrupt::Forced {
            std::process::exit(130);
        }
    });
    rx
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Second signal: the caller should stop at once.
    Forced,
    /// The signal source failed; no further interrupts will be seen.
    Unavailable,
}

async fn watch_interrupts<F, Fut>(tx: watch::Sender<bool>, mut next_signal: F) -> Interrupt
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        log::warn!("Cannot listen for Ctrl-C: {e}");
        return Interrupt::Unavailable;
    }
    log::info!("Ctrl-C received, stopping after the current city (press again to abort)");
    let _ = tx.send(true);

    if next_signal().await.is_err() {
        return Interrupt::Unavailable;
    }
    log::warn!("Second Ctrl-C received, aborting");
    Interrupt::Forced
}

fn configure(mut config: Config, path: Option<&std::path::Path>) -> Result<()> {
    let api_key = inquire::Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_display_mode(inquire::PasswordDisplayMode::Masked)
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }

    config.set_api_key(api_key.trim().to_string());
    let saved = config.save(path)?;
    println!("Saved configuration to {}", saved.display());
    println!("({ENV_API_KEY} in the environment still takes precedence.)");
    Ok(())
}

fn print_report(report: &RunReport) {
    for city in &report.cities {
        let status = match &city.outcome {
            CityOutcome::Saved { id } => format!("saved as row {id}"),
            CityOutcome::FetchFailed(e) => format!("skipped, fetch failed: {e}"),
            CityOutcome::TransformFailed(e) => format!("skipped, bad response: {e}"),
            CityOutcome::SaveFailed(e) => format!("not saved: {e}"),
            CityOutcome::NotAttempted => "not attempted".to_string(),
        };
        println!("{:<12} {status}", city.city);
    }
    println!("{}", report.summary());
}

fn print_history(rows: &[StoredObservation]) {
    if rows.is_empty() {
        println!("No observations stored yet.");
        return;
    }

    println!(
        "{:>5}  {:<19}  {:<12} {:>7} {:>7} {:>4}  {:>6}  {}",
        "id", "captured (UTC)", "city", "temp", "feels", "hum", "wind", "weather"
    );
    for row in rows {
        let r = &row.record;
        println!(
            "{:>5}  {:<19}  {:<12} {:>6.1}° {:>6.1}° {:>3}%  {:>4.1}m/s  {} ({})",
            row.id,
            r.captured_at_string(),
            r.city,
            r.temperature_celsius,
            r.feels_like_celsius,
            r.humidity_percent,
            r.wind_speed_mps,
            r.weather_main,
            r.weather_description,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_repeated_city_overrides() {
        let cli = Cli::parse_from(["weather-etl", "run", "--city", "Şanlıurfa", "--city", "Van"]);
        match cli.command {
            Command::Run { cities } => assert_eq!(cities, ["Şanlıurfa", "Van"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bare_run_uses_configured_cities() {
        let cli = Cli::parse_from(["weather-etl", "run"]);
        assert!(matches!(cli.command, Command::Run { cities } if cities.is_empty()));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["weather-etl", "history", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Command::History { limit: 20 }));
    }

    #[tokio::test]
    async fn second_interrupt_forces_exit() {
        let (tx, rx) = watch::channel(false);
        let mut seen = 0;

        let outcome = watch_interrupts(tx, || {
            seen += 1;
            async { Ok(()) }
        })
        .await;

        assert_eq!(outcome, Interrupt::Forced);
        assert_eq!(seen, 2);
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn first_interrupt_only_requests_shutdown() {
        let (tx, rx) = watch::channel(false);
        let mut seen = 0;

        let outcome = watch_interrupts(tx, || {
            seen += 1;
            let n = seen;
            async move {
                if n == 1 {
                    Ok(())
                } else {
                    Err(std::io::Error::other("signal stream closed"))
                }
            }
        })
        .await;

        assert_eq!(outcome, Interrupt::Unavailable);
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn failed_signal_setup_leaves_flag_clear() {
        let (tx, rx) = watch::channel(false);

        let outcome =
            watch_interrupts(tx, || async { Err(std::io::Error::other("no handler")) }).await;

        assert_eq!(outcome, Interrupt::Unavailable);
        assert!(!*rx.borrow());
    }

    #[test]
    fn pipeline_requires_api_key() {
        let err = build_pipeline(&Config::default()).err().expect("missing key");
        assert!(err.to_string().contains("No API key configured"));
    }
}
