use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::{fs, io::Read, path::PathBuf, time::Duration};
use tracing::Level;
use weather_stream_core::{
    CanonicalRecord, Config, Pipeline, RecordSink, SinkKind, WeatherProvider,
    dashboard::DashboardBuilder,
    health::{Health, HealthChecker},
    http, normalize, normalize_json,
    provider::provider_from_config,
    sink::{JsonLinesSink, sink_from_config},
};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-stream", version, about = "Stream normalized weather observations")]
pub struct Cli {
    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, global = true, default_value_t = DEFAULT_LOG_LEVEL)]
    pub log_level: Level,

    /// Read configuration from this file instead of the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key in the config file.
    Configure {
        /// Key to store; prompted for when absent.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Normalize a raw provider response read from FILE or stdin.
    Normalize {
        file: Option<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },

    /// Fetch and print the normalized record for one city.
    Fetch {
        city: String,

        #[arg(long)]
        pretty: bool,
    },

    /// Poll every configured city and deliver records to a sink.
    Run {
        /// "stdout" or "elasticsearch"; defaults to the configured sink.
        #[arg(long)]
        sink: Option<String>,

        /// City to poll; repeat to poll several. Defaults to the configured list.
        #[arg(long = "city")]
        cities: Vec<String>,

        /// Stop after this many cycles.
        #[arg(long)]
        cycles: Option<u64>,

        /// Seconds between cycles; defaults to the configured interval.
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Prefix stdout lines with the city name and a tab.
        #[arg(long)]
        keyed: bool,
    },

    /// Check the provider, the search engine and the dashboard tool.
    Health,

    /// Create the index pattern and per-city visualizations.
    Dashboard,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = load_config(self.config.as_ref())?;

        match self.command {
            Command::Configure { api_key } => configure(config, self.config, api_key),
            Command::Normalize { file, pretty } => {
                let body = read_input(file.as_ref())?;
                let record = normalize_json(&body, &Local::now())?;
                print_record(&record, pretty)
            }
            Command::Fetch { city, pretty } => {
                let provider = provider_from_config(&config)?;
                let raw = provider.current(&city).await?;
                let record = normalize(&raw, &Local::now())?;
                print_record(&record, pretty)
            }
            Command::Run {
                sink,
                cities,
                cycles,
                interval_secs,
                keyed,
            } => {
                let kind = match sink {
                    Some(s) => SinkKind::try_from(s.as_str())?,
                    None => config.sink,
                };
                let cities = if cities.is_empty() {
                    config.cities.clone()
                } else {
                    cities
                };
                if cities.is_empty() {
                    return Err(anyhow!("No cities to poll. Add `cities` to the config or pass --city."));
                }
                let interval = resolve_interval(interval_secs, &config)?;

                let sink: Box<dyn RecordSink> = if kind == SinkKind::Stdout && keyed {
                    Box::new(JsonLinesSink::stdout().keyed(true))
                } else {
                    sink_from_config(kind, &config)?
                };

                let pipeline = Pipeline::new(provider_from_config(&config)?, sink, cities);
                tracing::info!(message = "delivering records", sink = %kind);

                let shutdown = async {
                    let _ = tokio::signal::ctrl_c().await;
                };
                let ran = pipeline.run(interval, cycles, shutdown).await;
                tracing::info!(message = "polling stopped", cycles = ran);
                Ok(())
            }
            Command::Health => health(&config).await,
            Command::Dashboard => dashboard(&config).await,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut cfg = Config::load_from(path)?;
            cfg.apply_api_key_override(std::env::var(weather_stream_core::config::API_KEY_ENV).ok());
            Ok(cfg)
        }
        None => Config::load(),
    }
}

/// The flag wins over the config file. Zero is rejected from either source.
fn resolve_interval(flag: Option<u64>, config: &Config) -> Result<Duration> {
    let secs = flag.unwrap_or(config.interval_secs);
    if secs == 0 {
        return Err(anyhow!(
            "Polling interval must be at least one second. Set `interval_secs` or pass --interval-secs."
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn configure(mut config: Config, path: Option<PathBuf>, api_key: Option<String>) -> Result<()> {
    let api_key = match api_key {
        Some(key) => key,
        None => inquire::Password::new("OpenWeather API key:")
            .without_confirmation()
            .prompt()
            .context("Failed to read API key")?,
    };

    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }
    config.set_api_key(api_key);

    let path = match path {
        Some(path) => path,
        None => Config::config_file_path()?,
    };
    config.save_to(&path)?;

    println!("Saved configuration to {}", path.display());
    Ok(())
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read observation file: {}", path.display())),
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read observation from stdin")?;
            Ok(body)
        }
    }
}

fn print_record(record: &CanonicalRecord, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(record)
    } else {
        serde_json::to_string(record)
    }
    .context("Failed to serialize record")?;

    println!("{json}");
    Ok(())
}

async fn health(config: &Config) -> Result<()> {
    let checker = HealthChecker::new(http::build_client(config.request_timeout())?, config);

    let provider = match provider_from_config(config) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!(message = "skipping provider check", error = %e);
            None
        }
    };
    let probe = provider
        .as_deref()
        .zip(config.cities.first().map(String::as_str));

    let report = checker.run_all(probe).await;

    for status in &report.services {
        let marker = match status.health {
            Health::Healthy => "ok  ",
            Health::Degraded => "warn",
            Health::Unhealthy => "FAIL",
        };
        println!("[{marker}] {:<14} {}", status.name, status.detail);
    }
    println!(
        "{}/{} services up",
        report.up_count(),
        report.services.len()
    );

    if report.all_up() {
        Ok(())
    } else {
        Err(anyhow!("One or more services are unhealthy"))
    }
}

async fn dashboard(config: &Config) -> Result<()> {
    let builder = DashboardBuilder::new(http::build_client(config.request_timeout())?, config);

    builder.create_index_pattern().await?;
    let report = builder.create_city_metrics(&config.cities).await;

    println!(
        "visualizations: {} created, {} already present, {} failed",
        report.created.len(),
        report.existing.len(),
        report.failed.len()
    );
    for (id, err) in &report.failed {
        println!("  {id}: {err}");
    }

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Some visualizations could not be created"))
    }
}
