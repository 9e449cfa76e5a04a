use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use std::path::PathBuf;
use tracing::info;
use weather_ingest_core::{
    CanonicalWeatherDocument, Config, DocumentStore, MemoryStore, SqliteStore, SystemClock,
    provider::source_from_config, run_ingestion, time::format_utc_precise,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-ingest", version, about = "Hourly weather forecast ingestion")]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set the forecast endpoint, API key and database path.
    Configure,

    /// Fetch the hourly forecast once and upsert it into the store.
    Run {
        /// Forecast endpoint URL; overrides config and environment.
        #[arg(long)]
        url: Option<String>,

        /// SQLite database file; overrides config and environment.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Normalize and reconcile against an empty in-memory store.
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored documents updated since a point in time.
    Recent {
        /// RFC 3339 timestamp; defaults to 24 hours ago.
        #[arg(long)]
        since: Option<String>,

        /// Only show this city.
        #[arg(long)]
        city: Option<String>,

        /// SQLite database file; overrides config and environment.
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Run { url, db, dry_run } => {
                let mut config = load_config()?;
                if let Some(url) = url {
                    config.set_provider_url(url);
                }
                if let Some(db) = db {
                    config.store.path = Some(db);
                }
                ingest(&config, dry_run).await
            }
            Command::Recent { since, city, db } => {
                let mut config = load_config()?;
                if let Some(db) = db {
                    config.store.path = Some(db);
                }
                recent(&config, since.as_deref(), city.as_deref()).await
            }
        }
    }
}

fn load_config() -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_env_overrides();
    Ok(config)
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.database_path()?;
    SqliteStore::open(&path, &config.store.collection)
        .with_context(|| format!("Failed to open document store at {}", path.display()))
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;
    let current = config.provider.clone();

    let url = Text::new("Hourly forecast URL:")
        .with_initial_value(current.as_ref().map(|p| p.url.as_str()).unwrap_or_default())
        .with_help_message(
            "e.g. https://api.weatherbit.io/v2.0/forecast/hourly?city=Austin,TX&hours=24",
        )
        .prompt()
        .context("Failed to read forecast URL")?;
    if url.trim().is_empty() {
        bail!("Forecast URL must not be empty");
    }
    config.set_provider_url(url.trim());

    let key = Password::new("API key (leave empty if the URL already carries it):")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()
        .context("Failed to read API key")?;
    if let Some(provider) = config.provider.as_mut() {
        provider.api_key = Some(key.trim().to_string()).filter(|k| !k.is_empty());
    }

    let default_db = config.database_path()?;
    let db = Text::new("Database file:")
        .with_default(&default_db.display().to_string())
        .prompt()
        .context("Failed to read database path")?;
    config.store.path = Some(PathBuf::from(db));

    let path = config.save()?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

async fn ingest(config: &Config, dry_run: bool) -> Result<()> {
    let source = source_from_config(config)?;

    let store: Box<dyn DocumentStore> = if dry_run {
        info!("dry run: writing to an in-memory store");
        Box::new(MemoryStore::new())
    } else {
        Box::new(open_store(config)?)
    };

    let report = run_ingestion(source.as_ref(), store.as_ref(), &SystemClock).await?;
    println!("{report}");

    if !report.is_clean() {
        for failure in &report.failures {
            eprintln!("failed: {failure}");
        }
        bail!("{} document(s) were not applied", report.failures.len());
    }

    Ok(())
}

async fn recent(config: &Config, since: Option<&str>, city: Option<&str>) -> Result<()> {
    let since = match since {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --since timestamp '{s}'"))?
            .with_timezone(&Utc),
        None => Utc::now() - Duration::hours(24),
    };

    let store = open_store(config)?;
    let docs = store.find_updated_since(&format_utc_precise(since)).await?;

    let mut shown = 0;
    for raw in docs {
        let doc: CanonicalWeatherDocument = serde_json::from_value(raw.into())
            .context("Stored document does not match the canonical shape")?;
        if city.is_some_and(|c| !doc.city.eq_ignore_ascii_case(c)) {
            continue;
        }
        println!("{}", format_row(&doc));
        shown += 1;
    }

    if shown == 0 {
        println!("No documents updated since {}", since.to_rfc3339());
    }

    Ok(())
}

fn format_row(doc: &CanonicalWeatherDocument) -> String {
    let temp = doc.temp_c.map(|t| format!("{t:.1}°C")).unwrap_or_else(|| "-".to_string());
    let conditions = doc.conditions.as_deref().unwrap_or("-");
    format!(
        "{}  {:<20}  {:>8}  {}  (updated {})",
        doc.dt, doc.city, temp, conditions, doc.updated_at
    )
}
