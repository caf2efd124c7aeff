//! Subcommands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use swcache_client::{FetchClient, FetchConfig, resolve};
use swcache_core::{
    AppConfig, CacheController, CacheDb, ControllerConfig, Destination, Registration, Request, UpdateOutcome,
    controller::CacheName,
};

/// Offline cache controller for the study site.
#[derive(Debug, Parser)]
#[command(name = "swcache", version, about)]
pub struct Cli {
    /// Override the cache store path (SWCACHE_DB_PATH).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install the configured version and activate it, sweeping stale generations.
    Update,
    /// Serve one request through the active controller.
    Fetch {
        /// Absolute URL, or a path resolved against the origin.
        url: String,
        /// Request destination.
        #[arg(long, value_enum, default_value_t = Dest::Empty)]
        dest: Dest,
        /// Write the response body to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List cache generations.
    Caches,
    /// List entries of a generation (default: the current one).
    Entries { name: Option<String> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Dest {
    Document,
    Style,
    Script,
    Image,
    Audio,
    Empty,
}

impl From<Dest> for Destination {
    fn from(dest: Dest) -> Self {
        match dest {
            Dest::Document => Destination::Document,
            Dest::Style => Destination::Style,
            Dest::Script => Destination::Script,
            Dest::Image => Destination::Image,
            Dest::Audio => Destination::Audio,
            Dest::Empty => Destination::Empty,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpdateOutput {
    outcome: &'static str,
    cache: String,
    cached: usize,
    failed: Vec<(String, String)>,
    deleted: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FetchOutput {
    url: String,
    status: u16,
    source: String,
    content_type: Option<String>,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct CacheRow {
    name: String,
    entries: u64,
    role: &'static str,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let db = Arc::new(
        CacheDb::open(&config.db_path)
            .await
            .with_context(|| format!("opening cache store {}", config.db_path.display()))?,
    );

    match cli.command {
        Command::Update => update(&config, db).await,
        Command::Fetch { url, dest, output } => fetch(&config, db, &url, dest.into(), output).await,
        Command::Caches => caches(&config, &db).await,
        Command::Entries { name } => entries(&config, &db, name).await,
    }
}

fn network(config: &AppConfig) -> Result<Arc<FetchClient>> {
    let fetch_config = FetchConfig {
        user_agent: config.user_agent.clone(),
        max_bytes: config.max_bytes,
        timeout: config.timeout(),
        ..Default::default()
    };
    Ok(Arc::new(FetchClient::new(fetch_config)?))
}

fn registration(
    controller_config: &ControllerConfig, net: Arc<FetchClient>,
) -> Result<Registration<CacheDb, FetchClient>> {
    let base = controller_config.base_path.clone();
    let script = base.join("sw.js");
    Ok(Registration::new(base, &script, net)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn update(config: &AppConfig, db: Arc<CacheDb>) -> Result<()> {
    let controller_config = config.controller_config()?;
    let net = network(config)?;
    let registration = registration(&controller_config, net.clone())?;
    let cache = controller_config.cache_name.current();

    // A previously activated version is adopted first so an unchanged
    // deployment does not precache again.
    if let Err(e) = registration
        .resume(CacheController::new(controller_config.clone(), db.clone(), net.clone()))
        .await
    {
        tracing::debug!(cache = %cache, error = %e, "no resumable controller");
    }

    let controller = CacheController::new(controller_config, db, net);
    let output = match registration.update(controller).await? {
        UpdateOutcome::Unchanged => {
            UpdateOutput { outcome: "unchanged", cache, cached: 0, failed: Vec::new(), deleted: Vec::new() }
        }
        UpdateOutcome::Waiting(install) => UpdateOutput {
            outcome: "waiting",
            cache,
            cached: install.cached.len(),
            failed: install.failed,
            deleted: Vec::new(),
        },
        UpdateOutcome::Activated { install, activate, .. } => UpdateOutput {
            outcome: "activated",
            cache,
            cached: install.cached.len(),
            failed: install.failed,
            deleted: activate.deleted,
        },
    };

    print_json(&output)
}

async fn fetch(
    config: &AppConfig, db: Arc<CacheDb>, input: &str, destination: Destination, output: Option<PathBuf>,
) -> Result<()> {
    let controller_config = config.controller_config()?;
    let url = resolve(&controller_config.origin, input)?;
    let net = network(config)?;
    let registration = registration(&controller_config, net.clone())?;

    let page = registration.open_client();
    registration
        .resume(CacheController::new(controller_config, db, net))
        .await
        .context("no active cache generation; run `swcache update` first")?;

    let served = registration.fetch(page, Request::get(url).with_destination(destination)).await?;
    let response = served.response;

    if let Some(path) = output {
        std::fs::write(&path, &response.body).with_context(|| format!("writing {}", path.display()))?;
    }

    print_json(&FetchOutput {
        url: response.url.to_string(),
        status: response.status,
        source: served.source.to_string(),
        content_type: response.content_type().map(str::to_string),
        bytes: response.body.len(),
    })
}

async fn caches(config: &AppConfig, db: &CacheDb) -> Result<()> {
    let naming = CacheName::new(&config.cache_prefix, &config.cache_version);

    let mut rows = Vec::new();
    for name in db.cache_names().await? {
        let role = if name == naming.current() {
            "current"
        } else if naming.is_stale(&name) {
            "stale"
        } else {
            "unmanaged"
        };
        let entries = db.entry_count(&name).await?;
        rows.push(CacheRow { name, entries, role });
    }

    print_json(&rows)
}

async fn entries(config: &AppConfig, db: &CacheDb, name: Option<String>) -> Result<()> {
    let name = name.unwrap_or_else(|| format!("{}{}", config.cache_prefix, config.cache_version));
    if !db.has_cache(&name).await? {
        bail!("no cache generation named {name}");
    }

    let rows: Vec<_> = db
        .list_entries(&name)
        .await?
        .into_iter()
        .map(|e| serde_json::json!({ "url": e.url, "status": e.status, "bytes": e.size, "stored_at": e.stored_at }))
        .collect();

    print_json(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_fetch() {
        let cli = Cli::try_parse_from(["swcache", "fetch", "/weeks/week-01.html", "--dest", "document"]).unwrap();
        match cli.command {
            Command::Fetch { url, dest, output } => {
                assert_eq!(url, "/weeks/week-01.html");
                assert_eq!(Destination::from(dest), Destination::Document);
                assert!(output.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_global_db_flag() {
        let cli = Cli::try_parse_from(["swcache", "caches", "--db", "/tmp/x.sqlite"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.sqlite")));
        assert!(matches!(cli.command, Command::Caches));
    }

    #[test]
    fn test_registration_script_under_subpath() {
        let config = AppConfig {
            origin: Some("https://example.github.io".into()),
            base_path: "/Mens-Group/".into(),
            ..Default::default()
        };
        let controller_config = config.controller_config().unwrap();
        let net = network(&config).unwrap();
        let registration = registration(&controller_config, net).unwrap();
        assert_eq!(registration.script_path(), "/Mens-Group/sw.js");
    }
}
