//! Sitesift: a multi-site crawler and lemma-based search service.
//!
//! Crawls the configured sites into a SQLite-backed inverted index and
//! serves search, crawl control, and statistics over a small HTTP API.

mod api;
mod config;
mod crawler;
mod error;
mod indexer;
mod morphology;
mod search;
mod statistics;
mod storage;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::api::ApiState;
use crate::config::AppConfig;
use crate::crawler::{CrawlManager, HttpFetcher};
use crate::indexer::IndexWriter;
use crate::morphology::Morphology;
use crate::search::SearchEngine;
use crate::storage::Database;

#[derive(Parser)]
#[command(name = "sitesift", version, about = "Site crawler and search service")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configured one.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let bind = match cli.bind {
        Some(bind) => bind,
        None => config.server.bind.parse()?,
    };

    let db = Database::connect(&config.database.url).await?;

    // Configured sites show up in statistics before their first crawl.
    // Sites removed from the configuration are left in the database as is.
    for site in &config.sites {
        db.upsert_site_seed(&site.url, &site.name).await?;
    }
    for field in &config.fields {
        db.upsert_field_rule(&field.name, &field.selector, field.weight)
            .await?;
    }

    // A previous process may have died mid-crawl; those sites would
    // otherwise show INDEXING forever.
    let recovered = db.fail_stuck_sites("interrupted by restart").await?;
    if recovered > 0 {
        tracing::warn!(sites = recovered, "marked sites left mid-crawl as failed");
    }

    let writer = IndexWriter::spawn(db.clone());
    let morphology = Arc::new(Morphology::new());
    let fetcher = Arc::new(HttpFetcher::new(&config.crawl)?);
    let manager = CrawlManager::new(
        db.clone(),
        writer,
        fetcher,
        Arc::clone(&morphology),
        config.clone(),
    );
    let engine = SearchEngine::new(db.clone(), morphology, config.search.clone());
    let state = Arc::new(ApiState::new(db, manager, engine));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = api::start_http_server(bind, state, shutdown_rx).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    server.await?;

    Ok(())
}
