mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use pitwall_core::config::load_dotenv;
use pitwall_core::Config;
use pitwall_ingest::{create_adapter, HttpSource, RateLimitedFetcher, StagedOrchestrator};
use pitwall_store::{init_pg_pool, EntityResolver, EntityStore, MemoryStore, PgStore};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config = Config::from_env();
    if let Some(source) = &args.source {
        config.source.provider = source.clone();
    }
    if let Some(rps) = args.rate_limit_rps {
        config.ingest.rate_limit_rps = rps;
    }
    if let Some(concurrency) = args.lap_concurrency {
        config.ingest.lap_concurrency = concurrency;
    }
    config.log_summary();

    let store: Arc<dyn EntityStore> = if args.dry_run {
        info!("Dry run: using the in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let pool = init_pg_pool(&config.postgres)
            .await
            .context("failed to connect to PostgreSQL")?;
        Arc::new(PgStore::new(pool))
    };

    let adapter = create_adapter(&config).context("failed to select source adapter")?;
    let fetcher = Arc::new(RateLimitedFetcher::new(
        Arc::new(HttpSource::new()),
        &config.ingest,
    ));
    let resolver = Arc::new(EntityResolver::new(
        store,
        config.ingest.driver_name_policy,
    ));
    let orchestrator = StagedOrchestrator::new(fetcher, adapter, resolver, &config.ingest);

    let report = orchestrator.run(&args.seasons).await;
    println!("{report}");
    if !report.failures.is_empty() {
        warn!(
            failed = report.failures.len(),
            "ingestion finished with failed branches"
        );
    }
    Ok(())
}
