//! geoharvest-ingest - Photo crawler and feature enrichment daemon
//!
//! Runs two loops until interrupted:
//! - the crawl loop, which pages through photo search results for each
//!   configured region and stores accepted photos and their renditions
//! - the feature loop, which enriches stored photos with terrain elevation,
//!   road proximity and a validity score
//!
//! A `/health` endpoint reports uptime, progress counters and the last failure.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use geoharvest_common::config::IngestConfig;
use geoharvest_common::Region;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geoharvest_ingest::clients::{
    BingElevationClient, FlickrClient, HttpImageSource, HttpValidityClassifier,
    OverpassHttpClient, S3BlobStore,
};
use geoharvest_ingest::db::{init_database_pool, SqliteGateway};
use geoharvest_ingest::services::{
    AssetFetcher, AssetFetcherSettings, CrawlerSettings, FeatureEnricher, RegionCrawler,
    RoadProximity, Scheduler, SchedulerSettings,
};
use geoharvest_ingest::utils::RetryPolicy;
use geoharvest_ingest::AppState;

/// Command-line arguments for geoharvest-ingest
#[derive(Parser, Debug)]
#[command(name = "geoharvest-ingest")]
#[command(about = "Geo-tagged photo crawler and feature enrichment daemon")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "GEOHARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Run one crawl step and one feature batch, then exit
    #[arg(long)]
    once: bool,

    /// Only run the crawl loop
    #[arg(long, conflicts_with = "features_only")]
    crawl_only: bool,

    /// Only run the feature loop
    #[arg(long)]
    features_only: bool,

    /// Restrict crawling to one region id
    #[arg(long)]
    only_region: Option<i64>,

    /// Insert or update regions from a JSON array before starting
    #[arg(long)]
    import_regions: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        IngestConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.only_region.is_some() {
        config.crawler.only_region = args.only_region;
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting geoharvest-ingest {}", env!("CARGO_PKG_VERSION"));
    config.validate().context("Invalid configuration")?;

    info!("Database: {}", config.database_path.display());
    let pool = init_database_pool(&config.database_path)
        .await
        .context("Failed to open database")?;
    let gateway = Arc::new(SqliteGateway::new(pool));

    if let Some(path) = &args.import_regions {
        import_regions(&gateway, path).await?;
    }

    let state = AppState::new();
    let scheduler = Arc::new(build_scheduler(&config, gateway.clone(), state.clone())?);
    let cancel = CancellationToken::new();

    let run_crawl = !args.features_only;
    let run_features = !args.crawl_only;

    if args.once {
        if run_crawl {
            let outcome = scheduler.crawl_once(&cancel).await.context("Crawl step failed")?;
            info!(?outcome, "Crawl step finished");
        }
        if run_features {
            let outcome = scheduler
                .enrich_once(&cancel)
                .await
                .context("Feature batch failed")?;
            info!(?outcome, "Feature batch finished");
        }
        return Ok(());
    }

    let mut loops = Vec::new();
    if run_crawl {
        loops.push(tokio::spawn(scheduler.clone().run_crawl_loop(cancel.clone())));
    }
    if run_features {
        loops.push(tokio::spawn(scheduler.clone().run_feature_loop(cancel.clone())));
    }

    tokio::spawn(shutdown_signal(cancel.clone()));

    let app = geoharvest_ingest::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .context("Server error")?;

    for handle in loops {
        if let Err(e) = handle.await {
            warn!("Loop task ended abnormally: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn build_scheduler(
    config: &IngestConfig,
    gateway: Arc<SqliteGateway>,
    state: AppState,
) -> Result<Scheduler> {
    let timeout = config.request_timeout();
    let retry = RetryPolicy::from(&config.retry);

    let flickr = Arc::new(FlickrClient::from_config(&config.flickr, timeout, retry)?);
    let store = Arc::new(S3BlobStore::from_config(&config.blob_store)?);
    let assets = AssetFetcher::new(
        flickr.clone(),
        store,
        AssetFetcherSettings::from_config(&config.crawler, &config.blob_store),
    );
    let crawler = RegionCrawler::new(flickr, assets, CrawlerSettings::from(&config.crawler));

    let classifier_endpoint = config
        .classifier
        .endpoint
        .as_deref()
        .context("classifier endpoint not configured")?;
    let enricher = FeatureEnricher::new(
        Arc::new(BingElevationClient::from_config(&config.elevation, timeout, retry)?),
        Arc::new(HttpImageSource::new(timeout, retry)?),
        Arc::new(HttpValidityClassifier::new(classifier_endpoint, timeout, retry)?),
        RoadProximity::new(Arc::new(OverpassHttpClient::new(
            config.overpass.endpoint.clone(),
            timeout,
            retry,
        )?)),
        config.enricher.concurrency,
    );

    Ok(Scheduler::new(
        gateway,
        crawler,
        enricher,
        SchedulerSettings::from(config),
        state,
    ))
}

async fn import_regions(gateway: &SqliteGateway, path: &std::path::Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let regions: Vec<Region> =
        serde_json::from_str(&content).context("Failed to parse regions file")?;

    for region in &regions {
        gateway.upsert_region(region).await?;
        info!(region_id = region.id, name = %region.name, "Region imported");
    }
    Ok(())
}

/// Cancel the loops on Ctrl+C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
    cancel.cancel();
}
