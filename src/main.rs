//! atsync - Repository synchronization engine for federated record stores
//!
//! Command-line wrapper that runs discovery, synchronization and the live
//! stream against a configured repository and prints JSON.

use anyhow::{Context, Result};
use atsync::{
    config::AtSyncConfig,
    discovery::DiscoveryEngine,
    registry::TypeRegistry,
    snapshot::SnapshotStore,
    stream::{SharedStream, StreamLifecycle, WebSocketTransport},
    sync::{LiveFeed, OverviewLoader, RecordSource, Synchronizer},
    xrpc::{RepositoryApi, XrpcClient},
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "atsync")]
#[command(version)]
#[command(about = "Repository synchronization engine for federated record stores")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ATSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Repository handle or DID, overriding the configuration
    #[arg(short, long)]
    repo: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover collections and record shapes
    Discover {
        /// Also print the registry entries seeded from discovery
        #[arg(long)]
        seed_registry: bool,
    },

    /// Print recent activity
    Activity {
        /// Maximum records
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print repository statistics
    Stats,

    /// Print a snapshot-first overview
    Overview,

    /// Keep recent activity current from the live stream, printing the
    /// feed on shutdown
    Feed {
        /// Maximum records kept
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Follow the live stream and print matching events
    Stream {
        /// Subscription filter keys (`$type:`, `collection:`, `operation:`)
        #[arg(short, long, default_value = "$type:app.bsky.feed.post")]
        filter: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("atsync={}", log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut config = match &cli.config {
        Some(path) => AtSyncConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AtSyncConfig::from_env(),
    };
    if let Some(repo) = cli.repo {
        config.repository.identifier = repo;
        config.repository.did = None;
    }
    config.validate()?;
    let repo = config.repository.repository_id().to_string();

    match cli.command {
        Commands::Discover { seed_registry } => run_discover(&config, &repo, seed_registry).await,
        Commands::Activity { limit } => {
            let sync = synchronizer(&config)?;
            print_json(&sync.get_recent_activity(&repo, limit).await?)
        }
        Commands::Stats => {
            let sync = synchronizer(&config)?;
            print_json(&sync.get_repository_stats(&repo).await?)
        }
        Commands::Overview => run_overview(&config, &repo).await,
        Commands::Feed { limit } => run_feed(&config, &repo, limit).await,
        Commands::Stream { filter } => run_stream(&config, filter).await,
    }
}

fn repository_api(config: &AtSyncConfig) -> Result<Arc<dyn RepositoryApi>> {
    Ok(Arc::new(XrpcClient::new(&config.repository)?))
}

fn synchronizer(config: &AtSyncConfig) -> Result<Synchronizer> {
    Ok(Synchronizer::new(repository_api(config)?, config))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_discover(config: &AtSyncConfig, repo: &str, seed_registry: bool) -> Result<()> {
    let engine = DiscoveryEngine::new(repository_api(config)?, config.discovery.clone());
    let analysis = engine.analyze_repository(repo).await?;
    tracing::info!(
        "Found {} collections and {} shapes in {}",
        analysis.collections.len(),
        analysis.shape_counts.len(),
        analysis.did
    );

    if seed_registry {
        let registry = TypeRegistry::with_builtins();
        let added = registry.seed_discovered(&analysis.collections);
        tracing::info!("Seeded {} discovered shapes into the registry", added);
        print_json(&registry.registered_shapes())?;
    }
    print_json(&analysis)
}

async fn run_overview(config: &AtSyncConfig, repo: &str) -> Result<()> {
    let snapshot = match SnapshotStore::open(&config.snapshot.dir, config.snapshot.stale_after()).await {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!("Ignoring unreadable snapshot: {}", e);
            None
        }
    };
    let live: Arc<dyn RecordSource> = Arc::new(synchronizer(config)?);
    let overview = OverviewLoader::new(live, snapshot).load(repo).await?;
    print_json(&overview)
}

async fn run_stream(config: &AtSyncConfig, filters: Vec<String>) -> Result<()> {
    let transport = Arc::new(WebSocketTransport::new(config.stream.endpoint.clone()));
    let shared = SharedStream::new(transport, &config.stream);

    let subscriptions: Vec<_> = filters
        .into_iter()
        .map(|key| {
            shared.bus().subscribe(key, |event| match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            })
        })
        .collect();

    let lifecycle = shared.client().lifecycle();
    shared.start_shared().await?;
    tracing::info!("Streaming. Press Ctrl+C to stop.");
    wait_for_shutdown(lifecycle).await;

    tracing::info!("Shutting down...");
    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    shared.stop_shared().await;
    Ok(())
}

async fn run_feed(config: &AtSyncConfig, repo: &str, limit: usize) -> Result<()> {
    let sync = Arc::new(synchronizer(config)?);
    let feed = LiveFeed::load(sync, repo, limit).await?;

    let transport = Arc::new(WebSocketTransport::new(config.stream.endpoint.clone()));
    let shared = SharedStream::new(transport, &config.stream);
    feed.attach(shared.bus(), &config.stream.wanted_collections);

    let lifecycle = shared.client().lifecycle();
    shared.start_shared().await?;
    tracing::info!(
        "Following {} with {} records. Press Ctrl+C to stop.",
        feed.repository(),
        feed.len()
    );
    wait_for_shutdown(lifecycle).await;

    tracing::info!("Shutting down...");
    feed.detach();
    shared.stop_shared().await;
    print_json(&feed.items())
}

/// Block until Ctrl+C or the stream disconnects
async fn wait_for_shutdown(mut lifecycle: tokio::sync::broadcast::Receiver<StreamLifecycle>) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            notice = lifecycle.recv() => match notice {
                Ok(StreamLifecycle::Disconnected { reason }) => {
                    tracing::warn!("Stream disconnected: {}", reason);
                    break;
                }
                Ok(notice) => tracing::debug!("Stream lifecycle: {:?}", notice),
                Err(e) => tracing::debug!("Lifecycle channel: {}", e),
            }
        }
    }
}
