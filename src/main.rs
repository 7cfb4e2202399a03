//! Binary entrypoint: wires settings, the venue registry, every tracker and
//! gate, the persistence layer, the messaging channel, and the admin HTTP
//! surface into a `Pipeline`, then starts the job loops (spec.md §4.11, §9).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use arbscan_backend::adapter::{synthetic_timing, MockAdapter, VenueCapabilities};
use arbscan_backend::api::{self, ApiState};
use arbscan_backend::config;
use arbscan_backend::convergence::ConvergenceTracker;
use arbscan_backend::cooldown::{Blacklist, CooldownGate};
use arbscan_backend::fetcher::Fetcher;
use arbscan_backend::lagging::LaggingVenueDetector;
use arbscan_backend::messaging::{MessagingChannel, RecordingChannel, WebhookChannel};
use arbscan_backend::models::{BookLevel, OrderBook, Quote, Ticker, VenueKind, VenueListing};
use arbscan_backend::orchestrator::{self, Pipeline};
use arbscan_backend::registry::{TickerRegistry, VenueRegistry};
use arbscan_backend::store::SignalStore;
use arbscan_backend::trackers::{DepthHistoryCollector, SpreadAgeTracker};

/// Cross-venue arbitrage scanner and alerting pipeline.
#[derive(Debug, Parser)]
#[command(name = "arbscan", version, about)]
struct Cli {
    /// Path to a TOML settings file; missing file falls back to code defaults + env.
    #[arg(long, env = "ARBSCAN_CONFIG_PATH")]
    config: Option<std::path::PathBuf>,

    /// SQLite database path for signals and convergence tracking.
    #[arg(long, env = "ARBSCAN_DB_PATH", default_value = "arbscan_signals.db")]
    db_path: std::path::PathBuf,

    /// Webhook URL for outbound alerts; omit to use an in-memory recording channel.
    #[arg(long, env = "ARBSCAN_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Bind address for the admin/status HTTP surface.
    #[arg(long, env = "ARBSCAN_BIND_ADDR", default_value = "0.0.0.0:3000")]
    bind_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    info!("arbscan starting");

    let settings = config::load(cli.config.as_deref(), &HashMap::new())?;

    let venues = VenueRegistry::new();
    let tickers = TickerRegistry::new();
    seed_demo_market(&venues, &tickers);

    let fetcher = Arc::new(Fetcher::new(venues.clone(), 5.0, 2.0));
    let db_path_str = cli
        .db_path
        .to_str()
        .context("db path must be valid UTF-8")?;
    let store = Arc::new(
        SignalStore::open(db_path_str)
            .with_context(|| format!("opening signal store at {}", cli.db_path.display()))?,
    );

    let channel: Arc<dyn MessagingChannel> = match cli.webhook_url {
        Some(url) => {
            info!(url = %url, "outbound alerts via webhook channel");
            Arc::new(WebhookChannel::new(
                url,
                Duration::from_secs(settings.http_connect_timeout_secs),
                Duration::from_secs(settings.http_read_timeout_secs),
            ))
        }
        None => {
            info!("no ARBSCAN_WEBHOOK_URL set, outbound alerts stay in the in-memory recording channel");
            Arc::new(RecordingChannel::new())
        }
    };

    let pipeline = Arc::new(Pipeline {
        settings,
        venues,
        tickers,
        fetcher,
        spread_age: Arc::new(SpreadAgeTracker::new()),
        depth_history: Arc::new(DepthHistoryCollector::new()),
        lagging: Arc::new(LaggingVenueDetector::new()),
        cooldown: Arc::new(CooldownGate::new()),
        blacklist: Arc::new(Blacklist::new()),
        convergence: Arc::new(ConvergenceTracker::new()),
        store: store.clone(),
        channel,
        stop: Arc::new(AtomicBool::new(false)),
    });

    let job_handles = orchestrator::spawn_all(pipeline.clone());

    let app = api::router(ApiState { store });
    let listener = TcpListener::bind(cli.bind_addr).await?;
    info!(addr = %cli.bind_addr, "admin API listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("admin API server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            pipeline.stop();
        }
    }

    for handle in job_handles {
        handle.abort();
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbscan_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Populates the registry with a handful of mock venues and a seeded BTC
/// ticker so the binary is runnable out of the box. Concrete venue adapters
/// are out of scope (spec.md §1); this is demo wiring only.
fn seed_demo_market(venues: &VenueRegistry, tickers: &TickerRegistry) {
    let cex = Arc::new(MockAdapter::new(
        "binance_futures",
        VenueCapabilities { quotes: true, orderbook: true, funding: true, shortable: true },
    ));
    let dex = Arc::new(MockAdapter::new(
        "jupiter",
        VenueCapabilities { quotes: true, orderbook: true, funding: false, shortable: false },
    ));

    cex.seed_quote(Quote {
        venue_id: "binance_futures".into(),
        symbol: "BTC".into(),
        bid: Decimal::new(6_520_000, 2),
        ask: Decimal::new(6_520_500, 2),
        mid: None,
        mark: None,
        volume_24h: None,
        received_at_ms: 0,
        latency_ms: 40,
    });
    cex.seed_book(OrderBook {
        venue_id: "binance_futures".into(),
        symbol: "BTC".into(),
        bids: vec![
            BookLevel { price: Decimal::new(6_520_000, 2), size: Decimal::new(5, 1) },
            BookLevel { price: Decimal::new(6_519_500, 2), size: Decimal::new(10, 1) },
        ],
        asks: vec![
            BookLevel { price: Decimal::new(6_520_500, 2), size: Decimal::new(5, 1) },
            BookLevel { price: Decimal::new(6_521_000, 2), size: Decimal::new(10, 1) },
        ],
        timing: synthetic_timing(0, 40),
    });

    dex.seed_quote(Quote {
        venue_id: "jupiter".into(),
        symbol: "BTC".into(),
        bid: Decimal::new(6_680_000, 2),
        ask: Decimal::new(6_680_500, 2),
        mid: None,
        mark: None,
        volume_24h: None,
        received_at_ms: 0,
        latency_ms: 120,
    });
    dex.seed_book(OrderBook {
        venue_id: "jupiter".into(),
        symbol: "BTC".into(),
        bids: vec![
            BookLevel { price: Decimal::new(6_680_000, 2), size: Decimal::new(3, 1) },
            BookLevel { price: Decimal::new(6_679_000, 2), size: Decimal::new(8, 1) },
        ],
        asks: vec![
            BookLevel { price: Decimal::new(6_680_500, 2), size: Decimal::new(3, 1) },
            BookLevel { price: Decimal::new(6_681_500, 2), size: Decimal::new(8, 1) },
        ],
        timing: synthetic_timing(0, 120),
    });

    venues.register(cex);
    venues.register(dex);

    tickers.refresh(Ticker {
        symbol: "BTC".to_string(),
        contracts: Default::default(),
        venues: vec![
            VenueListing {
                venue_id: "binance_futures".into(),
                kind: VenueKind::CexFutures,
                taker_fee_pct: Decimal::new(4, 2),
            },
            VenueListing {
                venue_id: "jupiter".into(),
                kind: VenueKind::DexSpot,
                taker_fee_pct: Decimal::new(10, 2),
            },
        ],
        arbitrage_pairs: vec![],
        is_valid: true,
        validation_errors: vec![],
        updated_at: 0,
    });
}
