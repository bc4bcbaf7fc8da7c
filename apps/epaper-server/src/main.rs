//! ePaper API Server
//!
//! Serves the edition catalogue and watermarked PDF downloads. Provides:
//!
//! - `POST /graphql` named operations used by the web client
//! - REST edition listing and location/date lookup
//! - Authenticated download with a per-user watermark on every page
//!
//! ## Architecture
//!
//! All data lives in an in-memory store seeded from JSON. Handlers reach it
//! through repository traits held in [`AppState`]. Stamping runs on the
//! blocking pool so large PDFs do not stall other requests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod extract;
mod graphql;
mod state;

use api::{handle_download, handle_edition_lookup, handle_health, handle_list_editions};
use graphql::handle_operation;
use state::AppState;

/// Command-line arguments for the ePaper server
#[derive(Parser, Debug)]
#[command(name = "epaper-server")]
#[command(about = "ePaper API server with watermarked downloads")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "EPAPER_PORT", default_value = "4000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "EPAPER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Rate limit: requests per second per IP
    #[arg(long, default_value = "10")]
    rate_limit: u32,

    /// Seed data JSON file (defaults to the bundled seed)
    #[arg(long, env = "EPAPER_SEED")]
    seed: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Routes and shared middleware, without rate limiting.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Named operations
        .route("/graphql", post(handle_operation))
        // REST endpoints
        .route("/api/editions", get(handle_list_editions))
        .route(
            "/api/editions/:location_id/:date",
            get(handle_edition_lookup),
        )
        .route("/api/download/:edition_id", get(handle_download))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ePaper server on {}:{}", args.host, args.port);

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .ok_or_else(|| anyhow!("invalid rate limit: {}", args.rate_limit))?,
    );

    let state = AppState::load(args.seed.as_deref())?;

    let app = router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", args.rate_limit);

    // The rate limiter keys on the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
