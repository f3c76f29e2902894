// Poker Streaks - Read-only Web Server
//
// STREAKS_SERVER_ADDR picks the bind address (default 0.0.0.0:3000); the data
// directory comes from the same environment as the CLI.

use anyhow::Context;
use poker_streaks::{api, StreakTracker, TrackerConfig};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    println!("🌐 Poker Streaks - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = TrackerConfig::from_env()?;
    let data_dir = config.data_dir.clone();
    let tracker = StreakTracker::open(config).context("open streak tracker")?;
    println!("✓ Data directory: {:?}", data_dir);

    let app = api::build_router(Arc::new(Mutex::new(tracker)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/players", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("STREAKS_SERVER_ADDR").ok()?.parse().ok()
}
