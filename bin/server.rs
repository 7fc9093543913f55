// Division Admin - Web Server
// REST API and admin proxy endpoints with Axum

use anyhow::Context;
use clap::Parser;
use division_admin::api::{router, AppState};
use division_admin::{Config, DataStore, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "division-admin-server")]
#[command(about = "HTTP API for division administration")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "division-admin.toml", env = "DIVISION_ADMIN_CONFIG")]
    config: PathBuf,

    /// Listen address (overrides config file)
    #[arg(long, env = "DIVISION_ADMIN_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    config.logging.init_tracing();

    println!("🌐 Division Admin - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = SqliteStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    info!("Database opened: {}", config.database.path.display());

    let store: Arc<dyn DataStore> = Arc::new(store);
    let state = AppState::new(store, &config).context("Invalid server configuration")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    println!("\n🚀 Server running on http://{}", config.server.bind);
    println!("   API:       /api/health");
    println!("   Functions: /functions/v1/admin-locations");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
