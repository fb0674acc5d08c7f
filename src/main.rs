use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use community_feed::config::Config;
use community_feed::db::Database;
use community_feed::routes::{self, AppState};
use community_feed::syncer::{start_background_refresh, Syncer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "community_feed=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "community.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} sites from {}",
        config.sites.len(),
        config_path
    );

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:community_feed.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    db.sync_sites(&config.sites).await?;
    info!("Database initialized");

    let db = Arc::new(db);

    // Create syncer
    let syncer = Arc::new(Syncer::new(db.clone())?);

    // Start background refresh task
    let bg_syncer = syncer.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        start_background_refresh(bg_syncer, refresh_interval).await;
    });

    let state = Arc::new(AppState::new(db.clone(), syncer.clone(), &config));
    if state.admin.is_enabled() {
        info!("Admin dashboard enabled");
    } else {
        warn!("No [admin] section configured, admin logins are disabled");
    }

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
