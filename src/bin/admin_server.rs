use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use shoujin_notifier::config;
use shoujin_notifier::db;
use shoujin_notifier::stats::StatsClient;
use shoujin_notifier::web::{self, AppState};
use shoujin_notifier::webhook::WebhookClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Admin endpoints for rooms and tracked users")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let state = AppState {
        pool,
        notifier: Arc::new(WebhookClient::new()?),
        stats: Arc::new(StatsClient::from_config(&cfg)?),
    };

    let bind = args.bind.unwrap_or_else(|| cfg.server.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "admin server listening");
    web::serve(listener, state).await
}
