use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use shoujin_notifier::config;
use shoujin_notifier::db;
use shoujin_notifier::report;
use shoujin_notifier::stats::StatsClient;
use shoujin_notifier::webhook::WebhookClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Post daily AtCoder progress digests to registered rooms")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Start with a report cycle instead of waiting for the date to change
    #[arg(long)]
    now: bool,

    /// Run a single report cycle and exit
    #[arg(long)]
    once: bool,
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

    let stats = StatsClient::from_config(&cfg)?;
    let notifier = WebhookClient::new()?;
    let settings = cfg.report_settings();

    if args.once {
        let outcomes = report::report_all_rooms(&pool, &stats, &notifier, &settings).await?;
        for (room_id, outcome) in outcomes {
            info!(room_id, ?outcome, "room reported");
        }
        return Ok(());
    }

    let poll_interval = Duration::from_secs(cfg.app.poll_interval_secs);
    info!(?poll_interval, "starting report daemon");
    tokio::select! {
        _ = report::run_daemon(&pool, &stats, &notifier, &settings, poll_interval, args.now) => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutting down");
        }
    }
    pool.close().await;
    Ok(())
}
