use anyhow::{anyhow, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use shoujin_notifier::cache::SnapshotCache;
use shoujin_notifier::config;
use shoujin_notifier::model::is_service_user_id;
use shoujin_notifier::report;
use shoujin_notifier::stats::StatsClient;
use shoujin_notifier::webhook::{Notifier, WebhookClient};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Diff tracked users against cached snapshots and post one digest, without a database"
)]
struct Args {
    /// AtCoder ids to check instead of `standalone.users` (used as handles too)
    users: Vec<String>,

    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `standalone.webhook_url`
    #[arg(long)]
    webhook_url: Option<String>,

    /// Override `standalone.cache_dir`
    #[arg(long)]
    cache_dir: Option<String>,

    /// Print the digest without posting it
    #[arg(long)]
    no_post: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let (cfg, created) = config::load_or_init(&args.config)?;
    if created {
        info!(path = %args.config.display(), "wrote default config");
    }
    let standalone = cfg
        .standalone
        .clone()
        .ok_or_else(|| anyhow!("config has no `standalone` section"))?;

    let users: BTreeMap<String, String> = if args.users.is_empty() {
        standalone.users.clone()
    } else {
        if let Some(bad) = args.users.iter().find(|u| !is_service_user_id(u)) {
            return Err(anyhow!("invalid AtCoder id {bad:?}"));
        }
        args.users.iter().map(|u| (u.clone(), u.clone())).collect()
    };
    let webhook_url = args.webhook_url.unwrap_or(standalone.webhook_url);
    let cache_dir = args.cache_dir.unwrap_or(standalone.cache_dir);
    let cache = SnapshotCache::new(config::expand_home(&cache_dir));

    let stats = StatsClient::from_config(&cfg)?;
    let text = report::standalone_digest(&stats, &cache, &users, &cfg.report_settings()).await?;

    if text.is_empty() {
        info!("nothing to notify");
        return Ok(());
    }
    println!("{text}");
    if !args.no_post {
        info!(%webhook_url, "posting digest");
        WebhookClient::new()?.post(&webhook_url, &text).await?;
    }
    Ok(())
}
