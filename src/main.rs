//! aiv-helperbot: noticeboard reconciliation daemon
//!
//! Polls the configured noticeboards every few minutes and:
//! - removes reports about subjects that are now blocked or locked
//! - annotates reports about sensitive IPs and watched categories
//! - restores the posting instructions from their canonical copy
//! - toggles the backlog indicator

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use aiv_helperbot::wiki::MediaWikiBackend;
use aiv_helperbot::{Config, Reconciler};

#[derive(Parser)]
#[command(name = "aiv-helperbot")]
#[command(about = "Noticeboard reconciliation bot")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "aiv-helperbot.toml")]
    config: PathBuf,

    /// MediaWiki api.php endpoint (overrides config file)
    #[arg(long, env = "WIKI_API_URL")]
    api_url: Option<String>,

    /// Bot password username
    #[arg(long, env = "WIKI_USERNAME")]
    username: Option<String>,

    /// Bot password
    #[arg(long, env = "WIKI_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Check everything but never save
    #[arg(long)]
    dry_run: bool,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Log filter directive, e.g. "aiv_helperbot=debug"
    #[arg(long, default_value = "aiv_helperbot=info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(cli.log_level.parse()?)
        )
        .init();

    info!("Starting aiv-helperbot");
    info!("Config file: {}", cli.config.display());

    let mut config = Config::load(&cli.config)?;

    // Apply CLI overrides
    if let Some(api_url) = cli.api_url {
        config.wiki.api_url = api_url;
    }
    if let Some(username) = cli.username {
        config.wiki.username = Some(username);
    }
    if let Some(password) = cli.password {
        config.wiki.password = Some(password);
    }
    if cli.dry_run {
        config.bot.dry_run = true;
    }

    info!("API: {}", config.wiki.api_url);
    info!("Pages: {}", config.bot.pages.join(", "));

    let backend = MediaWikiBackend::new(
        &config.wiki.api_url,
        &config.wiki.user_agent,
        config.wiki.request_timeout(),
    )?;
    match config.credentials() {
        Some((username, password)) => backend.login(username, password).await?,
        None if config.bot.dry_run => info!("No credentials, continuing anonymously"),
        None => warn!("No credentials configured, saves will be rejected"),
    }

    let reconciler = Reconciler::new(Arc::new(backend), config.bot.clone());

    if cli.once {
        reconciler.run_pass().await?;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(()).await;
        }
    });

    reconciler.run(shutdown_rx).await?;

    info!("aiv-helperbot stopped");
    Ok(())
}
