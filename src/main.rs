use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use flocksync::api::RestClient;
use flocksync::config;
use flocksync::context::AppContext;
use flocksync::db;
use flocksync::orchestrator::Orchestrator;
use flocksync::settings::Settings;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/flocksync.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let settings = Settings::new(pool.clone());
    settings.seed_defaults().await?;

    let user_agent = settings.user_agent().await;
    let api = Arc::new(RestClient::new(cfg.base_url()?, &user_agent)?);
    let ctx = AppContext::resolve(pool, api).await?;

    info!("starting sync engine");
    let orchestrator = Orchestrator::new(ctx);
    tokio::select! {
        _ = orchestrator.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
