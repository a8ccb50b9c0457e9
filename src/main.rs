use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use rsvp_importer::vendor::eventbrite::EventbriteClient;
use rsvp_importer::vendor::meetup::MeetupClient;
use rsvp_importer::{config, db, importer, webhook};

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
        .unwrap_or_else(|_| format!("sqlite://{}/rsvp_importer.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    // Spawn the periodic Meetup import pass (single-threaded; one credential
    // at a time, end to end).
    let meetup = MeetupClient::from_config(&cfg.meetup)?;
    let meetup_settings = importer::ImportSettings::meetup(&cfg);
    let import_pool = pool.clone();
    let interval = Duration::from_secs(cfg.app.import_interval_secs);
    tokio::spawn(async move {
        loop {
            match importer::run_pass(&import_pool, &meetup, &meetup_settings, None).await {
                Ok(summary) => info!(
                    credentials = summary.credentials,
                    skipped = summary.credentials_skipped,
                    events = summary.events,
                    rsvps = summary.rsvps,
                    "import pass finished"
                ),
                Err(err) => error!(?err, "import pass failed"),
            }
            tokio::time::sleep(interval).await;
        }
    });

    let state = webhook::AppState {
        pool,
        orders: Arc::new(EventbriteClient::from_config(&cfg.eventbrite)?),
        settings: importer::ImportSettings::eventbrite(&cfg),
    };

    info!(addr = %cfg.webhook.bind_addr, "serving webhook endpoint");
    let listener = tokio::net::TcpListener::bind(&cfg.webhook.bind_addr).await?;
    axum::serve(listener, webhook::router(state)).await?;

    Ok(())
}
