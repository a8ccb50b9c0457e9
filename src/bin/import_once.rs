use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use rsvp_importer::vendor::meetup::MeetupClient;
use rsvp_importer::{config, db, importer};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one Meetup import pass over all stored credentials and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Only import for this platform user's credential
    #[arg(long)]
    user_id: Option<i64>,
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

    let meetup = MeetupClient::from_config(&cfg.meetup)?;
    let settings = importer::ImportSettings::meetup(&cfg);

    let summary = importer::run_pass(&pool, &meetup, &settings, args.user_id).await?;
    info!(
        credentials = summary.credentials,
        skipped = summary.credentials_skipped,
        events = summary.events,
        rsvps = summary.rsvps,
        "import pass complete"
    );
    Ok(())
}
