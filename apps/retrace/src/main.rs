mod config;
mod errors;
mod models;
mod reconstruct;
mod report;
mod sources;
mod track_client;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::models::roster::Roster;
use crate::reconstruct::PipelineSources;
use crate::track_client::{ConnectionCache, TrackClient};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Retrace v{}", env!("CARGO_PKG_VERSION"));

    let roster = Roster::load(&config.roster_path)?;
    info!(
        "Roster loaded: {} tracked, {} peers",
        roster.tracked.len(),
        roster.peers.len()
    );

    let mut cache = ConnectionCache::new();
    let client = TrackClient::new(&mut cache, &config.base_url, &config.auth_token);
    info!("Track client initialized for {}", config.base_url);

    let cutoff = Utc::now() - Duration::days(config.window_days);
    info!(
        "Reconstructing activity since {} ({} days)",
        cutoff.format("%Y-%m-%d %H:%M UTC"),
        config.window_days
    );

    let sources = PipelineSources {
        revisions: &client,
        comments: &client,
        relations: &client,
    };
    let report = reconstruct::run(sources, &roster, cutoff).await?;

    std::fs::create_dir_all(&config.out_dir)?;
    let md_path = config.out_dir.join("activity.md");
    let csv_path = config.out_dir.join("activity.csv");
    std::fs::write(&md_path, report::markdown::render_markdown(&report, cutoff))?;
    std::fs::write(&csv_path, report::csv::render_csv(&report.activities))?;

    info!(
        "Wrote {} activities for {} relevant entities to {} and {}",
        report.activities.len(),
        report.summary.relevant_entities,
        md_path.display(),
        csv_path.display()
    );
    if report.summary.pagination_stopped_early {
        info!("Note: pagination stopped early, report covers partial data");
    }

    Ok(())
}
