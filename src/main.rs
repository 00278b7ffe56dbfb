// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trainload sync runner
//!
//! Runs one sync against Strava for the repository at `TRAINLOAD_ROOT`,
//! then prints the sync report and status as JSON.

use anyhow::Context;
use trainload::{
    config::Config,
    services::{sync_status, StravaClient, SyncPipeline},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(root = %config.root.display(), "Starting trainload sync");

    let token = config
        .strava_access_token
        .clone()
        .context("STRAVA_ACCESS_TOKEN is not set")?;
    let source = StravaClient::new(token).with_base_url(config.strava_base_url.clone());

    let pipeline = SyncPipeline::new(config.clone(), source);
    let report = pipeline.sync(None).await?;
    let status = sync_status(&config)?;

    let output = serde_json::json!({
        "report": report,
        "outcome": report.outcome(),
        "status": status,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !report.outcome().is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Logging: JSON lines when `TRAINLOAD_LOG_FORMAT=json`, readable text otherwise.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trainload=debug,info"));

    let json = std::env::var("TRAINLOAD_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
