//! `shorts-watch` -- follow a video pipeline run from the terminal.
//!
//! Submits a new run (or attaches to `--id`), then prints progress as
//! it arrives over the push stream or, when that is unavailable, from
//! status polling. Exits non-zero when the run fails.
//!
//! # Environment variables
//!
//! See [`MonitorConfig::from_env`]. `RUST_LOG` controls log output
//! (default `shorts_watch=info,shorts_client=info`).

use anyhow::Context;
use clap::Parser;
use shorts_client::api::{GenerateRequest, ShortsApi};
use shorts_client::channel::ChannelState;
use shorts_client::config::MonitorConfig;
use shorts_client::monitor::ProgressMonitor;
use shorts_core::error::validate_execution_id;
use shorts_core::status::Lifecycle;
use shorts_watch::cli::Args;
use shorts_watch::render::{summary, Renderer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shorts_watch=info,shorts_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = MonitorConfig::from_env().context("Invalid configuration")?;
    if let Some(api_url) = &args.api_url {
        config = config.with_api_url(api_url.as_str());
    }

    let api = ShortsApi::with_timeout(config.api_url.clone(), config.request_timeout)?;

    if args.check {
        let report = api.health().await.context("Health check failed")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let execution_id = match args.id {
        Some(id) => validate_execution_id(id)?,
        None => {
            let request = GenerateRequest {
                topic: args.topic.clone(),
                config_overrides: args.config_overrides()?,
            };
            api.submit(&request).await.context("Failed to submit run")?
        }
    };

    tracing::info!(
        execution_id,
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        "Starting shorts-watch",
    );

    let mut monitor = ProgressMonitor::connect(&config)?;
    let mut updates = monitor.subscribe();
    monitor.observe(Some(execution_id), true);

    let mut renderer = Renderer::new();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        for line in renderer.render(&snapshot) {
            println!("{} {line}", chrono::Local::now().format("%H:%M:%S"));
        }
        if snapshot.state == ChannelState::Idle {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(execution_id, "Interrupted, detaching");
                monitor.detach();
                break;
            }
        }
    }

    let view = monitor.view();
    println!("{}", summary(&view, api.video_url_for(&view).as_deref()));

    if view.status == Lifecycle::Failed {
        anyhow::bail!("execution {execution_id} failed");
    }
    Ok(())
}
