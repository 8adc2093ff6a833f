//! courtside-worker: keeps gym occupancy and the badminton schedule fresh.
//!
//! Wires configuration, fetchers, the in-memory store, the alert dispatcher
//! and the scheduler, then runs until SIGINT/SIGTERM.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use courtside_core::config::{load_dotenv, Config};
use courtside_fetch::{event_fetcher, occupancy_fetcher, HttpClient};
use courtside_notify::{AlertDispatcher, AlertRenderer, LogNotifier, Notifier, WebhookNotifier};
use courtside_scheduler::{EventsJob, JobSchedule, OccupancyJob, Scheduler, SchedulerConfig};
use courtside_store::{ChannelAlertSink, EndedBefore, Store};

// ── CLI ─────────────────────────────────────────────────────────────

/// Courtside worker: scheduled occupancy and schedule refresh with alerts.
#[derive(Parser, Debug)]
#[command(name = "courtside-worker", version, about)]
struct Cli {
    /// Validate configuration and schedules, then exit.
    #[arg(long)]
    check: bool,

    /// Minijinja template for the alert subject.
    #[arg(long, env = "ALERT_SUBJECT_TEMPLATE")]
    subject_template: Option<String>,

    /// Minijinja template for the alert body.
    #[arg(long, env = "ALERT_BODY_TEMPLATE")]
    body_template: Option<String>,
}

fn alert_renderer(cli: &Cli) -> anyhow::Result<AlertRenderer> {
    if cli.subject_template.is_none() && cli.body_template.is_none() {
        return Ok(AlertRenderer::default());
    }
    let subject = cli
        .subject_template
        .clone()
        .unwrap_or_else(|| courtside_notify::templating::DEFAULT_SUBJECT_TEMPLATE.to_string());
    let body = cli
        .body_template
        .clone()
        .unwrap_or_else(|| courtside_notify::templating::DEFAULT_BODY_TEMPLATE.to_string());
    AlertRenderer::new(subject, body).context("invalid alert template")
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    config.log_summary();

    let zone = config.zone();
    let occupancy_schedule = JobSchedule::parse(&config.occupancy.schedule)
        .context("invalid REFRESH_MACGYM_CRON")?;
    let events_schedule =
        JobSchedule::parse(&config.events.schedule).context("invalid REFRESH_EVENTS_CRON")?;
    let renderer = alert_renderer(&cli)?;

    if cli.check {
        info!(
            %zone,
            occupancy = %occupancy_schedule,
            events = %events_schedule,
            "configuration OK"
        );
        return Ok(());
    }

    // Store with alert channel and retention.
    let (sink, alerts) = ChannelAlertSink::channel();
    let mut store = Store::new(config.alert_debounce).with_alert_sink(Arc::new(sink));
    if let Some(horizon) = config.event_retention {
        store = store.with_retention(Box::new(EndedBefore::new(horizon)));
    }
    let store = Arc::new(store);

    // Alert delivery.
    let mut channels: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if let Some(url) = &config.alert_webhook_url {
        channels.push(Box::new(
            WebhookNotifier::new(url, HashMap::new()).context("invalid ALERT_WEBHOOK_URL")?,
        ));
    }
    let dispatcher = AlertDispatcher::new(channels).with_renderer(renderer);
    let dispatcher_handle = tokio::spawn(dispatcher.run(alerts));

    // Scheduled refresh.
    let http = HttpClient::new().context("failed to build HTTP client")?;
    let occupancy_job = OccupancyJob::new(
        config.occupancy.descriptor(),
        occupancy_schedule,
        occupancy_fetcher(config.occupancy.kind, &http, zone),
        config.occupancy.timeout,
    );
    let events_job = EventsJob::new(
        config.events.descriptor(),
        events_schedule,
        event_fetcher(config.events.kind, &http),
        config.events.timeout,
    );
    let scheduler = Scheduler::new(
        SchedulerConfig {
            max_startup_jitter: config.startup_jitter,
            zone,
        },
        store.clone(),
        occupancy_job,
        events_job,
    );
    scheduler.start()?;
    info!("courtside-worker running");

    if let Err(e) = shutdown_signal().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!(timeout = ?config.shutdown_timeout, "shutdown signal received");

    match tokio::time::timeout(config.shutdown_timeout, scheduler.stop()).await {
        Ok(()) => info!("scheduler stopped gracefully"),
        Err(_) => warn!("scheduler stop timed out, forcing shutdown"),
    }

    // The store owns the alert sender; releasing it closes the channel.
    drop(scheduler);
    drop(store);
    match tokio::time::timeout(config.shutdown_timeout, dispatcher_handle).await {
        Ok(Ok(processed)) => info!(processed, "alert dispatcher drained"),
        Ok(Err(e)) => warn!(error = %e, "alert dispatcher task failed"),
        Err(_) => warn!("alert dispatcher did not drain in time"),
    }

    info!("courtside-worker exited cleanly");
    Ok(())
}
