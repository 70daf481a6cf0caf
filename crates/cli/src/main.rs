//! vigil: fall and vital-sign alert escalation.
//!
//! Wires the adapters (fall feed, vital store, modem, contact file) to the
//! escalation coordinator and runs until SIGINT/SIGTERM, or until the fall
//! feed ends when `--exit-on-feed-end` is set.

mod cli;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use vigil_core::ContactList;
use vigil_escalation::EscalationCoordinator;
use vigil_ingest::{HttpVitalSource, JsonLinesFeed, Monitor, MonitorExit};
use vigil_notify::ModemTransport;
use vigil_rules::ConditionEvaluator;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    vigil_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = args.config();
    config.validate().context("invalid configuration")?;

    if args.print_config {
        println!("{}", CliArgs::render_config(&config)?);
        return Ok(());
    }
    config.log_summary();

    // Adapter initialization; any failure here ends the process.
    let contacts = ContactList::load(&config.contacts.path).context("failed to load contact list")?;
    if contacts.is_empty() {
        warn!("contact list is empty, escalations will be recorded but nobody is called");
    }
    let transport = ModemTransport::open(&config.modem.device)
        .await
        .context("failed to open modem")?;
    let feed = JsonLinesFeed::open(&config.fall_feed.source)
        .await
        .context("failed to open fall feed")?;
    let vitals = HttpVitalSource::from_config(&config.vitals).context("failed to set up vital source")?;

    let coordinator = Arc::new(EscalationCoordinator::start(
        &config.escalation,
        contacts,
        Box::new(transport),
    ));

    let mut monitor = Monitor::new(ConditionEvaluator::new(config.thresholds), coordinator.clone())
        .exit_on_feed_end(args.exit_on_feed_end);
    match vitals {
        Some(source) => monitor = monitor.with_vitals(Arc::new(source), &config.vitals),
        None => info!("VITALS_URL not set, vital polling disabled"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = tokio::spawn(async move {
        os_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let exit = monitor.run(Box::new(feed), shutdown_rx).await;
    if exit == MonitorExit::FeedEnded {
        signals.abort();
    }
    wind_down(&coordinator, exit, os_signal()).await;

    let metrics = coordinator.metrics();
    info!(
        ?exit,
        submitted = metrics.submitted,
        escalated = metrics.escalated,
        suppressed = metrics.suppressed,
        runs = metrics.runs_completed,
        runs_fully_failed = metrics.runs_fully_failed,
        "vigil stopped"
    );
    Ok(())
}

/// Stop the coordinator for the way the monitor exited. After a feed end the
/// queued calls still go out, unless `interrupt` resolves first.
async fn wind_down(coordinator: &EscalationCoordinator, exit: MonitorExit, interrupt: impl Future<Output = ()>) {
    match exit {
        MonitorExit::Shutdown => coordinator.shutdown().await,
        MonitorExit::FeedEnded => {
            let drain = coordinator.drain();
            tokio::pin!(drain);
            tokio::select! {
                _ = &mut drain => {}
                _ = interrupt => {
                    info!("shutdown signal received while draining");
                    coordinator.request_shutdown();
                    drain.await;
                }
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to register signal handlers, falling back to ctrl-c");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, only feed end stops the process");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use vigil_core::config::EscalationConfig;
    use vigil_core::AlertCondition;
    use vigil_notify::mock::MockTransport;
    use vigil_notify::CallOutcome;

    fn coordinator(transport: MockTransport, contacts: &[&str]) -> EscalationCoordinator {
        EscalationCoordinator::start(
            &EscalationConfig::default(),
            ContactList::new(contacts.iter().map(|c| c.to_string()).collect()),
            Box::new(transport),
        )
    }

    fn fall() -> AlertCondition {
        AlertCondition::fall_detected(0.9, chrono::Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn feed_end_lets_queued_calls_finish() {
        let transport = MockTransport::acking();
        let log = transport.log();
        let coordinator = coordinator(transport, &["111", "222"]);
        coordinator.submit(fall()).unwrap();

        wind_down(&coordinator, MonitorExit::FeedEnded, std::future::pending()).await;

        assert_eq!(coordinator.metrics().runs_completed, 1);
        assert_eq!(coordinator.metrics().attempts_completed, 2);
        assert_eq!(log.dialed(), vec!["111", "222"]);
        assert!(coordinator.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn signal_during_drain_cuts_the_run_short() {
        let transport = MockTransport::acking();
        let log = transport.log();
        let coordinator = coordinator(transport, &["111", "222"]);
        let mut reports = coordinator.subscribe();
        coordinator.submit(fall()).unwrap();

        let start = tokio::time::Instant::now();
        wind_down(
            &coordinator,
            MonitorExit::FeedEnded,
            tokio::time::sleep(Duration::from_secs(2)),
        )
        .await;

        let report = reports.recv().await.unwrap();
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].outcome, Some(CallOutcome::Interrupted));
        assert_eq!(log.dialed(), vec!["111"]);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_exit_drops_pending_runs() {
        let transport = MockTransport::acking();
        let log = transport.log();
        let coordinator = coordinator(transport, &["111"]);

        wind_down(&coordinator, MonitorExit::Shutdown, std::future::pending()).await;

        assert!(coordinator.is_stopped());
        assert!(log.is_empty());
    }
}
