//! Adaptive Learning Engine
//!
//! Runs the learning engine as a standalone service:
//! - Replays JSON-lines event files into the inbound queue
//! - Runs the periodic learning passes
//! - Writes a state snapshot on shutdown

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};

use learning_engine::config::AppConfig;
use learning_engine::events::{inbound_channel, spawn_event_handler, EventBus, InboundSender};
use learning_engine::learning::{EngineSnapshot, LearningEngine, LearningScheduler, ScheduledJob};
use learning_engine::telemetry::{init_logging, init_metrics};
use learning_engine::{InboundEvent, LearningEvent};

const INBOUND_QUEUE_CAPACITY: usize = 4_096;
const EVENT_BUS_CAPACITY: usize = 1_024;

/// Adaptive learning engine for trading outcomes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-lines file of inbound events to replay at startup
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Snapshot to restore before processing events
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Write a JSON snapshot of the learned state on shutdown
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Run every learning pass once after the replay and exit
    #[arg(long)]
    once: bool,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(level) = args.log_level.clone() {
        config.telemetry.log_level = level;
    }
    config.validate()?;

    let _log_guard = init_logging(&config.telemetry)?;
    info!("Starting learning engine v{}", env!("CARGO_PKG_VERSION"));

    if config.telemetry.enable_metrics {
        init_metrics(config.telemetry.metrics_port)?;
    }

    let bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
    let _log_handler = spawn_event_handler(&bus, "outbound-log", log_outbound);

    let engine = Arc::new(LearningEngine::new(config.learning.clone(), bus.clone()));
    if let Some(path) = &args.restore {
        engine.restore(read_snapshot(path)?);
    }

    let (tx, rx) = inbound_channel(INBOUND_QUEUE_CAPACITY);
    let consumer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_inbound(rx).await })
    };

    if let Some(path) = &args.replay {
        let queued = replay_file(path, &tx).await?;
        info!("Queued {} events from {:?}", queued, path);
    }

    let scheduler = LearningScheduler::new(config.scheduler.clone(), engine.clone());
    if args.once {
        drop(tx);
        consumer.await.context("Inbound consumer failed")?;
        for job in ScheduledJob::ALL {
            job.run(&engine);
        }
    } else {
        scheduler.start();
        info!("Learning engine running, press Ctrl-C to stop");

        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, gracefully stopping..."),
            Err(err) => error!("Error listening for shutdown signal: {}", err),
        }
        scheduler.stop();
        drop(tx);
        consumer.await.context("Inbound consumer failed")?;
    }

    let dashboard = engine.dashboard();
    println!("{}", serde_json::to_string_pretty(&dashboard)?);

    if let Some(path) = &args.snapshot_out {
        write_snapshot(path, &engine.export_snapshot())?;
    }

    info!("Learning engine stopped");
    Ok(())
}

fn log_outbound(event: LearningEvent) {
    match &event {
        LearningEvent::PatternsDetected { count, .. } => info!("{}: {} patterns", event.name(), count),
        LearningEvent::MetricsUpdated { metrics } => info!(
            "{}: success {:.1}% over {} trades",
            event.name(),
            metrics.success_rate * 100.0,
            metrics.total_trades
        ),
        LearningEvent::FeedbackProcessed { feedback } => {
            info!("{}: {} ({:?})", event.name(), feedback.id, feedback.impact)
        }
        LearningEvent::OutcomeProcessed { outcome, insights } => {
            debug!("{}: {} with {} insights", event.name(), outcome.trade_id, insights.len());
            for insight in insights {
                info!("[{:?}] {}", insight.level, insight.message);
            }
        }
    }
}

/// Queue every decodable line; undecodable lines are logged and skipped
async fn replay_file(path: &Path, tx: &InboundSender) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file: {:?}", path))?;

    let mut queued = 0;
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match InboundEvent::from_json(line) {
            Ok(event) => {
                if !tx.send(event).await {
                    warn!("Inbound queue closed, stopping replay at line {}", line_no + 1);
                    break;
                }
                queued += 1;
            }
            Err(err) => warn!("Skipping line {}: {}", line_no + 1, err),
        }
    }
    Ok(queued)
}

fn read_snapshot(path: &Path) -> Result<EngineSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid snapshot: {:?}", path))
}

fn write_snapshot(path: &Path, snapshot: &EngineSnapshot) -> Result<()> {
    let content = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write snapshot: {:?}", path))?;
    info!("Snapshot written to {:?}", path);
    Ok(())
}
