//! TripFlow - Group Trip Planning Coordinator
//!
//! CLI entry point: wires the store, classifier, transition engine,
//! sequencer, and nudge scheduler together and feeds them inbound
//! messages from stdin.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{CommandFactory, Parser};
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tripflow::classifier::create_classifier;
use tripflow::cli::{Cli, Command, get_log_path};
use tripflow::config::Config;
use tripflow::domain::InboundMessage;
use tripflow::events::{TransitionDedup, create_event_bus};
use tripflow::fsm::{StageTable, TransitionEngine};
use tripflow::orchestrator::{EntryActions, Notifier, Orchestrator, Responder, resolve_trip};
use tripflow::scheduler::NudgeScheduler;
use tripflow::sequencer::PerTripSequencer;
use tripflow::store::MemoryStore;

fn setup_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_path();
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir).context("Failed to create log directory")?;
    }

    // Write to the log file, not stdout: stdout is the conversation.
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

/// Prints replies and announcements to stdout so `tf run` reads like the
/// group chat it stands in for.
struct ConsoleOutbound;

#[async_trait]
impl Responder for ConsoleOutbound {
    async fn reply(&self, channel: &str, text: &str) -> Result<()> {
        println!("[{}] {}", channel, text);
        Ok(())
    }
}

#[async_trait]
impl Notifier for ConsoleOutbound {
    async fn notify(&self, channel: &str, text: &str) -> Result<()> {
        println!("[{}] {}", channel, text);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "TripFlow loaded config: provider={}, model={}",
        config.classifier.provider, config.classifier.model
    );

    match cli.command {
        Some(Command::Run) => cmd_run(&config).await,
        Some(Command::Config) => cmd_config(&config),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

/// Run the coordinator on stdin/stdout
async fn cmd_run(config: &Config) -> Result<()> {
    config.validate()?;

    let store = Arc::new(MemoryStore::new());
    let classifier = create_classifier(&config.classifier).context("Failed to create classifier")?;
    let bus = create_event_bus(config.events.capacity);
    let outbound = Arc::new(ConsoleOutbound);

    let actions = Arc::new(EntryActions::new(
        store.clone(),
        outbound.clone(),
        TransitionDedup::new(Duration::from_secs(config.events.dedup_window_secs)),
    ));
    actions.spawn_subscriber(&bus);

    let engine = Arc::new(TransitionEngine::new(
        store.clone(),
        StageTable::new(config.stages.clone()),
        bus.clone(),
        actions.clone(),
        config.stages.max_cascade,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        classifier,
        outbound.clone(),
        engine.clone(),
        config.classifier.confidence_threshold,
    ));
    let sequencer = PerTripSequencer::new(orchestrator);

    let scheduler = NudgeScheduler::new(store.clone(), engine, outbound, actions, bus, config.nudges.clone());
    tokio::spawn(scheduler.run());

    println!("TripFlow running. Send messages as `from|channel|body`, Ctrl+D to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(message) = parse_line(line) else {
                    println!("Expected `from|channel|body`, got: {}", line);
                    continue;
                };
                let trip = match resolve_trip(store.as_ref(), &message).await {
                    Ok(trip) => trip,
                    Err(e) => {
                        warn!(error = %e, "cmd_run: trip resolution failed");
                        continue;
                    }
                };
                sequencer.enqueue(&trip.id, message).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("cmd_run: interrupt received");
                break;
            }
        }
    }

    // Let the per-trip workers drain before the runtime goes away.
    while sequencer.active_trips().await > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    info!("cmd_run: shutting down");
    Ok(())
}

/// Parse `from|channel|body`; the body may itself contain `|`.
fn parse_line(line: &str) -> Option<InboundMessage> {
    let mut parts = line.splitn(3, '|');
    let from = parts.next()?.trim();
    let channel = parts.next()?.trim();
    let body = parts.next()?.trim();
    if from.is_empty() || channel.is_empty() {
        return None;
    }
    Some(InboundMessage::new(from, body, channel))
}
