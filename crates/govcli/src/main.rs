// crates/govcli/src/main.rs

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::GovernanceConfig;
use govcore::{AuditBus, AuditEvent, Clock, Run, RunId, SystemClock};
use govevents::{EventEngine, ExecutionContext, Location, LocationKind, ProcessModel};
use govorg::{ExecutionRequest, PermissionGate};
use govresource::{
    aggregate_usage, create_detailed_usage, AggregationMode, LimitsManager, ResourceTracker,
    ResourceUsage,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gov")]
#[command(about = "Workflow execution governance CLI", long_about = None)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a step may execute
    CheckPermission {
        /// Path to an execution request JSON file
        #[arg(short, long)]
        request: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Evaluate run limits against a run record
    CheckLimits {
        /// Path to a run JSON file
        #[arg(short, long)]
        run: PathBuf,

        /// Run start in epoch milliseconds (defaults to the run's startedAt)
        #[arg(long)]
        start_ms: Option<i64>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Apply usage deltas to a tracker bound to the configured allocation
    AddUsage {
        /// Path to a JSON array of usage deltas, applied in order
        #[arg(short, long)]
        usages: PathBuf,

        /// Run to charge (defaults to a fresh id)
        #[arg(long)]
        run_id: Option<RunId>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Aggregate child usages
    Aggregate {
        /// Path to a JSON array of usages
        #[arg(short, long)]
        usages: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Mode::Parallel)]
        mode: Mode,

        /// Own usage of the parent; prints a detailed breakdown
        #[arg(long)]
        own: Option<PathBuf>,
    },

    /// Resolve one intermediate event node
    Step {
        #[arg(short, long)]
        model: PathBuf,

        /// Execution context JSON (defaults to an empty context)
        #[arg(long)]
        context: Option<PathBuf>,

        #[arg(short, long)]
        node: String,

        /// Write the updated context back to the context file
        #[arg(long)]
        save: bool,
    },

    /// Re-invoke a waiting node on a timer tick until it moves on
    Simulate {
        #[arg(short, long)]
        model: PathBuf,

        #[arg(long)]
        context: Option<PathBuf>,

        #[arg(short, long)]
        node: String,

        #[arg(long, default_value_t = 1000)]
        tick_ms: u64,

        #[arg(long, default_value_t = 10)]
        max_ticks: u32,
    },

    /// Write the default configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "governance.json")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Parallel,
    Sequential,
}

impl From<Mode> for AggregationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Parallel => AggregationMode::Parallel,
            Mode::Sequential => AggregationMode::Sequential,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckPermission { request, config } => {
            let config = GovernanceConfig::load_or_default(config.as_deref())?;
            let bus = AuditBus::new(config.audit_buffer_size);
            let audit_task = spawn_audit_printer(&bus);
            check_permission(&request, config, &bus)?;
            drop(bus);
            audit_task.await?;
        }

        Commands::CheckLimits {
            run,
            start_ms,
            config,
        } => {
            let config = GovernanceConfig::load_or_default(config.as_deref())?;
            let bus = AuditBus::new(config.audit_buffer_size);
            let audit_task = spawn_audit_printer(&bus);
            check_limits(&run, start_ms, config, &bus)?;
            drop(bus);
            audit_task.await?;
        }

        Commands::AddUsage {
            usages,
            run_id,
            config,
        } => {
            let config = GovernanceConfig::load_or_default(config.as_deref())?;
            let bus = AuditBus::new(config.audit_buffer_size);
            let audit_task = spawn_audit_printer(&bus);
            add_usage(&usages, run_id, config, &bus)?;
            drop(bus);
            audit_task.await?;
        }

        Commands::Aggregate { usages, mode, own } => {
            aggregate(&usages, mode.into(), own.as_deref())?;
        }

        Commands::Step {
            model,
            context,
            node,
            save,
        } => {
            let bus = AuditBus::default();
            let audit_task = spawn_audit_printer(&bus);
            step(&model, context.as_deref(), &node, save, &bus)?;
            drop(bus);
            audit_task.await?;
        }

        Commands::Simulate {
            model,
            context,
            node,
            tick_ms,
            max_ticks,
        } => {
            simulate(&model, context.as_deref(), &node, tick_ms, max_ticks).await?;
        }

        Commands::Init { output } => {
            init(&output)?;
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print audit events to stderr until every emitter is dropped.
fn spawn_audit_printer(bus: &AuditBus) -> tokio::task::JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_audit(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Audit printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_audit(event: &AuditEvent) {
    match event {
        AuditEvent::PermissionDenied {
            run_id,
            step_id,
            reason,
            ..
        } => eprintln!("audit: denied step {} of run {}: {}", step_id, run_id, reason),
        AuditEvent::UsageRejected { run_id, reason, .. } => {
            eprintln!("audit: usage rejected for run {}: {}", run_id, reason)
        }
        AuditEvent::LimitBreached {
            run_id,
            reason,
            action,
            ..
        } => eprintln!("audit: run {} breached a limit ({}): {}", run_id, action, reason),
        AuditEvent::EventThrown {
            node_id,
            event_type,
            reference,
            ..
        } => eprintln!(
            "audit: node {} threw {} {}",
            node_id,
            event_type,
            reference.as_deref().unwrap_or("")
        ),
    }
}

fn check_permission(request: &Path, config: GovernanceConfig, bus: &AuditBus) -> Result<()> {
    let request: ExecutionRequest = read_json(request)?;
    let gate = PermissionGate::new(config.org).with_audit(bus.emitter());
    let decision = gate.validate_execution(&request);
    print_json(&decision)
}

fn check_limits(
    run: &Path,
    start_ms: Option<i64>,
    config: GovernanceConfig,
    bus: &AuditBus,
) -> Result<()> {
    let mut record: Run = read_json(run)?;
    let start_ms = start_ms
        .or_else(|| record.started_at.map(|t| t.timestamp_millis()))
        .unwrap_or_else(|| SystemClock.now_ms());

    let manager = LimitsManager::new().with_audit(bus.emitter());
    match manager.check_limits(&mut record, &config.limits, start_ms) {
        Some(breach) => {
            println!("Limit breached: {}", breach.reason);
            println!("Run {} is now {}", record.id, record.status);
        }
        None => println!("Run {} is within its limits", record.id),
    }
    Ok(())
}

fn add_usage(
    usages: &Path,
    run_id: Option<RunId>,
    config: GovernanceConfig,
    bus: &AuditBus,
) -> Result<()> {
    let deltas: Vec<ResourceUsage> = read_json(usages)?;
    let run_id = run_id.unwrap_or_else(RunId::new_v4);
    let tracker = ResourceTracker::new(run_id, config.allocation).with_audit(bus.emitter());

    for (i, delta) in deltas.iter().enumerate() {
        match tracker.add_usage(delta) {
            Ok(total) => println!(
                "Delta {} accepted: {} credits, {} steps used",
                i + 1,
                total.credits_used,
                total.steps_executed
            ),
            Err(rejection) => println!("Delta {} rejected: {}", i + 1, rejection),
        }
    }

    println!("Remaining allocation for run {}:", run_id);
    print_json(&tracker.get_remaining_allocation())
}

fn aggregate(usages: &Path, mode: AggregationMode, own: Option<&Path>) -> Result<()> {
    let children: Vec<ResourceUsage> = read_json(usages)?;
    match own {
        Some(own) => {
            let own: ResourceUsage = read_json(own)?;
            print_json(&create_detailed_usage(&own, &children))
        }
        None => print_json(&aggregate_usage(&children, mode)),
    }
}

fn load_context(path: Option<&Path>) -> Result<ExecutionContext> {
    match path {
        Some(path) => read_json(path),
        None => Ok(ExecutionContext::new()),
    }
}

fn step(
    model: &Path,
    context: Option<&Path>,
    node: &str,
    save: bool,
    bus: &AuditBus,
) -> Result<()> {
    let model: ProcessModel = read_json(model)?;
    let ctx = load_context(context)?;
    let engine = EventEngine::new().with_audit(bus.emitter());
    let location = Location::new(node, LocationKind::IntermediateEvent);

    let outcome = engine.process_intermediate_event(&model, node, &location, &ctx)?;
    print_json(&outcome)?;

    if save {
        let path = context.context("--save needs --context")?;
        std::fs::write(path, serde_json::to_string_pretty(&outcome.updated_context)?)?;
        tracing::info!(path = %path.display(), "Context saved");
    }
    Ok(())
}

async fn simulate(
    model: &Path,
    context: Option<&Path>,
    node: &str,
    tick_ms: u64,
    max_ticks: u32,
) -> Result<()> {
    let model: ProcessModel = read_json(model)?;
    let mut ctx = load_context(context)?;
    let engine = EventEngine::new();
    let location = Location::new(node, LocationKind::IntermediateEvent);

    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    for tick in 1..=max_ticks {
        ticker.tick().await;
        let outcome = engine.process_intermediate_event(&model, node, &location, &ctx)?;
        if !outcome.is_waiting() {
            println!("Node {} moved on after {} tick(s)", node, tick);
            return print_json(&outcome);
        }
        tracing::debug!(tick, node, "Still waiting");
        ctx = outcome.updated_context;
    }

    println!("Node {} still waiting after {} tick(s)", node, max_ticks);
    let pending = engine.get_pending_intermediate_events(&ctx, None);
    print_json(&pending)
}

fn init(output: &Path) -> Result<()> {
    let config = GovernanceConfig::default();
    std::fs::write(output, serde_json::to_string_pretty(&config)?)?;

    println!("Created default configuration: {}", output.display());
    println!();
    println!("Use it with:");
    println!("  gov check-permission --request request.json --config {}", output.display());
    println!("  gov add-usage --usages deltas.json --config {}", output.display());
    Ok(())
}
