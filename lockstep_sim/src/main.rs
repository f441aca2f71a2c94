//! Lockstep Simulator CLI
//!
//! Runs in-process lockstep sessions, or (with `zmq-transport`) a standalone
//! coordinator and vehicle clients over ZeroMQ.

use clap::{Args, Parser, Subcommand};
use lockstep_sim::scenarios::ScenarioId;
use lockstep_sim::{SessionResult, SessionRunner};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Lockstep coordinator simulator
#[derive(Parser, Debug)]
#[command(name = "lockstep-sim")]
#[command(about = "Run barrier-synchronized lockstep sessions", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    sim: SimArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run in-process sessions (the default)
    Sim(SimArgs),

    /// Bind a ZeroMQ coordinator and run until Ctrl-C
    #[cfg(feature = "zmq-transport")]
    Coordinator(remote::CoordinatorArgs),

    /// Connect one vehicle client to a ZeroMQ coordinator
    #[cfg(feature = "zmq-transport")]
    Client(remote::ClientArgs),
}

/// In-process session options (the default command).
#[derive(Args, Debug)]
struct SimArgs {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of simulation clients
    #[arg(short, long, default_value = "3")]
    clients: usize,

    /// Steps each client reports
    #[arg(long, default_value = "20")]
    steps: u64,

    /// Scenario to run (lockstep, late_joiner, multi_part, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Coordinator poll timeout in milliseconds
    #[arg(long, default_value = "100")]
    poll_timeout_ms: u64,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export relayed telemetry to a JSON file
    #[arg(long)]
    export: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        None => run_sim(cli.sim).await,
        Some(Command::Sim(args)) => run_sim(args).await,
        #[cfg(feature = "zmq-transport")]
        Some(Command::Coordinator(args)) => remote::run_coordinator(args).await,
        #[cfg(feature = "zmq-transport")]
        Some(Command::Client(args)) => remote::run_client(args).await,
    }
}

async fn run_sim(args: SimArgs) -> anyhow::Result<()> {
    if !args.json {
        info!("Lockstep Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args
            .scenario
            .parse()
            .map_err(|e| anyhow::anyhow!("{} (available: lockstep, late_joiner, multi_part, all)", e))?]
    };

    if args.export.is_some() && scenarios.len() > 1 {
        anyhow::bail!("--export only supports a single scenario, not 'all'");
    }

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let runner = SessionRunner::new(seed, args.clients)
        .with_steps(args.steps)
        .with_poll_timeout(Duration::from_millis(args.poll_timeout_ms));

    let mut results: Vec<SessionResult> = Vec::new();
    for scenario in scenarios {
        let result = runner.run(scenario).await?;

        if !args.json {
            if result.passed {
                info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        if let Some(path) = &args.export {
            result.export.write_to_file(path)?;
            info!("Exported {} frames to {}", result.export.frames.len(), path);
        }

        results.push(result);
    }

    let total = results.len();
    let failed = results.iter().filter(|result| !result.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "steps": r.steps_completed,
                    "stats": r.stats,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed, total);
        }
    }

    // Exit with proper code for CI
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "zmq-transport")]
mod remote {
    use clap::Args;
    use lockstep_core::{Coordinator, CoordinatorConfig};
    use lockstep_env::{shutdown_channel, Payload, ShutdownTrigger, TransportConfig, ZmqBinding, ZmqConnector};
    use lockstep_sim::{drive_client, ClientPlan};
    use std::time::Duration;
    use tracing::{debug, info};

    #[derive(Args, Debug)]
    pub struct CoordinatorArgs {
        /// Number of clients the barrier waits for
        #[arg(short, long, default_value = "2")]
        clients: usize,

        #[arg(long, default_value = "14550")]
        request_port: u16,

        #[arg(long, default_value = "14551")]
        broadcast_port: u16,

        /// Poll timeout in milliseconds
        #[arg(long, default_value = "1500")]
        poll_timeout_ms: u64,
    }

    #[derive(Args, Debug)]
    pub struct ClientArgs {
        /// Coordinator host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "14550")]
        request_port: u16,

        #[arg(long, default_value = "14551")]
        broadcast_port: u16,

        /// Vehicle name
        #[arg(short, long)]
        name: Option<String>,

        /// Client index (seeds the vehicle together with --seed)
        #[arg(short, long, default_value = "0")]
        index: usize,

        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Steps to run (runs until Ctrl-C when omitted)
        #[arg(long)]
        steps: Option<u64>,

        /// Simulated seconds per step
        #[arg(long, default_value = "0.1")]
        dt: f64,

        /// Maximum extra intent parts per report
        #[arg(long, default_value = "0")]
        extra_parts: usize,
    }

    fn trigger_on_ctrl_c(trigger: ShutdownTrigger) {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                trigger.trigger();
            }
        });
    }

    pub async fn run_coordinator(args: CoordinatorArgs) -> anyhow::Result<()> {
        let transport = TransportConfig::default().with_ports(args.request_port, args.broadcast_port);
        let (publisher, replier) = ZmqBinding::bind(&transport)?;

        let config = CoordinatorConfig::new(args.clients)
            .with_poll_timeout(Duration::from_millis(args.poll_timeout_ms));
        let mut coordinator = Coordinator::new(config, publisher, replier)?;
        info!(
            request_port = transport.request_port,
            broadcast_port = transport.broadcast_port,
            "Coordinator bound"
        );

        let (trigger, signal) = shutdown_channel();
        trigger_on_ctrl_c(trigger);

        let stats = coordinator.run(signal).await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }

    pub async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
        let transport = TransportConfig::default()
            .with_host(args.host)
            .with_ports(args.request_port, args.broadcast_port);
        let connector = ZmqConnector::new(transport);

        let mut plan = ClientPlan::new(args.index, args.seed)
            .with_steps(args.steps)
            .with_dt(args.dt)
            .with_extra_parts(args.extra_parts);
        if let Some(name) = args.name {
            plan = plan.with_name(name);
        }

        let (trigger, signal) = shutdown_channel();
        trigger_on_ctrl_c(trigger);

        let observer = |step: u64, payload: &Payload| {
            debug!(step, telemetry = %payload.as_value(), "Telemetry");
        };
        let outcome = drive_client(&connector, &plan, observer, signal).await?;
        info!(
            "{} finished after {} steps",
            outcome.name,
            outcome.steps_completed()
        );
        Ok(())
    }
}
