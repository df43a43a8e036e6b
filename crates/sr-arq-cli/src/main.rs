mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use config::FileConfig;
use sr_arq_abstract::ArqConfig;
use sr_arq_net::{DEFAULT_PORT, Endpoint, RunOptions};
use sr_arq_simulator::{NodeId, SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective-Repeat ARQ simulator and UDP endpoint")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a transfer on the virtual-time simulator.
    Sim(SimArgs),
    /// Run one endpoint over a real UDP socket.
    Udp(UdpArgs),
}

/// Flags that override values from `--config`.
#[derive(Args, Debug, Default)]
struct ArqOverrides {
    #[arg(long)]
    window_size: Option<u32>,
    #[arg(long)]
    total_packets: Option<u32>,
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl ArqOverrides {
    fn apply_to(&self, arq: &mut ArqConfig) {
        if let Some(v) = self.window_size {
            arq.window_size = v;
        }
        if let Some(v) = self.total_packets {
            arq.total_packets = v;
        }
        if let Some(v) = self.timeout_ms {
            arq.timeout_ms = v;
        }
    }
}

#[derive(Args, Debug)]
struct SimArgs {
    /// TOML file with `[arq]` and `[sim]` sections.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a scenario and check its assertions.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    #[command(flatten)]
    arq: ArqOverrides,

    #[arg(long)]
    loss_rate: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct UdpArgs {
    /// Local address to bind.
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
    bind: SocketAddr,

    /// Address of the remote endpoint.
    #[arg(long)]
    peer: SocketAddr,

    /// TOML file with an `[arq]` section.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    arq: ArqOverrides,

    /// Stop after this many milliseconds even if packets are outstanding.
    #[arg(long, default_value_t = 30_000)]
    run_for_ms: u64,

    /// Only acknowledge; never send the stream.
    #[arg(long, default_value_t = false)]
    no_start: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    info!("sr-arq starting…");

    match cli.command {
        Command::Sim(args) => run_sim(args),
        Command::Udp(args) => run_udp(args),
    }
}

fn run_sim(args: SimArgs) -> Result<()> {
    let FileConfig { mut arq, mut sim } = FileConfig::load(args.config.as_deref())?;
    args.arq.apply_to(&mut arq);
    if let Some(loss_rate) = args.loss_rate {
        sim.loss_rate = loss_rate;
    }
    if let Some(seed) = args.seed {
        sim.seed = seed;
    }

    let report = if let Some(path) = &args.scenario {
        let scenario = scenario_runner::load_scenario(path)?;
        scenario_runner::run_loaded_scenario(&scenario, arq, sim)?
    } else {
        let mut simulator = Simulator::new(arq, sim).context("Invalid configuration")?;
        info!("Starting headless simulation…");
        simulator.run_until_complete();
        info!("Simulation complete.");
        simulator.export_report()
    };

    print_summary(&report);
    if let Some(trace_path) = &args.trace_out {
        write_json(trace_path, &report)?;
    }
    Ok(())
}

fn print_summary(report: &SimulationReport) {
    info!("Virtual time elapsed: {} ms", report.duration_ms);
    for node in [NodeId::Node0, NodeId::Node1] {
        let Some(r) = report.node(node) else {
            continue;
        };
        let s = &r.engine.sender;
        info!(
            "{}: drained={} (at {:?}) sent={} retransmitted={} acks_sent={} link dropped {}/{}",
            node,
            r.engine.drained,
            r.drained_at,
            s.transmissions,
            s.retransmissions,
            r.engine.receiver.acks_sent,
            r.link.dropped,
            r.link.sent
        );
    }
}

fn run_udp(args: UdpArgs) -> Result<()> {
    let FileConfig { mut arq, .. } = FileConfig::load(args.config.as_deref())?;
    args.arq.apply_to(&mut arq);
    let options = RunOptions {
        run_for: Duration::from_millis(args.run_for_ms),
        start: !args.no_start,
        stop_when_drained: false,
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let snapshot = runtime.block_on(async {
        let endpoint = Endpoint::bind(args.bind, arq).await?;
        endpoint.run(args.peer, options).await
    })?;

    info!(
        "Endpoint finished: drained={} base={} retransmitted={} acks_sent={}",
        snapshot.drained, snapshot.base, snapshot.sender.retransmissions, snapshot.receiver.acks_sent
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to serialize endpoint snapshot")?
    );
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    info!("Trace written to {}", path.display());
    Ok(())
}
