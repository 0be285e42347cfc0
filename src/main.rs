// src/main.rs - Node host: runs one rig node against the logging driver
use clap::Parser;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

use simons_stack::hardware::pins::ADDRESS_PIN;
use simons_stack::hardware::{LoggingDriver, ScriptedSampler, TracingReporter};
use simons_stack::{HostOptions, NodeAddress, NodeController, NodeIo, load_startup_config, rig, run_node};

/// Simons Stack node host
#[derive(Parser, Debug)]
#[command(name = "node-host", about = "Runs a Simons Stack node's output timing loop.")]
struct Cli {
    /// Path to the node TOML config
    #[arg(short, long, default_value = "node.toml")]
    config: String,

    /// Node address (overrides the config file)
    #[arg(short, long)]
    address: Option<u8>,

    /// Stop after this many control passes
    #[arg(long)]
    cycles: Option<u64>,

    /// Print the builtin rig tables as JSON and exit
    #[arg(long)]
    dump_tables: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // the configured level is not known yet, so loading logs at the default one
    let config = load_startup_config(&cli.config, tracing_subscriber::fmt().finish())?;

    tracing_subscriber::fmt()
        .with_max_level(config.logging.max_level()?)
        .init();

    let rig = rig::builtin()?;

    if cli.dump_tables {
        println!("{}", serde_json::to_string_pretty(rig.topology().as_ref())?);
        return Ok(());
    }

    tracing::info!("Starting Simons Stack node host");
    let address = cli.address.map(NodeAddress).unwrap_or_else(|| config.address());
    tracing::info!(
        address = address.0,
        master = address.is_master(),
        sense_pin = ADDRESS_PIN.number(),
        "Node address"
    );

    let started = Instant::now();
    let mut node = NodeController::new(
        &rig,
        address,
        config.node_settings(),
        NodeIo {
            driver: LoggingDriver::new(),
            sampler: ScriptedSampler::new(),
            reporter: TracingReporter::new(),
        },
        0,
    )?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
            let _ = shutdown_tx.send(());
        }
    });

    let options = HostOptions {
        poll_interval: Duration::from_millis(config.timing.poll_interval_ms),
        max_cycles: cli.cycles,
    };
    let passes = run_node(&mut node, options, started, shutdown_rx).await;
    tracing::info!(passes, "Node host stopped");

    println!("{}", serde_json::to_string_pretty(&node.snapshot())?);
    Ok(())
}
