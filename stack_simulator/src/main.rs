//! CLI entry point for the stack simulator: runs a scenario and writes the level trace as CSV.

use std::fs::File;
use std::path::Path;

use clap::Parser;

use simons_stack::rig;
use stack_simulator::{Scenario, SimError, Simulator, TraceWriter};

/// Stack Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "stack-simulator", about = "Replays a scenario against one rig node and traces output levels.")]
struct Cli {
    /// Path to a scenario TOML file
    #[arg(short, long, default_value = "stack_simulator/scenarios/demo.toml")]
    scenario: String,

    /// CSV output path (overrides the scenario)
    #[arg(short, long)]
    output: Option<String>,

    /// Log every input change and push
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), SimError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    let scenario = Scenario::load(&cli.scenario)?;
    let output = cli.output.unwrap_or_else(|| scenario.simulation.output.clone());
    if let Some(dir) = Path::new(&output).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let rig = rig::builtin()?;
    let mut simulator = Simulator::new(&rig, &scenario)?;
    let mut sink = TraceWriter::new(File::create(&output)?);
    let report = simulator.run(&mut sink)?;
    sink.finish()?;

    tracing::info!(
        steps = report.steps,
        level_changes = report.level_changes,
        random_triggers = report.random_triggers,
        "Simulation complete, trace written to {}",
        output
    );
    for (kind, count) in &report.errors {
        tracing::warn!(code = kind.code(), "{:?} reported {} times", kind, count);
    }
    Ok(())
}
