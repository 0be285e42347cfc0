// src/host.rs - Async control loop that drives a node controller off a tokio interval
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use crate::Millis;
use crate::hardware::{ErrorReporter, InputSampler, OutputDriver};
use crate::node::NodeController;

#[derive(Debug, Clone, Copy)]
pub struct HostOptions {
    pub poll_interval: Duration,
    /// Stop after this many passes; `None` runs until shutdown.
    pub max_cycles: Option<u64>,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            max_cycles: None,
        }
    }
}

/// Runs `node` once per poll interval until shutdown is signalled or the
/// cycle limit is reached. `started` is the instant the controller treats as
/// time zero. Returns the number of passes run.
pub async fn run_node<D, S, R>(
    node: &mut NodeController<D, S, R>,
    options: HostOptions,
    started: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> u64
where
    D: OutputDriver,
    S: InputSampler,
    R: ErrorReporter,
{
    let mut interval = tokio::time::interval(options.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut passes = 0u64;

    loop {
        if options.max_cycles.is_some_and(|max| passes >= max) {
            tracing::info!(passes, "Cycle limit reached");
            break;
        }
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Node control loop shutting down");
                break;
            }
            _ = interval.tick() => {
                let now = started.elapsed().as_millis() as Millis;
                node.run_cycle(now);
                passes += 1;
                tracing::trace!(now, passes, "Control pass");
            }
        }
    }
    passes
}
