// src/node.rs - Per-node control loop over every chain the node drives
use std::sync::Arc;

use serde::Serialize;

use crate::hardware::pins::AnalogPin;
use crate::hardware::{ErrorKind, ErrorReporter, InputSampler, OutputDriver};
use crate::pattern::PatternStore;
use crate::player::{InputReading, PatternPlayer, drive_mask};
use crate::rig::{NodeAddress, Rig, RigError};
use crate::timing::{Envelope, Phase};
use crate::topology::{ChainTypeId, EMPTY_ID, InputType, NodeType, OutputTypeId, Topology};
use crate::{MAX_OUTPUTS_PER_REGISTER, Millis};

/// Per-node overrides of the node type's timing defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeSettings {
    pub time_delta_override: Option<u32>,
    pub timeout_override: Option<u32>,
}

/// The collaborators a node controller writes to and reads from.
#[derive(Debug)]
pub struct NodeIo<D, S, R> {
    pub driver: D,
    pub sampler: S,
    pub reporter: R,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSnapshot {
    pub position: usize,
    pub output_type_id: OutputTypeId,
    pub phase: Phase,
    pub level: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainSnapshot {
    pub chain_type_id: ChainTypeId,
    pub slot: usize,
    pub sense_pin: Option<AnalogPin>,
    pub valid: bool,
    pub frame: Option<usize>,
    pub overlay_mask: u32,
    /// Set after a timeout until the chain input is seen released.
    pub overlay_suppressed: bool,
    pub outputs: Vec<OutputSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub address: NodeAddress,
    pub node_type: u8,
    pub reactor: bool,
    pub cycles: u64,
    pub chains: Vec<ChainSnapshot>,
}

#[derive(Debug)]
struct ChainRuntime {
    chain_type_id: ChainTypeId,
    input: InputType,
    /// One slot per register bit, register-major; `None` where nothing is wired.
    outputs: Vec<Option<Envelope>>,
    player: PatternPlayer,
    last_external: u32,
}

#[derive(Debug)]
enum ChainSlot {
    Ready(ChainRuntime),
    /// Chain id 0: keeps its pattern column but drives nothing.
    Empty,
    Invalid {
        chain_type_id: ChainTypeId,
        message: &'static str,
    },
}

pub struct NodeController<D, S, R> {
    address: NodeAddress,
    node_type: NodeType,
    patterns: Arc<PatternStore>,
    time_delta: Millis,
    timeout: Millis,
    chains: Vec<ChainSlot>,
    io: NodeIo<D, S, R>,
    cycles: u64,
}

impl<D, S, R> NodeController<D, S, R>
where
    D: OutputDriver,
    S: InputSampler,
    R: ErrorReporter,
{
    /// Builds the controller for the node type assigned to `address`.
    pub fn new(
        rig: &Rig,
        address: NodeAddress,
        settings: NodeSettings,
        io: NodeIo<D, S, R>,
        now: Millis,
    ) -> Result<Self, RigError> {
        let node_type = rig.node_type_for(address)?.clone();
        Ok(Self::for_node_type(
            rig.topology(),
            rig.patterns().clone(),
            address,
            node_type,
            settings,
            io,
            now,
        ))
    }

    pub fn for_node_type(
        topology: &Topology,
        patterns: Arc<PatternStore>,
        address: NodeAddress,
        node_type: NodeType,
        settings: NodeSettings,
        io: NodeIo<D, S, R>,
        now: Millis,
    ) -> Self {
        let time_delta = Millis::from(settings.time_delta_override.unwrap_or(node_type.default_time_delta));
        let timeout = Millis::from(settings.timeout_override.unwrap_or(node_type.default_timeout));

        let chains: Vec<ChainSlot> = node_type
            .chain_type_ids
            .iter()
            .enumerate()
            .map(|(slot, &chain_type_id)| {
                if chain_type_id == EMPTY_ID {
                    return ChainSlot::Empty;
                }
                match plan_chain(topology, chain_type_id, slot, time_delta, now) {
                    Ok(chain) => ChainSlot::Ready(chain),
                    Err(message) => {
                        tracing::warn!(chain_type_id, slot, "Chain disabled: {}", message);
                        ChainSlot::Invalid { chain_type_id, message }
                    }
                }
            })
            .collect();

        tracing::info!(
            address = address.0,
            node_type = node_type.id,
            chains = chains.len(),
            reactor = node_type.do_node_reactor,
            time_delta,
            timeout,
            "Node controller ready"
        );

        Self {
            address,
            node_type,
            patterns,
            time_delta,
            timeout,
            chains,
            io,
            cycles: 0,
        }
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn time_delta(&self) -> Millis {
        self.time_delta
    }

    pub fn timeout(&self) -> Millis {
        self.timeout
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn driver(&self) -> &D {
        &self.io.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.io.driver
    }

    pub fn sampler_mut(&mut self) -> &mut S {
        &mut self.io.sampler
    }

    pub fn reporter(&self) -> &R {
        &self.io.reporter
    }

    pub fn into_io(self) -> NodeIo<D, S, R> {
        self.io
    }

    /// One pass of the control loop. Reactor nodes sample inputs and play the
    /// pattern; follower nodes only carry running envelopes forward.
    pub fn run_cycle(&mut self, now: Millis) {
        if self.node_type.do_node_reactor {
            let NodeIo { sampler, reporter, .. } = &mut self.io;
            for slot in &mut self.chains {
                let ChainSlot::Ready(chain) = slot else { continue };
                let reading = match sampler.read_raw(chain.input.id) {
                    Ok(raw) => InputReading::from_level(chain.input.is_asserted(raw)),
                    Err(err) => {
                        reporter.report(err.into(), chain.chain_type_id, "chain input unreadable");
                        InputReading::Faulted
                    }
                };
                chain.player.tick(now, reading, &self.patterns, &mut chain.outputs);
            }
        }
        self.service_outputs(now);
    }

    /// Follower entry point: applies output states pushed from elsewhere,
    /// one bitmask per chain slot, then runs the output pass. Bits that turned
    /// on since the last push start a cycle; bits that turned off fall.
    pub fn apply_external(&mut self, now: Millis, masks: &[u32]) {
        for (slot, &mask) in masks.iter().enumerate() {
            match self.chains.get_mut(slot) {
                Some(ChainSlot::Ready(chain)) => {
                    let changed = mask ^ chain.last_external;
                    drive_mask(now, mask & changed, !mask & changed, &mut chain.outputs);
                    chain.last_external = mask;
                }
                // reported by the output pass
                Some(ChainSlot::Invalid { .. }) | Some(ChainSlot::Empty) => {}
                None => self.io.reporter.report(
                    ErrorKind::Program,
                    slot as u8,
                    "external state for a chain this node does not have",
                ),
            }
        }
        self.service_outputs(now);
    }

    /// Drops every output to idle and restarts pattern playback.
    pub fn reset(&mut self, now: Millis) {
        tracing::info!(address = self.address.0, "Resetting node outputs");
        for slot in &mut self.chains {
            if let ChainSlot::Ready(chain) = slot {
                chain.outputs.iter_mut().flatten().for_each(Envelope::force_idle);
                chain.player.restart(now);
                chain.last_external = 0;
            }
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let chains = self
            .chains
            .iter()
            .enumerate()
            .map(|(slot, chain)| match chain {
                ChainSlot::Ready(chain) => ChainSnapshot {
                    chain_type_id: chain.chain_type_id,
                    slot,
                    sense_pin: AnalogPin::for_chain_slot(slot),
                    valid: true,
                    frame: chain.player.current_frame(),
                    overlay_mask: chain.player.overlay_mask(),
                    overlay_suppressed: chain.player.is_suppressed(),
                    outputs: chain
                        .outputs
                        .iter()
                        .enumerate()
                        .filter_map(|(position, envelope)| {
                            envelope.as_ref().map(|e| OutputSnapshot {
                                position,
                                output_type_id: e.output_type_id(),
                                phase: e.phase(),
                                level: e.level(),
                            })
                        })
                        .collect(),
                },
                ChainSlot::Invalid { chain_type_id, .. } => ChainSnapshot {
                    chain_type_id: *chain_type_id,
                    slot,
                    sense_pin: AnalogPin::for_chain_slot(slot),
                    valid: false,
                    frame: None,
                    overlay_mask: 0,
                    overlay_suppressed: false,
                    outputs: Vec::new(),
                },
                ChainSlot::Empty => ChainSnapshot {
                    chain_type_id: EMPTY_ID,
                    slot,
                    sense_pin: AnalogPin::for_chain_slot(slot),
                    valid: true,
                    frame: None,
                    overlay_mask: 0,
                    overlay_suppressed: false,
                    outputs: Vec::new(),
                },
            })
            .collect();

        NodeSnapshot {
            address: self.address,
            node_type: self.node_type.id,
            reactor: self.node_type.do_node_reactor,
            cycles: self.cycles,
            chains,
        }
    }

    /// Advances every envelope, enforces the timeout and writes levels out,
    /// chains in node order and outputs low bit first.
    fn service_outputs(&mut self, now: Millis) {
        self.cycles += 1;
        let timeout = self.timeout;
        let NodeIo { driver, reporter, .. } = &mut self.io;

        for slot in &mut self.chains {
            let chain = match slot {
                ChainSlot::Ready(chain) => chain,
                ChainSlot::Invalid { chain_type_id, message } => {
                    reporter.report(ErrorKind::Program, *chain_type_id, message);
                    continue;
                }
                ChainSlot::Empty => continue,
            };

            // overlay holds are bounded from the assertion edge, not per cycle
            let mut timed_out = timeout > 0
                && chain
                    .player
                    .overlay_held_since()
                    .is_some_and(|since| now.saturating_sub(since) > timeout);
            for envelope in chain.outputs.iter_mut().flatten() {
                envelope.advance(now);
                if timeout > 0
                    && envelope
                        .busy_since()
                        .is_some_and(|since| now.saturating_sub(since) > timeout)
                {
                    timed_out = true;
                }
            }

            if timed_out {
                tracing::debug!(chain_type_id = chain.chain_type_id, now, "Chain timed out, forcing idle");
                chain.outputs.iter_mut().flatten().for_each(Envelope::force_idle);
                chain.player.restart(now);
                chain.player.suppress_overlay_until_release();
                reporter.report(ErrorKind::Cycle, chain.chain_type_id, "chain exceeded its timeout");
            }

            for (position, envelope) in chain.outputs.iter().enumerate() {
                let Some(envelope) = envelope else { continue };
                let register = (position / MAX_OUTPUTS_PER_REGISTER) as u8;
                let output = (position % MAX_OUTPUTS_PER_REGISTER) as u8;
                if let Err(e) = driver.set_level(chain.chain_type_id, register, output, envelope.level()) {
                    tracing::debug!(chain_type_id = chain.chain_type_id, register, output, "Driver error: {}", e);
                    reporter.report(ErrorKind::Default, chain.chain_type_id, "output driver rejected level");
                }
            }
        }
    }
}

fn plan_chain(
    topology: &Topology,
    chain_type_id: ChainTypeId,
    slot: usize,
    time_delta: Millis,
    now: Millis,
) -> Result<ChainRuntime, &'static str> {
    let chain = topology
        .chain_type(chain_type_id)
        .ok_or("chain type not in tables")?;
    let input = *topology
        .input_type(chain.input_type_id)
        .ok_or("input type not in tables")?;

    let mut outputs = Vec::with_capacity(chain.register_type_ids.len() * MAX_OUTPUTS_PER_REGISTER);
    for &register_type_id in &chain.register_type_ids {
        let mut bits: Vec<Option<Envelope>> = Vec::with_capacity(MAX_OUTPUTS_PER_REGISTER);
        if register_type_id != EMPTY_ID {
            let register = topology
                .register_type(register_type_id)
                .ok_or("register type not in tables")?;
            for &output_type_id in &register.output_type_ids {
                if output_type_id == EMPTY_ID {
                    bits.push(None);
                    continue;
                }
                let output = topology
                    .output_type(output_type_id)
                    .ok_or("output type not in tables")?;
                bits.push(Some(Envelope::new(output)));
            }
        }
        bits.resize_with(MAX_OUTPUTS_PER_REGISTER, || None);
        outputs.extend(bits);
    }

    Ok(ChainRuntime {
        chain_type_id,
        input,
        outputs,
        player: PatternPlayer::new(slot, chain.do_overlay, time_delta, now),
        last_external: 0,
    })
}
