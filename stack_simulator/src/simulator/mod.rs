pub mod event_queue;

use std::collections::HashMap;
use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use simons_stack::hardware::{RecordingReporter, ScriptedSampler};
use simons_stack::topology::InputTypeId;
use simons_stack::{ErrorKind, InputType, Millis, NodeAddress, NodeController, NodeIo, NodeSettings, Rig};

use crate::SimError;
use crate::scenario::Scenario;
use crate::simulator::event_queue::{SimClock, SimEventQueue, SimEventType};
use crate::trace::{TraceDriver, TraceWriter};

pub type SimNode = NodeController<TraceDriver, ScriptedSampler, RecordingReporter>;

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub steps: u64,
    pub level_changes: u64,
    pub random_triggers: u64,
    pub errors: Vec<(ErrorKind, usize)>,
}

impl SimReport {
    pub fn error_count(&self, kind: ErrorKind) -> usize {
        self.errors
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, count)| *count)
    }
}

/// Runs one node against a scenario on a simulated millisecond clock.
pub struct Simulator {
    node: SimNode,
    inputs: Vec<InputType>,
    asserted: HashMap<InputTypeId, bool>,
    queue: SimEventQueue,
    clock: SimClock,
    step_ms: Millis,
    duration_ms: Millis,
    rng: StdRng,
    trigger_rate: f64,
    hold_ms: Millis,
    random_triggers: u64,
}

impl Simulator {
    pub fn new(rig: &Rig, scenario: &Scenario) -> Result<Self, SimError> {
        let sim = &scenario.simulation;
        let address = NodeAddress(sim.address);
        let node_type = rig.node_type_for(address)?;

        let mut inputs: Vec<InputType> = Vec::new();
        for chain in node_type.chain_type_ids.iter().filter_map(|id| rig.topology().chain_type(*id)) {
            if let Some(input) = rig.topology().input_type(chain.input_type_id) {
                if !inputs.iter().any(|i| i.id == input.id) {
                    inputs.push(*input);
                }
            }
        }

        let mut queue = SimEventQueue::new();
        for event in &scenario.sensor {
            if !inputs.iter().any(|i| i.id == event.input_type_id) {
                return Err(SimError::Scenario(format!(
                    "input type {} is not read by node {}",
                    event.input_type_id, sim.address
                )));
            }
            queue.push(
                event.at_ms,
                SimEventType::Sensor { input_type_id: event.input_type_id, asserted: event.asserted },
            );
        }
        for push in &scenario.push {
            queue.push(push.at_ms, SimEventType::Push { masks: push.masks.clone() });
        }

        let settings = NodeSettings {
            time_delta_override: sim.time_delta_override_ms,
            timeout_override: sim.timeout_override_ms,
        };
        let io = NodeIo {
            driver: TraceDriver::new(),
            sampler: ScriptedSampler::new(),
            reporter: RecordingReporter::new(),
        };
        let node = NodeController::new(rig, address, settings, io, 0)?;

        let mut simulator = Self {
            node,
            inputs,
            asserted: HashMap::new(),
            queue,
            clock: SimClock::new(),
            step_ms: sim.step_ms,
            duration_ms: sim.duration_ms,
            rng: StdRng::seed_from_u64(sim.seed),
            trigger_rate: sim.random_trigger_rate,
            hold_ms: sim.random_hold_ms,
            random_triggers: 0,
        };
        for input in simulator.inputs.clone() {
            simulator.set_input(input.id, false);
        }
        tracing::info!(
            address = sim.address,
            node_type = node_type.id,
            inputs = simulator.inputs.len(),
            queued = simulator.queue.len(),
            "Simulator initialized"
        );
        Ok(simulator)
    }

    pub fn node(&self) -> &SimNode {
        &self.node
    }

    /// Runs until the configured duration, writing level changes to `sink`.
    pub fn run<W: Write>(&mut self, sink: &mut TraceWriter<W>) -> Result<SimReport, SimError> {
        let mut steps = 0u64;
        while self.clock.current_time <= self.duration_ms {
            let now = self.clock.current_time;
            self.node.driver_mut().set_time(now);
            self.random_triggers(now);

            let mut pushed = false;
            while let Some(event) = self.queue.pop_due(now) {
                match event.event_type {
                    SimEventType::Sensor { input_type_id, asserted } => {
                        tracing::debug!(now, input_type_id, asserted, "Input changed");
                        self.set_input(input_type_id, asserted);
                    }
                    SimEventType::Push { masks } => {
                        tracing::debug!(now, ?masks, "External state pushed");
                        self.node.apply_external(now, &masks);
                        pushed = true;
                    }
                }
            }
            if !pushed {
                self.node.run_cycle(now);
            }

            sink.write_all(&self.node.driver_mut().take_changes())?;
            steps += 1;
            self.clock.advance(self.step_ms);
        }

        let reporter = self.node.reporter();
        let errors = ErrorKind::ALL
            .iter()
            .map(|kind| (*kind, reporter.count(*kind)))
            .filter(|(_, count)| *count > 0)
            .collect();
        Ok(SimReport {
            steps,
            level_changes: sink.rows(),
            random_triggers: self.random_triggers,
            errors,
        })
    }

    fn random_triggers(&mut self, now: Millis) {
        if self.trigger_rate <= 0.0 {
            return;
        }
        for index in 0..self.inputs.len() {
            let id = self.inputs[index].id;
            if self.asserted.get(&id).copied().unwrap_or(false) {
                continue;
            }
            if self.rng.random_bool(self.trigger_rate) {
                tracing::debug!(now, input_type_id = id, "Random trigger");
                self.random_triggers += 1;
                self.set_input(id, true);
                self.queue.push(now + self.hold_ms, SimEventType::Sensor { input_type_id: id, asserted: false });
            }
        }
    }

    fn set_input(&mut self, id: InputTypeId, asserted: bool) {
        if let Some(input) = self.inputs.iter().find(|i| i.id == id) {
            self.node.sampler_mut().set_raw(id, asserted == input.active_high);
            self.asserted.insert(id, asserted);
        }
    }
}
