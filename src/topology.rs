//! Static rig topology: output, register, input, chain and node types.
//!
//! All tables are built once from compiled-in definitions by [`Topology::load`]
//! and are read-only afterwards. Each table is an arena addressed by the
//! entry's one-byte id; entries refer to each other by id, and a reference to
//! an id that was never defined is only detected when a node tries to use it.

use serde::Serialize;
use thiserror::Error;

use crate::{
    MAX_CHAINS_PER_NODE, MAX_OUTPUTS_PER_REGISTER, MAX_PWM_BRIGHTNESS, MAX_REGISTERS_PER_CHAIN,
    Millis, NUM_OUTPUT_TIMES,
};

pub type OutputTypeId = u8;
pub type RegisterTypeId = u8;
pub type InputTypeId = u8;
pub type ChainTypeId = u8;
pub type NodeTypeId = u8;

/// Id 0 marks an unpopulated register bit, an empty register slot or an
/// empty chain slot.
pub const EMPTY_ID: u8 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("{table} id 0 is reserved for empty slots")]
    ReservedId { table: &'static str },
    #[error("duplicate {table} id {id}")]
    DuplicateId { table: &'static str, id: u8 },
    #[error("register type {id} has {count} outputs (max 8)")]
    TooManyOutputs { id: RegisterTypeId, count: usize },
    #[error("chain type {id} has {count} registers (max 4)")]
    TooManyRegisters { id: ChainTypeId, count: usize },
    #[error("node type {id} has {count} chains (max 6)")]
    TooManyChains { id: NodeTypeId, count: usize },
    #[error("node type {id} lists chain type {chain} more than once")]
    RepeatedChain { id: NodeTypeId, chain: ChainTypeId },
    #[error("output type {id}: level {level} exceeds 63")]
    LevelTooHigh { id: OutputTypeId, level: u8 },
    #[error("output type {id}: {field} {value}ms exceeds cycle length {cycle}ms")]
    SensorWindow {
        id: OutputTypeId,
        field: &'static str,
        value: u32,
        cycle: Millis,
    },
}

/// How an output reaches its peak: switched straight to a fixed level, or
/// ramped through PWM up to a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputBehavior {
    Binary { hold_level: u8 },
    Dimmable { max_pwm: u8 },
}

impl OutputBehavior {
    /// Level held during the hold phase.
    pub fn peak(&self) -> u8 {
        match *self {
            OutputBehavior::Binary { hold_level } => hold_level,
            OutputBehavior::Dimmable { max_pwm } => max_pwm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputType {
    pub id: OutputTypeId,
    pub behavior: OutputBehavior,
    /// Phase durations in ms, indexed by [`OutputType::RISE`], [`OutputType::HOLD`]
    /// and [`OutputType::FALL`].
    pub times: [u32; NUM_OUTPUT_TIMES],
    pub sensor_start_time: u32,
    pub sensor_offset_time: u32,
}

impl OutputType {
    pub const RISE: usize = 0;
    pub const HOLD: usize = 1;
    pub const FALL: usize = 2;

    pub const fn dimmable(id: OutputTypeId, max_pwm: u8, times: [u32; NUM_OUTPUT_TIMES]) -> Self {
        Self {
            id,
            behavior: OutputBehavior::Dimmable { max_pwm },
            times,
            sensor_start_time: 0,
            sensor_offset_time: 0,
        }
    }

    pub const fn binary(id: OutputTypeId, hold_level: u8, times: [u32; NUM_OUTPUT_TIMES]) -> Self {
        Self {
            id,
            behavior: OutputBehavior::Binary { hold_level },
            times,
            sensor_start_time: 0,
            sensor_offset_time: 0,
        }
    }

    pub const fn with_sensor_window(mut self, start: u32, offset: u32) -> Self {
        self.sensor_start_time = start;
        self.sensor_offset_time = offset;
        self
    }

    pub fn rise_for(&self) -> u32 {
        self.times[Self::RISE]
    }

    pub fn hold_for(&self) -> u32 {
        self.times[Self::HOLD]
    }

    pub fn fall_for(&self) -> u32 {
        self.times[Self::FALL]
    }

    /// Length of one full rise/hold/fall cycle.
    pub fn cycle_len(&self) -> Millis {
        self.times.iter().map(|&t| Millis::from(t)).sum()
    }

    fn validate(&self) -> Result<(), TopologyError> {
        let level = self.behavior.peak();
        if level > MAX_PWM_BRIGHTNESS {
            return Err(TopologyError::LevelTooHigh { id: self.id, level });
        }
        let cycle = self.cycle_len();
        for (field, value) in [
            ("sensor_start_time", self.sensor_start_time),
            ("sensor_offset_time", self.sensor_offset_time),
        ] {
            if Millis::from(value) > cycle {
                return Err(TopologyError::SensorWindow {
                    id: self.id,
                    field,
                    value,
                    cycle,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterType {
    pub id: RegisterTypeId,
    /// Output type per bit position, lowest bit first.
    pub output_type_ids: Vec<OutputTypeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputType {
    pub id: InputTypeId,
    pub active_high: bool,
}

impl InputType {
    /// Applies the input's polarity to a raw pin reading.
    pub fn is_asserted(&self, raw: bool) -> bool {
        raw == self.active_high
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainType {
    pub id: ChainTypeId,
    /// Output positions that the chain's input drives as an overlay.
    pub do_overlay: u32,
    pub input_type_id: InputTypeId,
    pub register_type_ids: Vec<RegisterTypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeType {
    pub id: NodeTypeId,
    pub do_node_reactor: bool,
    pub default_timeout: u32,
    pub default_time_delta: u32,
    pub chain_type_ids: Vec<ChainTypeId>,
}

#[derive(Debug, Clone, Copy)]
pub struct RegisterTypeDef<'a> {
    pub id: RegisterTypeId,
    pub output_type_ids: &'a [OutputTypeId],
}

#[derive(Debug, Clone, Copy)]
pub struct ChainTypeDef<'a> {
    pub id: ChainTypeId,
    pub do_overlay: u32,
    pub input_type_id: InputTypeId,
    pub register_type_ids: &'a [RegisterTypeId],
}

#[derive(Debug, Clone, Copy)]
pub struct NodeTypeDef<'a> {
    pub id: NodeTypeId,
    pub do_node_reactor: bool,
    pub default_timeout: u32,
    pub default_time_delta: u32,
    pub chain_type_ids: &'a [ChainTypeId],
}

/// Compiled-in table definitions, borrowed for the duration of [`Topology::load`].
#[derive(Debug, Clone, Copy)]
pub struct TopologyDef<'a> {
    pub output_types: &'a [OutputType],
    pub register_types: &'a [RegisterTypeDef<'a>],
    pub input_types: &'a [InputType],
    pub chain_types: &'a [ChainTypeDef<'a>],
    pub node_types: &'a [NodeTypeDef<'a>],
}

/// Entries of one table plus an id -> arena index lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
struct Arena<T> {
    entries: Vec<T>,
    #[serde(skip)]
    index: Vec<Option<usize>>,
}

impl<T> Arena<T> {
    fn build(
        table: &'static str,
        items: impl IntoIterator<Item = T>,
        id_of: impl Fn(&T) -> u8,
    ) -> Result<Self, TopologyError> {
        let mut entries = Vec::new();
        let mut index = vec![None; usize::from(u8::MAX) + 1];
        for item in items {
            let id = id_of(&item);
            if id == EMPTY_ID {
                return Err(TopologyError::ReservedId { table });
            }
            let slot = &mut index[usize::from(id)];
            if slot.is_some() {
                return Err(TopologyError::DuplicateId { table, id });
            }
            *slot = Some(entries.len());
            entries.push(item);
        }
        Ok(Self { entries, index })
    }

    fn get(&self, id: u8) -> Option<&T> {
        self.index[usize::from(id)].map(|i| &self.entries[i])
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    output_types: Arena<OutputType>,
    register_types: Arena<RegisterType>,
    input_types: Arena<InputType>,
    chain_types: Arena<ChainType>,
    node_types: Arena<NodeType>,
}

impl Topology {
    pub fn load(def: &TopologyDef<'_>) -> Result<Self, TopologyError> {
        for output in def.output_types {
            output.validate()?;
        }
        for register in def.register_types {
            if register.output_type_ids.len() > MAX_OUTPUTS_PER_REGISTER {
                return Err(TopologyError::TooManyOutputs {
                    id: register.id,
                    count: register.output_type_ids.len(),
                });
            }
        }
        for chain in def.chain_types {
            if chain.register_type_ids.len() > MAX_REGISTERS_PER_CHAIN {
                return Err(TopologyError::TooManyRegisters {
                    id: chain.id,
                    count: chain.register_type_ids.len(),
                });
            }
        }
        for node in def.node_types {
            if node.chain_type_ids.len() > MAX_CHAINS_PER_NODE {
                return Err(TopologyError::TooManyChains {
                    id: node.id,
                    count: node.chain_type_ids.len(),
                });
            }
            // the driver addresses a chain by its type id
            for (i, &chain) in node.chain_type_ids.iter().enumerate() {
                if chain != EMPTY_ID && node.chain_type_ids[..i].contains(&chain) {
                    return Err(TopologyError::RepeatedChain { id: node.id, chain });
                }
            }
        }

        let topology = Self {
            output_types: Arena::build("output type", def.output_types.iter().copied(), |o| o.id)?,
            register_types: Arena::build(
                "register type",
                def.register_types.iter().map(|r| RegisterType {
                    id: r.id,
                    output_type_ids: r.output_type_ids.to_vec(),
                }),
                |r| r.id,
            )?,
            input_types: Arena::build("input type", def.input_types.iter().copied(), |i| i.id)?,
            chain_types: Arena::build(
                "chain type",
                def.chain_types.iter().map(|c| ChainType {
                    id: c.id,
                    do_overlay: c.do_overlay,
                    input_type_id: c.input_type_id,
                    register_type_ids: c.register_type_ids.to_vec(),
                }),
                |c| c.id,
            )?,
            node_types: Arena::build(
                "node type",
                def.node_types.iter().map(|n| NodeType {
                    id: n.id,
                    do_node_reactor: n.do_node_reactor,
                    default_timeout: n.default_timeout,
                    default_time_delta: n.default_time_delta,
                    chain_type_ids: n.chain_type_ids.to_vec(),
                }),
                |n| n.id,
            )?,
        };

        tracing::debug!(
            outputs = topology.output_types.entries.len(),
            registers = topology.register_types.entries.len(),
            chains = topology.chain_types.entries.len(),
            nodes = topology.node_types.entries.len(),
            "Topology loaded"
        );
        Ok(topology)
    }

    pub fn output_type(&self, id: OutputTypeId) -> Option<&OutputType> {
        self.output_types.get(id)
    }

    pub fn register_type(&self, id: RegisterTypeId) -> Option<&RegisterType> {
        self.register_types.get(id)
    }

    pub fn input_type(&self, id: InputTypeId) -> Option<&InputType> {
        self.input_types.get(id)
    }

    pub fn chain_type(&self, id: ChainTypeId) -> Option<&ChainType> {
        self.chain_types.get(id)
    }

    pub fn node_type(&self, id: NodeTypeId) -> Option<&NodeType> {
        self.node_types.get(id)
    }

    pub fn node_types(&self) -> impl Iterator<Item = &NodeType> {
        self.node_types.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUTS: &[OutputType] = &[
        OutputType::dimmable(1, 63, [100, 200, 100]),
        OutputType::binary(2, 40, [0, 500, 0]),
    ];

    fn def<'a>(
        registers: &'a [RegisterTypeDef<'a>],
        chains: &'a [ChainTypeDef<'a>],
        nodes: &'a [NodeTypeDef<'a>],
    ) -> TopologyDef<'a> {
        TopologyDef {
            output_types: OUTPUTS,
            register_types: registers,
            input_types: &[InputType { id: 1, active_high: false }],
            chain_types: chains,
            node_types: nodes,
        }
    }

    #[test]
    fn test_load_and_lookup() {
        let registers = [RegisterTypeDef { id: 3, output_type_ids: &[1, 2, 0, 1] }];
        let chains = [ChainTypeDef { id: 4, do_overlay: 0b1, input_type_id: 1, register_type_ids: &[3, 0] }];
        let nodes = [NodeTypeDef {
            id: 5,
            do_node_reactor: true,
            default_timeout: 5_000,
            default_time_delta: 250,
            chain_type_ids: &[4],
        }];
        let topology = Topology::load(&def(&registers, &chains, &nodes)).unwrap();

        assert_eq!(topology.output_type(1).unwrap().rise_for(), 100);
        assert_eq!(topology.output_type(2).unwrap().behavior.peak(), 40);
        assert_eq!(topology.register_type(3).unwrap().output_type_ids, vec![1, 2, 0, 1]);
        assert_eq!(topology.chain_type(4).unwrap().register_type_ids, vec![3, 0]);
        assert_eq!(topology.node_type(5).unwrap().chain_type_ids, vec![4]);
        assert!(topology.output_type(9).is_none());
        assert!(topology.chain_type(0).is_none());
    }

    #[test]
    fn test_dangling_reference_is_not_a_load_error() {
        let chains = [ChainTypeDef { id: 4, do_overlay: 0, input_type_id: 7, register_type_ids: &[99] }];
        let topology = Topology::load(&def(&[], &chains, &[])).unwrap();
        assert!(topology.register_type(99).is_none());
    }

    #[test]
    fn test_duplicate_and_reserved_ids() {
        let registers = [
            RegisterTypeDef { id: 3, output_type_ids: &[1] },
            RegisterTypeDef { id: 3, output_type_ids: &[2] },
        ];
        assert_eq!(
            Topology::load(&def(&registers, &[], &[])).unwrap_err(),
            TopologyError::DuplicateId { table: "register type", id: 3 }
        );

        let registers = [RegisterTypeDef { id: 0, output_type_ids: &[1] }];
        assert_eq!(
            Topology::load(&def(&registers, &[], &[])).unwrap_err(),
            TopologyError::ReservedId { table: "register type" }
        );
    }

    #[test]
    fn test_size_limits() {
        let registers = [RegisterTypeDef { id: 3, output_type_ids: &[1; 9] }];
        assert!(matches!(
            Topology::load(&def(&registers, &[], &[])),
            Err(TopologyError::TooManyOutputs { id: 3, count: 9 })
        ));

        let chains = [ChainTypeDef { id: 4, do_overlay: 0, input_type_id: 1, register_type_ids: &[3; 5] }];
        assert!(matches!(
            Topology::load(&def(&[], &chains, &[])),
            Err(TopologyError::TooManyRegisters { id: 4, count: 5 })
        ));

        let nodes = [NodeTypeDef {
            id: 5,
            do_node_reactor: true,
            default_timeout: 0,
            default_time_delta: 0,
            chain_type_ids: &[4; 7],
        }];
        assert!(matches!(
            Topology::load(&def(&[], &[], &nodes)),
            Err(TopologyError::TooManyChains { id: 5, count: 7 })
        ));

        let nodes = [NodeTypeDef {
            id: 6,
            do_node_reactor: true,
            default_timeout: 0,
            default_time_delta: 0,
            chain_type_ids: &[4, 0, 0, 4],
        }];
        assert_eq!(
            Topology::load(&def(&[], &[], &nodes)).unwrap_err(),
            TopologyError::RepeatedChain { id: 6, chain: 4 }
        );
    }

    #[test]
    fn test_output_type_invariants() {
        let too_bright = [OutputType::dimmable(1, 64, [10, 10, 10])];
        let topology_def = TopologyDef { output_types: &too_bright, ..def(&[], &[], &[]) };
        assert_eq!(
            Topology::load(&topology_def).unwrap_err(),
            TopologyError::LevelTooHigh { id: 1, level: 64 }
        );

        let late_offset = [OutputType::dimmable(1, 63, [10, 10, 10]).with_sensor_window(0, 31)];
        let topology_def = TopologyDef { output_types: &late_offset, ..def(&[], &[], &[]) };
        assert!(matches!(
            Topology::load(&topology_def),
            Err(TopologyError::SensorWindow { field: "sensor_offset_time", cycle: 30, .. })
        ));
    }

    #[test]
    fn test_input_polarity() {
        let active_low = InputType { id: 1, active_high: false };
        assert!(active_low.is_asserted(false));
        assert!(!active_low.is_asserted(true));
        let active_high = InputType { id: 2, active_high: true };
        assert!(active_high.is_asserted(true));
    }
}
