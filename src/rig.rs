// src/rig.rs - Compiled-in rig tables and node address resolution
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::pattern::{Frame, PatternError, PatternStore};
use crate::topology::{
    ChainTypeDef, InputType, NodeType, NodeTypeDef, NodeTypeId, OutputType, RegisterTypeDef,
    Topology, TopologyDef, TopologyError,
};

/// Address of the coordinating node.
pub const MASTER_ADDRESS: u8 = 0;

#[derive(Debug, Error)]
pub enum RigError {
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),
    #[error("no node type is assigned to address {0}")]
    UnknownAddress(u8),
    #[error("address {address} refers to missing node type {node_type}")]
    UnknownNodeType { address: u8, node_type: NodeTypeId },
}

/// Bus address of a node, as read from its address-sense pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeAddress(pub u8);

impl NodeAddress {
    pub fn is_master(self) -> bool {
        self.0 == MASTER_ADDRESS
    }
}

/// Everything a node needs to run: the shared tables, the pattern and the
/// address -> node type assignment.
#[derive(Debug, Clone)]
pub struct Rig {
    topology: Arc<Topology>,
    patterns: Arc<PatternStore>,
    addresses: Vec<(NodeAddress, NodeTypeId)>,
}

impl Rig {
    pub fn new(
        topology: Topology,
        patterns: PatternStore,
        addresses: &[(u8, NodeTypeId)],
    ) -> Self {
        Self {
            topology: Arc::new(topology),
            patterns: Arc::new(patterns),
            addresses: addresses
                .iter()
                .map(|&(address, node_type)| (NodeAddress(address), node_type))
                .collect(),
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn patterns(&self) -> &Arc<PatternStore> {
        &self.patterns
    }

    pub fn addresses(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        self.addresses.iter().map(|(address, _)| *address)
    }

    pub fn node_type_for(&self, address: NodeAddress) -> Result<&NodeType, RigError> {
        let node_type = self
            .addresses
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, id)| *id)
            .ok_or(RigError::UnknownAddress(address.0))?;
        self.topology
            .node_type(node_type)
            .ok_or(RigError::UnknownNodeType { address: address.0, node_type })
    }
}

// Output types
const STRIP_SLOW: u8 = 1;
const STRIP_FAST: u8 = 2;
const RELAY: u8 = 3;
const SPOT: u8 = 4;

const OUTPUT_TYPES: &[OutputType] = &[
    OutputType::dimmable(STRIP_SLOW, 63, [400, 800, 400]),
    OutputType::dimmable(STRIP_FAST, 48, [80, 160, 120]),
    OutputType::binary(RELAY, 63, [0, 1_500, 250]),
    OutputType::dimmable(SPOT, 63, [150, 1_000, 600]).with_sensor_window(50, 200),
];

const REGISTER_TYPES: &[RegisterTypeDef<'static>] = &[
    RegisterTypeDef { id: 1, output_type_ids: &[STRIP_SLOW; 8] },
    RegisterTypeDef { id: 2, output_type_ids: &[STRIP_FAST; 8] },
    RegisterTypeDef {
        id: 3,
        output_type_ids: &[SPOT, SPOT, STRIP_FAST, STRIP_FAST, STRIP_FAST, STRIP_FAST, RELAY, RELAY],
    },
];

const INPUT_TYPES: &[InputType] = &[
    // pull-up switch closing to ground
    InputType { id: 1, active_high: false },
    InputType { id: 2, active_high: true },
];

const CHAIN_TYPES: &[ChainTypeDef<'static>] = &[
    ChainTypeDef { id: 1, do_overlay: 0, input_type_id: 1, register_type_ids: &[1, 1, 1, 1] },
    ChainTypeDef { id: 2, do_overlay: 0b0000_0011, input_type_id: 2, register_type_ids: &[3, 2] },
    ChainTypeDef { id: 3, do_overlay: 0b1100_0000, input_type_id: 2, register_type_ids: &[3] },
    ChainTypeDef { id: 4, do_overlay: 0, input_type_id: 2, register_type_ids: &[2, 2] },
];

const NODE_TYPES: &[NodeTypeDef<'static>] = &[
    NodeTypeDef {
        id: 1,
        do_node_reactor: true,
        default_timeout: 30_000,
        default_time_delta: 250,
        chain_type_ids: &[1, 2, 3],
    },
    NodeTypeDef {
        id: 2,
        do_node_reactor: true,
        default_timeout: 30_000,
        default_time_delta: 400,
        chain_type_ids: &[2, 3, 4],
    },
    NodeTypeDef {
        id: 3,
        do_node_reactor: false,
        default_timeout: 30_000,
        default_time_delta: 250,
        chain_type_ids: &[1, 4],
    },
];

pub const BUILTIN_TOPOLOGY: TopologyDef<'static> = TopologyDef {
    output_types: OUTPUT_TYPES,
    register_types: REGISTER_TYPES,
    input_types: INPUT_TYPES,
    chain_types: CHAIN_TYPES,
    node_types: NODE_TYPES,
};

/// Running light down the first chain, sweeps and relay clicks on the rest.
pub const BUILTIN_PATTERN: &[Frame] = &[
    [0x0000_000F, 0b0011_1100, 0b0100_0000, 0b0011_1100, 0, 0],
    [0x0000_00F0, 0b0011_0000, 0, 0b0011_0000, 0, 0],
    [0x0000_0F00, 0b1100_0000_0000, 0b0000_0100, 0b0000_1100, 0, 0],
    [0x0000_F000, 0b1111_0000_0000, 0, 0, 0, 0],
    [0x000F_0000, 0b0000_1111_0000_0000, 0b1000_0000, 0b0011_1100, 0, 0],
    [0x00F0_0000, 0b1111_0000_0000_0000, 0, 0b0011_0000, 0, 0],
    [0x0F00_0000, 0b0011_1100, 0b0000_1000, 0b0000_1100, 0, 0],
    [0xF000_0000, 0, 0, 0, 0, 0],
];

pub const BUILTIN_ADDRESSES: &[(u8, NodeTypeId)] = &[(MASTER_ADDRESS, 1), (1, 2), (2, 2), (3, 3)];

pub fn builtin() -> Result<Rig, RigError> {
    let topology = Topology::load(&BUILTIN_TOPOLOGY)?;
    let patterns = PatternStore::new(BUILTIN_PATTERN)?;
    Ok(Rig::new(topology, patterns, BUILTIN_ADDRESSES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rig_loads() {
        let rig = builtin().unwrap();
        assert_eq!(rig.patterns().len(), BUILTIN_PATTERN.len());
        assert_eq!(rig.addresses().count(), BUILTIN_ADDRESSES.len());
        for node in rig.topology().node_types() {
            for chain in &node.chain_type_ids {
                assert!(rig.topology().chain_type(*chain).is_some());
            }
        }
    }

    #[test]
    fn test_node_type_for_address() {
        let rig = builtin().unwrap();
        assert!(NodeAddress(MASTER_ADDRESS).is_master());
        assert_eq!(rig.node_type_for(NodeAddress(0)).unwrap().id, 1);
        assert!(!rig.node_type_for(NodeAddress(3)).unwrap().do_node_reactor);
        assert!(matches!(
            rig.node_type_for(NodeAddress(42)),
            Err(RigError::UnknownAddress(42))
        ));
    }

    #[test]
    fn test_address_to_missing_node_type() {
        let rig = Rig::new(
            Topology::load(&BUILTIN_TOPOLOGY).unwrap(),
            PatternStore::new(BUILTIN_PATTERN).unwrap(),
            &[(5, 99)],
        );
        assert!(matches!(
            rig.node_type_for(NodeAddress(5)),
            Err(RigError::UnknownNodeType { address: 5, node_type: 99 })
        ));
    }
}
