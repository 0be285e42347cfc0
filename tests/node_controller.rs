// Integration tests for the node controller against in-memory collaborators

use std::sync::Arc;

use simons_stack::hardware::{RecordingDriver, RecordingReporter, ScriptedSampler};
use simons_stack::topology::{ChainTypeDef, NodeTypeDef, RegisterTypeDef};
use simons_stack::{
    ErrorKind, Frame, InputType, NodeAddress, NodeController, NodeIo, NodeSettings, OutputType,
    PatternStore, Phase, SamplerError, Topology, TopologyDef,
};

type TestNode = NodeController<RecordingDriver, ScriptedSampler, RecordingReporter>;

const PULSE: u8 = 1;
const LONG_HOLD: u8 = 2;
const SENSED: u8 = 3;

const OUTPUTS: &[OutputType] = &[
    OutputType::dimmable(PULSE, 63, [100, 200, 100]),
    OutputType::binary(LONG_HOLD, 63, [0, 10_000, 0]),
    OutputType::dimmable(SENSED, 63, [100, 200, 100]).with_sensor_window(100, 0),
];
const REGISTERS: &[RegisterTypeDef<'static>] = &[
    RegisterTypeDef { id: 1, output_type_ids: &[PULSE, PULSE] },
    RegisterTypeDef { id: 2, output_type_ids: &[LONG_HOLD] },
    RegisterTypeDef { id: 3, output_type_ids: &[SENSED, PULSE] },
];
const INPUTS: &[InputType] = &[InputType { id: 1, active_high: true }];
const CHAINS: &[ChainTypeDef<'static>] = &[
    ChainTypeDef { id: 1, do_overlay: 0, input_type_id: 1, register_type_ids: &[1] },
    ChainTypeDef { id: 2, do_overlay: 0, input_type_id: 1, register_type_ids: &[2] },
    ChainTypeDef { id: 3, do_overlay: 0b01, input_type_id: 1, register_type_ids: &[3] },
    ChainTypeDef { id: 4, do_overlay: 0b1, input_type_id: 1, register_type_ids: &[2] },
];

fn build(chain_type_id: u8, reactor: bool, frames: &[Frame], settings: NodeSettings) -> TestNode {
    let chain_type_ids = [chain_type_id];
    let nodes = [NodeTypeDef {
        id: 1,
        do_node_reactor: reactor,
        default_timeout: 30_000,
        default_time_delta: 60_000,
        chain_type_ids: &chain_type_ids,
    }];
    let topology = Topology::load(&TopologyDef {
        output_types: OUTPUTS,
        register_types: REGISTERS,
        input_types: INPUTS,
        chain_types: CHAINS,
        node_types: &nodes,
    })
    .unwrap();
    let node_type = topology.node_type(1).unwrap().clone();
    NodeController::for_node_type(
        &topology,
        Arc::new(PatternStore::new(frames).unwrap()),
        NodeAddress(1),
        node_type,
        settings,
        NodeIo {
            driver: RecordingDriver::new(),
            sampler: ScriptedSampler::new(),
            reporter: RecordingReporter::new(),
        },
        0,
    )
}

#[test]
fn test_dimmable_output_follows_envelope() {
    let mut node = build(1, true, &[[0b01, 0, 0, 0, 0, 0]], NodeSettings::default());
    let expected = [(0, 0), (50, 31), (150, 63), (300, 63), (350, 31), (400, 0)];
    for (now, level) in expected {
        node.run_cycle(now);
        assert_eq!(node.driver().level(1, 0, 0), Some(level), "t={now}");
        assert_eq!(node.driver().level(1, 0, 1), Some(0), "t={now}");
    }
    assert_eq!(node.snapshot().chains[0].outputs[0].phase, Phase::Idle);
    assert!(node.reporter().reports().is_empty());
}

#[test]
fn test_pattern_cycles_through_frames() {
    let settings = NodeSettings { time_delta_override: Some(100), timeout_override: None };
    let mut node = build(1, true, &[[0b01, 0, 0, 0, 0, 0], [0b10, 0, 0, 0, 0, 0]], settings);
    assert_eq!(node.time_delta(), 100);

    let frames: Vec<Option<usize>> = [0, 100, 199, 200, 350]
        .into_iter()
        .map(|now| {
            node.run_cycle(now);
            node.snapshot().chains[0].frame
        })
        .collect();
    assert_eq!(frames, vec![Some(0), Some(1), Some(1), Some(0), Some(1)]);
}

#[test]
fn test_overlay_drives_output_the_pattern_leaves_clear() {
    let mut node = build(3, true, &[[0, 0, 0, 0, 0, 0]], NodeSettings::default());
    node.run_cycle(0);
    assert_eq!(node.driver().level(3, 0, 0), Some(0));

    node.sampler_mut().set_raw(1, true);
    node.run_cycle(10);
    // enters at sensor_start, which is the end of the rise
    assert_eq!(node.driver().level(3, 0, 0), Some(63));
    assert_eq!(node.driver().level(3, 0, 1), Some(0));
    assert_eq!(node.snapshot().chains[0].overlay_mask, 0b01);

    // released mid-hold: the cycle runs out under overlay control
    node.sampler_mut().set_raw(1, false);
    node.run_cycle(210);
    assert_eq!(node.driver().level(3, 0, 0), Some(63));
    assert_eq!(node.snapshot().chains[0].overlay_mask, 0b01);
    node.run_cycle(260);
    assert_eq!(node.driver().level(3, 0, 0), Some(31));
    node.run_cycle(310);
    assert_eq!(node.driver().level(3, 0, 0), Some(0));
    node.run_cycle(320);
    assert_eq!(node.snapshot().chains[0].overlay_mask, 0);
}

#[test]
fn test_timeout_forces_chain_idle_and_reports_cycle_error() {
    let settings = NodeSettings { time_delta_override: None, timeout_override: Some(1_000) };
    let mut node = build(2, true, &[[0b1, 0, 0, 0, 0, 0]], settings);
    assert_eq!(node.timeout(), 1_000);

    node.run_cycle(0);
    assert_eq!(node.driver().level(2, 0, 0), Some(63));
    node.run_cycle(1_000);
    assert_eq!(node.reporter().count(ErrorKind::Cycle), 0);

    node.run_cycle(1_001);
    assert_eq!(node.reporter().count(ErrorKind::Cycle), 1);
    assert_eq!(node.reporter().reports()[0].context, 2);
    assert_eq!(node.driver().level(2, 0, 0), Some(0));
    assert_eq!(node.snapshot().chains[0].frame, None);

    // playback restarts from the first frame on the next pass
    node.run_cycle(1_002);
    assert_eq!(node.snapshot().chains[0].frame, Some(0));
    assert_eq!(node.driver().level(2, 0, 0), Some(63));
}

#[test]
fn test_timeout_suppresses_overlay_until_input_released() {
    let settings = NodeSettings { time_delta_override: None, timeout_override: Some(1_000) };
    let mut node = build(4, true, &[[0, 0, 0, 0, 0, 0]], settings);
    node.sampler_mut().set_raw(1, true);

    node.run_cycle(0);
    assert_eq!(node.driver().level(4, 0, 0), Some(63));
    node.run_cycle(1_001);
    assert_eq!(node.reporter().count(ErrorKind::Cycle), 1);

    // still held: the overlay stays off
    node.run_cycle(1_100);
    assert_eq!(node.driver().level(4, 0, 0), Some(0));

    node.sampler_mut().set_raw(1, false);
    node.run_cycle(1_200);
    node.sampler_mut().set_raw(1, true);
    node.run_cycle(1_300);
    assert_eq!(node.driver().level(4, 0, 0), Some(63));
}

#[test]
fn test_input_held_past_timeout_stops_retriggering_overlay() {
    let settings = NodeSettings { time_delta_override: None, timeout_override: Some(1_000) };
    let mut node = build(3, true, &[[0, 0, 0, 0, 0, 0]], settings);
    node.sampler_mut().set_raw(1, true);

    // each overlay cycle is far shorter than the timeout
    let mut lit_before = 0;
    for now in (0..=1_000).step_by(5) {
        node.run_cycle(now);
        if node.driver().level(3, 0, 0).is_some_and(|level| level > 0) {
            lit_before += 1;
        }
    }
    assert!(lit_before > 100);
    assert_eq!(node.reporter().count(ErrorKind::Cycle), 0);

    node.run_cycle(1_005);
    assert_eq!(node.reporter().count(ErrorKind::Cycle), 1);
    assert_eq!(node.reporter().reports()[0].context, 3);
    assert_eq!(node.driver().level(3, 0, 0), Some(0));

    for now in (1_010..10_000).step_by(5) {
        node.run_cycle(now);
        assert_eq!(node.driver().level(3, 0, 0), Some(0), "t={now}");
    }
    assert_eq!(node.reporter().count(ErrorKind::Cycle), 1);
    assert_eq!(node.snapshot().chains[0].overlay_mask, 0);
    assert!(node.snapshot().chains[0].overlay_suppressed);

    node.sampler_mut().set_raw(1, false);
    node.run_cycle(10_000);
    assert!(!node.snapshot().chains[0].overlay_suppressed);
    node.sampler_mut().set_raw(1, true);
    node.run_cycle(10_005);
    assert_eq!(node.driver().level(3, 0, 0), Some(63));
}

#[test]
fn test_single_frame_pattern_keeps_replaying() {
    let settings = NodeSettings { time_delta_override: Some(500), timeout_override: None };
    let mut node = build(1, true, &[[0b01, 0, 0, 0, 0, 0]], settings);

    let mut activations = 0;
    let mut was_lit = false;
    for now in (0..5_000).step_by(5) {
        node.run_cycle(now);
        let lit = node.driver().level(1, 0, 0).is_some_and(|level| level > 0);
        if lit && !was_lit {
            activations += 1;
        }
        was_lit = lit;
    }
    assert_eq!(activations, 10);
    assert_eq!(node.snapshot().chains[0].frame, Some(0));
}

#[test]
fn test_skipped_polls_still_reenter_the_frame() {
    let settings = NodeSettings { time_delta_override: Some(500), timeout_override: None };
    let mut node = build(1, true, &[[0b01, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0]], settings);
    node.run_cycle(0);
    node.run_cycle(450);
    assert_eq!(node.driver().level(1, 0, 0), Some(0));

    // the next poll lands exactly one full pattern cycle later
    node.run_cycle(1_000);
    assert_eq!(node.snapshot().chains[0].frame, Some(0));
    assert_eq!(node.snapshot().chains[0].outputs[0].phase, Phase::Rising);
    node.run_cycle(1_050);
    assert_eq!(node.driver().level(1, 0, 0), Some(31));
}

#[test]
fn test_zero_timeout_disables_the_check() {
    let settings = NodeSettings { time_delta_override: None, timeout_override: Some(0) };
    let mut node = build(2, true, &[[0b1, 0, 0, 0, 0, 0]], settings);
    node.run_cycle(0);
    node.run_cycle(9_999);
    assert_eq!(node.driver().level(2, 0, 0), Some(63));
    node.run_cycle(10_000);
    assert_eq!(node.driver().level(2, 0, 0), Some(0));
    assert_eq!(node.reporter().count(ErrorKind::Cycle), 0);
}

#[test]
fn test_follower_applies_changed_bits_only() {
    let mut node = build(1, false, &[[0b11, 0, 0, 0, 0, 0]], NodeSettings::default());

    // the follower ignores its pattern and input
    node.sampler_mut().set_fault(1, SamplerError::Sensor);
    node.run_cycle(0);
    assert_eq!(node.driver().level(1, 0, 0), Some(0));
    assert!(node.reporter().reports().is_empty());

    node.apply_external(0, &[0b01]);
    node.apply_external(50, &[0b01]);
    assert_eq!(node.driver().level(1, 0, 0), Some(31));

    node.apply_external(150, &[0b10]);
    assert_eq!(node.driver().level(1, 0, 0), Some(63));
    assert_eq!(node.snapshot().chains[0].outputs[0].phase, Phase::Falling);
    assert_eq!(node.snapshot().chains[0].outputs[1].phase, Phase::Rising);

    node.run_cycle(200);
    assert_eq!(node.driver().level(1, 0, 0), Some(31));
    assert_eq!(node.driver().level(1, 0, 1), Some(31));
}

#[test]
fn test_external_state_for_missing_chain_is_a_program_error() {
    let mut node = build(1, false, &[[0, 0, 0, 0, 0, 0]], NodeSettings::default());
    node.apply_external(0, &[0, 0, 0b1]);
    let contexts: Vec<u8> = node.reporter().reports().iter().map(|r| r.context).collect();
    assert_eq!(node.reporter().count(ErrorKind::Program), 2);
    assert_eq!(contexts, vec![1, 2]);
}

#[test]
fn test_driver_failure_reports_default_error() {
    let mut node = build(1, true, &[[0b01, 0, 0, 0, 0, 0]], NodeSettings::default());
    node.driver_mut().fail_chain(1);
    node.run_cycle(0);
    // one report per rejected output, and the pass carries on
    assert_eq!(node.reporter().count(ErrorKind::Default), 2);
    assert!(node.reporter().reports().iter().all(|r| r.context == 1));
    assert_eq!(node.driver().writes(), 0);

    node.driver_mut().clear_failures();
    node.run_cycle(50);
    assert_eq!(node.reporter().count(ErrorKind::Default), 2);
    assert_eq!(node.driver().level(1, 0, 0), Some(31));

    let io = node.into_io();
    assert_eq!(io.driver.writes(), 2);
}

#[test]
fn test_input_fault_reports_sensor_error_and_skips_overlay() {
    let mut node = build(3, true, &[[0, 0, 0, 0, 0, 0]], NodeSettings::default());
    node.sampler_mut().set_fault(1, SamplerError::Sensor);
    node.run_cycle(0);
    assert_eq!(node.reporter().count(ErrorKind::Sensor), 1);
    assert_eq!(node.reporter().reports()[0].context, 3);
    assert_eq!(node.driver().level(3, 0, 0), Some(0));
    assert_eq!(node.snapshot().chains[0].overlay_mask, 0);

    node.sampler_mut().clear_fault(1);
    node.sampler_mut().set_raw(1, true);
    node.run_cycle(10);
    assert_eq!(node.driver().level(3, 0, 0), Some(63));
}

#[test]
fn test_reset_drops_every_output() {
    let mut node = build(1, true, &[[0b11, 0, 0, 0, 0, 0]], NodeSettings::default());
    node.run_cycle(0);
    node.run_cycle(150);
    assert_eq!(node.driver().level(1, 0, 0), Some(63));

    node.reset(160);
    let snapshot = node.snapshot();
    assert_eq!(snapshot.chains[0].frame, None);
    assert!(snapshot.chains[0].outputs.iter().all(|o| o.phase == Phase::Idle && o.level == 0));

    node.run_cycle(160);
    assert_eq!(node.driver().level(1, 0, 0), Some(0));
    assert_eq!(node.snapshot().chains[0].outputs[0].phase, Phase::Rising);
}
