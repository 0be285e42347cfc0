// simons-stack: output timing and pattern playback for Simons Stack controller nodes

pub mod config;
pub mod hardware;
pub mod host;
pub mod node;
pub mod pattern;
pub mod player;
pub mod rig;
pub mod timing;
pub mod topology;

pub use config::{Config, ConfigError, load_config, load_startup_config};
pub use hardware::{
    DriverError, ErrorKind, ErrorReporter, InputSampler, OutputDriver, SamplerError,
};
pub use host::{HostOptions, run_node};
pub use node::{ChainSnapshot, NodeController, NodeIo, NodeSettings, NodeSnapshot};
pub use pattern::{Frame, PatternError, PatternStore};
pub use player::{InputReading, PatternPlayer};
pub use rig::{NodeAddress, Rig, RigError};
pub use timing::{Envelope, Phase};
pub use topology::{
    ChainType, InputType, NodeType, OutputBehavior, OutputType, RegisterType, Topology,
    TopologyDef, TopologyError,
};

/// Highest level any output may be driven to.
pub const MAX_PWM_BRIGHTNESS: u8 = 63;
/// PWM refresh rate the register driver runs at, in Hz.
pub const PWM_FREQUENCY: u8 = 60;
pub const MAX_REGISTERS_PER_CHAIN: usize = 4;
pub const MAX_CHAINS_PER_NODE: usize = 6;
/// Fixed by the 8-bit shift registers on the current controller board.
pub const MAX_OUTPUTS_PER_REGISTER: usize = 8;
pub const MAX_OUTPUTS_PER_CHAIN: usize = MAX_REGISTERS_PER_CHAIN * MAX_OUTPUTS_PER_REGISTER;
pub const ALL_CHAINS: u8 = (1 << MAX_CHAINS_PER_NODE) - 1;
pub const ALL_OUTPUTS: u32 = 0xFFFF_FFFF;
pub const NUM_OUTPUT_TIMES: usize = 3;

/// Milliseconds on the node's monotonic clock.
pub type Millis = u64;
