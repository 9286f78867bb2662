//! Routing graph of an audio hardware module: ports, configs, routes and patches.

pub mod devices;
pub mod error;
pub mod model;
pub mod patch;
pub mod profile;
pub mod store;

pub use devices::ConnectedDevicePorts;
pub use error::GraphError;
pub use model::{
    connection, frame_size_bytes, has_dynamic_profiles_only, AudioDevice, AudioFormat, AudioPatch,
    AudioPort, AudioPortConfig, AudioProfile, AudioRoute, ChannelLayout, DevicePortExt, DeviceType,
    Direction, GainConfig, IoFlags, MixPortExt, PcmType, PortExt,
};
pub use patch::PatchIndex;
pub use profile::{config_matches_port, negotiate, resolve_default, Negotiation};
pub use store::{Configuration, PortConfigOutcome};

/// Identifier of a port or port config; both share one id space. Zero means "unset".
pub type PortId = i32;
pub type PatchId = i32;
