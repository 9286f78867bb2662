use thiserror::Error;

use crate::{PatchId, PortId};

/// Validation failures raised while reading or mutating the routing graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// No port with the given id exists.
    #[error("port id {0} not found")]
    UnknownPort(PortId),
    /// No port config with the given id exists.
    #[error("port config id {0} not found")]
    UnknownPortConfig(PortId),
    /// No patch with the given id exists.
    #[error("patch id {0} not found")]
    UnknownPatch(PatchId),
    /// The request is malformed or names an unsupported combination.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// A mix port whose profiles are all dynamic cannot produce a default config.
    #[error("unable to generate a default config for port {0}")]
    NoDefaultConfig(PortId),
    /// The port no longer supports the format of the config being edited.
    #[error("port {port} does not support the configured format anymore")]
    FormatNoLongerSupported { port: PortId },
    /// There is no route from any requested source to the sink port.
    #[error("there is no route to the sink port id {0}")]
    NoRoute(PortId),
    /// The sink port is reachable only exclusively and another patch uses it.
    #[error("sink port id {0} is exclusive and is already used by another patch")]
    ExclusiveSinkInUse(PortId),
    /// The port is not a hot-pluggable device port.
    #[error("port id {0} is not a hot-pluggable device port")]
    NotHotPluggable(PortId),
    /// The port is not tracked as an externally connected device.
    #[error("port id {0} is not a connected external device port")]
    NotConnected(PortId),
    /// The template is itself a connected port.
    #[error("port id {0} is already a connected device port")]
    AlreadyConnected(PortId),
    /// The same device is already connected through another port.
    #[error("device is already connected at port id {0}")]
    DuplicateDevice(PortId),
    /// Neither the device nor any routable mix port can supply a static profile.
    #[error(
        "connected port for template {0} has only dynamic profiles \
         and so do its routable mix ports"
    )]
    NoStaticProfiles(PortId),
    /// The port has configs that differ from their initial values.
    #[error("port id {0} has non-default configs")]
    PortHasConfigs(PortId),
    /// A config of the port is still part of a patch.
    #[error("port id {0} has configs used by a patch")]
    PortIsPatched(PortId),
}

impl GraphError {
    /// State errors reject a well-formed request because of the current graph contents.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            GraphError::ExclusiveSinkInUse(_)
                | GraphError::DuplicateDevice(_)
                | GraphError::NoStaticProfiles(_)
                | GraphError::PortHasConfigs(_)
                | GraphError::PortIsPatched(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
