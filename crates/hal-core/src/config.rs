use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::variant::ModuleKind;

/// Debug switches applied module-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDebug {
    /// Take connected device profiles from the configuration table instead of
    /// asking the variant to probe the device.
    pub simulate_device_connections: bool,
    /// Time spent in `DRAINING` and `TRANSFERRING` before they resolve.
    pub stream_transient_state_delay_ms: u32,
}

/// Switches that alter the behaviour of streams opened afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorDebug {
    /// Shorten every playback burst by one frame.
    pub force_transient_burst: bool,
    /// Complete a drain from `ACTIVE` without passing through `DRAINING`.
    pub force_synchronous_drain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub command_capacity: usize,
    pub reply_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            command_capacity: 2,
            reply_capacity: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub kind: ModuleKind,
    pub debug: ModuleDebug,
    pub vendor_debug: VendorDebug,
    pub queues: QueueConfig,
}

impl ModuleConfig {
    pub fn with_kind(mut self, kind: ModuleKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_debug(mut self, debug: ModuleDebug) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_vendor_debug(mut self, vendor_debug: VendorDebug) -> Self {
        self.vendor_debug = vendor_debug;
        self
    }

    pub fn with_queues(mut self, queues: QueueConfig) -> Self {
        self.queues = queues;
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data).map_err(std::io::Error::from)
    }
}
