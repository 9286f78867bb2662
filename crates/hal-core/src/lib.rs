//! Audio hardware module core: routing coordinator, module variants and
//! stream sessions.

mod config;
mod error;
mod latency;
mod module;
mod registry;
mod stream;
pub mod tables;
mod variant;

use std::sync::Arc;

pub use config::{ModuleConfig, ModuleDebug, QueueConfig, VendorDebug};
pub use error::{ErrorKind, HalError, Result};
pub use latency::{
    LatencyMetrics, BLUETOOTH_NOMINAL_LATENCY_MS, DEFAULT_NOMINAL_LATENCY_MS,
    MAX_STREAM_BUFFER_BYTES,
};
pub use module::Module;
pub use stream::{OffloadInfo, OpenStreamArgs, StreamContext, StreamSession};
pub use variant::{
    BluetoothModule, DefaultModule, ModuleKind, ModuleVariant, RSubmixModule, StubModule,
    UsbModule,
};

/// Shared handle to an open stream.
pub type StreamHandle = Arc<StreamSession>;
