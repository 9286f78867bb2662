//! Drivers move audio between a stream worker and the hardware.

use hal_graph::AudioDevice;
use hal_rt::{DrainMode, Position};
use thiserror::Error;

pub mod stub;

pub use stub::{StubDriver, StubDriverConfig};

pub const STATUS_NO_INIT: i32 = -19;
pub const STATUS_IO_ERROR: i32 = -5;
pub const STATUS_DEAD_OBJECT: i32 = -32;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("driver is not initialized")]
    NotInitialized,
    #[error("device not available: {0}")]
    DeviceUnavailable(String),
    #[error("i/o failure: {0}")]
    Io(String),
    #[error("driver returned status {0}")]
    Status(i32),
}

impl DriverError {
    /// Platform status code reported to the client.
    pub fn status(&self) -> i32 {
        match self {
            DriverError::NotInitialized => STATUS_NO_INIT,
            DriverError::DeviceUnavailable(_) => STATUS_DEAD_OBJECT,
            DriverError::Io(_) => STATUS_IO_ERROR,
            DriverError::Status(code) => *code,
        }
    }
}

/// Outcome of one [`Driver::transfer`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transfer {
    /// Frames actually moved; never more than requested.
    pub actual_frames: usize,
    pub latency_ms: i32,
}

/// Stream driver. All methods except `set_connected_devices` run on the stream
/// worker thread; the session serialises every call behind one lock.
pub trait Driver: Send {
    /// Called once before the worker starts reading commands.
    fn init(&mut self) -> Result<()>;
    fn drain(&mut self, mode: DrainMode) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn standby(&mut self) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    /// Moves up to `frame_count` frames in or out of `buffer`.
    ///
    /// Must accept repeated calls with zero frames.
    fn transfer(&mut self, buffer: &mut [u8], frame_count: usize) -> Result<Transfer>;

    /// Lets drivers with better knowledge than the frame counter adjust the position.
    fn refine_position(&mut self, _position: &mut Position) -> Result<()> {
        Ok(())
    }

    /// Invoked from the control plane when the stream's device set changes.
    fn set_connected_devices(&mut self, _devices: &[AudioDevice]) -> Result<()> {
        Ok(())
    }

    /// Called once after the worker has exited.
    fn shutdown(&mut self);
}
