//! Command/reply records exchanged between a stream client and its worker.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const STATUS_OK: i32 = 0;
pub const STATUS_BAD_VALUE: i32 = -22;
pub const STATUS_INVALID_OPERATION: i32 = -38;
pub const STATUS_NOT_ENOUGH_DATA: i32 = -61;

/// States of the per-stream transport machine.
///
/// Capture streams only ever visit `Standby`, `Idle`, `Active`, `Paused`,
/// `Draining` and `Error`. The remaining states model asynchronous completion
/// on playback streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StreamState {
    #[default]
    Standby,
    Idle,
    Active,
    Paused,
    Draining,
    DrainPaused,
    Transferring,
    TransferPaused,
    Error,
}

impl StreamState {
    /// Transient states resolve on their own after the configured delay.
    pub fn is_transient(self) -> bool {
        matches!(self, StreamState::Draining | StreamState::Transferring)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Standby => "STANDBY",
            StreamState::Idle => "IDLE",
            StreamState::Active => "ACTIVE",
            StreamState::Paused => "PAUSED",
            StreamState::Draining => "DRAINING",
            StreamState::DrainPaused => "DRAIN_PAUSED",
            StreamState::Transferring => "TRANSFERRING",
            StreamState::TransferPaused => "TRANSFER_PAUSED",
            StreamState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrainMode {
    /// The only mode accepted by capture streams.
    Unspecified,
    All,
    EarlyNotify,
}

/// Commands written by the client into the command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Asks the worker to exit. Only honoured when the cookie matches the
    /// token derived by the owning session; never replied to.
    HalReservedExit(u64),
    GetStatus,
    Start,
    /// Byte count the client wants to move through the data queue.
    Burst(i32),
    Drain(DrainMode),
    Standby,
    Pause,
    Flush,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::HalReservedExit(_) => "halReservedExit",
            Command::GetStatus => "getStatus",
            Command::Start => "start",
            Command::Burst(_) => "burst",
            Command::Drain(_) => "drain",
            Command::Standby => "standby",
            Command::Pause => "pause",
            Command::Flush => "flush",
        }
    }
}

/// Observable stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub frames: i64,
    pub time_ns: i64,
}

impl Position {
    pub const UNKNOWN: i64 = -1;

    pub fn unknown() -> Self {
        Self {
            frames: Self::UNKNOWN,
            time_ns: Self::UNKNOWN,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.frames == Self::UNKNOWN
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Reply produced by the worker for every command except the exit command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub status: i32,
    pub state: StreamState,
    pub observable: Position,
    pub latency_ms: i32,
    /// Bytes actually moved through the data queue by a `burst`.
    pub fmq_byte_count: i32,
}

impl Default for Reply {
    fn default() -> Self {
        Self {
            status: STATUS_BAD_VALUE,
            state: StreamState::Standby,
            observable: Position::unknown(),
            latency_ms: 0,
            fmq_byte_count: 0,
        }
    }
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reply_is_bad_value_with_unknown_position() {
        let reply = Reply::default();
        assert_eq!(reply.status, STATUS_BAD_VALUE);
        assert!(reply.observable.is_unknown());
        assert!(!reply.is_ok());
    }

    #[test]
    fn only_draining_and_transferring_are_transient() {
        assert!(StreamState::Draining.is_transient());
        assert!(StreamState::Transferring.is_transient());
        assert!(!StreamState::DrainPaused.is_transient());
        assert!(!StreamState::Active.is_transient());
    }
}
