//! Command loop shared by capture and playback workers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use hal_graph::AudioDevice;
use hal_io::{Driver, DriverError, Transfer};
use hal_rt::{
    Command, Position, QueueReader, QueueWriter, Reply, StreamState, STATUS_INVALID_OPERATION,
    STATUS_OK,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::context::StreamContext;

static CLOCK_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

fn monotonic_ns() -> i64 {
    i64::try_from(CLOCK_ORIGIN.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

/// Token identifying a worker thread. Combined with the session cookie it
/// forms the only exit command the worker obeys.
pub(crate) fn thread_token(id: ThreadId) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// State guarded by the session lock: the control plane updates the device
/// list while the worker calls into the driver.
pub(crate) struct Shared {
    pub(crate) driver: Box<dyn Driver>,
    pub(crate) devices: Vec<AudioDevice>,
}

/// Direction specific command handling.
pub(crate) trait WorkerLogic: Send + 'static {
    /// Whether `DRAINING` and `TRANSFERRING` resolve on their own.
    const RESOLVES_TRANSIENT_STATES: bool;

    fn handle(&mut self, core: &mut WorkerCore, command: Command) -> Reply;
}

pub(crate) struct WorkerCore {
    pub(crate) context: StreamContext,
    shared: Arc<Mutex<Shared>>,
    frames: Arc<AtomicI64>,
    pub(crate) buffer: Vec<u8>,
    pub(crate) state: StreamState,
    transient_since: Instant,
}

impl WorkerCore {
    pub(crate) fn new(
        context: StreamContext,
        shared: Arc<Mutex<Shared>>,
        frames: Arc<AtomicI64>,
    ) -> Self {
        let buffer = vec![0; context.buffer_size_bytes()];
        Self {
            context,
            shared,
            frames,
            buffer,
            state: StreamState::Standby,
            transient_since: Instant::now(),
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        !self.shared.lock().devices.is_empty()
    }

    pub(crate) fn populate_reply(&self, reply: &mut Reply, connected: bool) {
        reply.status = STATUS_OK;
        reply.latency_ms = self.context.nominal_latency_ms();
        if !connected {
            reply.observable = Position::unknown();
            return;
        }
        let mut position = Position {
            frames: self.frames.load(Ordering::Acquire),
            time_ns: monotonic_ns(),
        };
        if let Err(err) = self.shared.lock().driver.refine_position(&mut position) {
            tracing::warn!(%err, "driver could not refine the stream position");
        }
        reply.observable = position;
    }

    pub(crate) fn wrong_state(&self, reply: &mut Reply, command: Command) {
        tracing::warn!(
            command = command.name(),
            state = %self.state,
            "command is not allowed in the current state"
        );
        reply.status = STATUS_INVALID_OPERATION;
    }

    /// Moves the stream to `ERROR` and reports the driver status to the client.
    pub(crate) fn fail(&mut self, reply: &mut Reply, err: DriverError) {
        tracing::error!(
            %err,
            state = %self.state,
            port_config_id = self.context.port_config_id,
            "driver call failed"
        );
        self.state = StreamState::Error;
        reply.status = err.status();
        if let Some(callback) = &self.context.callback {
            callback.on_error();
        }
    }

    /// Runs a state-changing driver call. Returns true and fills the reply on success.
    pub(crate) fn call_driver(
        &mut self,
        reply: &mut Reply,
        connected: bool,
        call: impl FnOnce(&mut dyn Driver) -> hal_io::Result<()>,
    ) -> bool {
        let result = call(&mut *self.shared.lock().driver);
        match result {
            Ok(()) => {
                self.populate_reply(reply, connected);
                true
            }
            Err(err) => {
                self.fail(reply, err);
                false
            }
        }
    }

    /// Hands the first `frames` frames of the local buffer to the driver.
    pub(crate) fn transfer(&mut self, frames: usize) -> hal_io::Result<Transfer> {
        let bytes = frames * self.context.frame_size;
        let mut shared = self.shared.lock();
        let mut transfer = shared.driver.transfer(&mut self.buffer[..bytes], frames)?;
        transfer.actual_frames = transfer.actual_frames.min(frames);
        Ok(transfer)
    }

    /// Frames are counted whether or not a device is connected.
    pub(crate) fn advance(&self, frames: usize) {
        let frames = i64::try_from(frames).unwrap_or(i64::MAX);
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    /// Occupies the time a device would need for `frames`.
    pub(crate) fn simulate_delay(&self, frames: usize) {
        if frames == 0 || self.context.sample_rate == 0 {
            return;
        }
        let seconds = frames as f64 / f64::from(self.context.sample_rate);
        thread::sleep(Duration::from_secs_f64(seconds));
    }

    /// Without a callback the delay is spent inline and the state resolves
    /// before the reply is produced.
    pub(crate) fn switch_to_transient(&mut self, state: StreamState) {
        self.state = state;
        self.transient_since = Instant::now();
        if self.context.callback.is_none() {
            thread::sleep(self.context.transient_state_delay);
            self.resolve_transient_state();
        }
    }

    pub(crate) fn resolve_transient_state(&mut self) {
        if !self.state.is_transient()
            || self.transient_since.elapsed() < self.context.transient_state_delay
        {
            return;
        }
        let callback = self.context.callback.clone();
        match self.state {
            StreamState::Draining => {
                self.state = StreamState::Idle;
                if let Some(callback) = callback {
                    callback.on_drain_ready();
                }
            }
            StreamState::Transferring => {
                self.state = StreamState::Active;
                if let Some(callback) = callback {
                    callback.on_transfer_ready();
                }
            }
            _ => return,
        }
        tracing::debug!(state = %self.state, "transient state resolved");
    }
}

pub(crate) struct Worker<L> {
    core: WorkerCore,
    logic: L,
    commands: QueueReader<Command>,
    replies: QueueWriter<Reply>,
    cookie: u64,
}

impl<L: WorkerLogic> Worker<L> {
    pub(crate) fn new(
        core: WorkerCore,
        logic: L,
        commands: QueueReader<Command>,
        replies: QueueWriter<Reply>,
        cookie: u64,
    ) -> Self {
        Self {
            core,
            logic,
            commands,
            replies,
            cookie,
        }
    }

    /// Serves commands until a valid exit command arrives or a queue peer goes
    /// away. Returns the last state.
    pub(crate) fn run(mut self) -> StreamState {
        let exit_token = self.cookie ^ thread_token(thread::current().id());
        let port_config_id = self.core.context.port_config_id;
        tracing::debug!(port_config_id, "stream worker started");
        loop {
            let command = match self.commands.read_blocking() {
                Ok(command) => command,
                Err(err) => {
                    tracing::debug!(%err, port_config_id, "command queue closed");
                    break;
                }
            };
            // A pending transient state completes before the next command is served.
            if L::RESOLVES_TRANSIENT_STATES {
                self.core.resolve_transient_state();
            }
            let reply = match command {
                Command::HalReservedExit(token) if token == exit_token => break,
                Command::HalReservedExit(_) => {
                    tracing::warn!(port_config_id, "exit command has a bad cookie");
                    Reply {
                        state: self.core.state,
                        ..Reply::default()
                    }
                }
                command => self.logic.handle(&mut self.core, command),
            };
            if let Err(err) = self.replies.write_blocking(reply) {
                tracing::debug!(%err, port_config_id, "reply queue closed");
                break;
            }
        }
        tracing::debug!(port_config_id, state = %self.core.state, "stream worker exiting");
        self.core.state
    }
}
