use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use hal_graph::{AudioDevice, Direction, PortId};
use hal_io::Driver;
use hal_rt::{
    data_queue, message_queue, AudioEndpoint, Command, QueueWriter, StreamDescriptor, StreamState,
};
use parking_lot::Mutex;

use super::capture::CaptureLogic;
use super::context::StreamContext;
use super::playback::PlaybackLogic;
use super::worker::{thread_token, Shared, Worker, WorkerCore};
use crate::error::{HalError, Result};
use crate::latency::LatencyMetrics;

struct Control {
    worker: Option<JoinHandle<StreamState>>,
    exit: Option<QueueWriter<Command>>,
    exit_token: u64,
    closed: bool,
    state_prior_to_closing: Option<StreamState>,
}

/// An open stream: its worker thread, driver and transport queues.
///
/// The session must be closed explicitly. Dropping an open session stops the
/// worker as well but is reported as an error.
pub struct StreamSession {
    context: StreamContext,
    shared: Arc<Mutex<Shared>>,
    frames: Arc<AtomicI64>,
    control: Mutex<Control>,
    descriptor: Mutex<Option<StreamDescriptor>>,
}

impl StreamSession {
    /// Initializes the driver, creates the queues and starts the worker.
    pub(crate) fn open(context: StreamContext, mut driver: Box<dyn Driver>) -> Result<Arc<Self>> {
        driver.init()?;
        let (command_writer, command_reader) = message_queue(context.queues.command_capacity);
        let (reply_writer, reply_reader) = message_queue(context.queues.reply_capacity);
        let (data_writer, data_reader) = data_queue(context.buffer_size_bytes());
        let shared = Arc::new(Mutex::new(Shared {
            driver,
            devices: Vec::new(),
        }));
        let frames = Arc::new(AtomicI64::new(0));
        let cookie: u64 = rand::random();

        let core = WorkerCore::new(context.clone(), Arc::clone(&shared), Arc::clone(&frames));
        let builder = thread::Builder::new().name(format!("hal-stream-{}", context.port_config_id));
        let (audio, spawned) = match context.direction {
            Direction::Input => {
                let logic = CaptureLogic::new(data_writer);
                let worker = Worker::new(core, logic, command_reader, reply_writer, cookie);
                (AudioEndpoint::Capture(data_reader), builder.spawn(move || worker.run()))
            }
            Direction::Output => {
                let logic = PlaybackLogic::new(data_reader);
                let worker = Worker::new(core, logic, command_reader, reply_writer, cookie);
                (AudioEndpoint::Playback(data_writer), builder.spawn(move || worker.run()))
            }
        };
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                shared.lock().driver.shutdown();
                return Err(HalError::Internal(format!("failed to spawn stream worker: {err}")));
            }
        };
        let exit_token = cookie ^ thread_token(handle.thread().id());
        tracing::info!(
            port_config_id = context.port_config_id,
            direction = ?context.direction,
            frame_size = context.frame_size,
            buffer_size_frames = context.buffer_size_frames,
            "opened stream"
        );

        let descriptor = StreamDescriptor {
            command: command_writer.clone(),
            reply: reply_reader,
            frame_size_bytes: context.frame_size,
            buffer_size_frames: context.buffer_size_frames,
            audio,
        };
        Ok(Arc::new(Self {
            context,
            shared,
            frames,
            control: Mutex::new(Control {
                worker: Some(handle),
                exit: Some(command_writer),
                exit_token,
                closed: false,
                state_prior_to_closing: None,
            }),
            descriptor: Mutex::new(Some(descriptor)),
        }))
    }

    /// Client endpoints of the stream. Handed out once.
    pub fn descriptor(&self) -> Option<StreamDescriptor> {
        self.descriptor.lock().take()
    }

    pub fn context(&self) -> &StreamContext {
        &self.context
    }

    pub fn port_config_id(&self) -> PortId {
        self.context.port_config_id
    }

    pub fn latency(&self) -> LatencyMetrics {
        self.context.latency
    }

    /// Frames moved since the stream was opened. Never decreases.
    pub fn frame_count(&self) -> i64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn connected_devices(&self) -> Vec<AudioDevice> {
        self.shared.lock().devices.clone()
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.lock().devices.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.control.lock().closed
    }

    /// Last state of the worker, available once the stream is closed.
    pub fn state_prior_to_closing(&self) -> Option<StreamState> {
        self.control.lock().state_prior_to_closing
    }

    /// Replaces the device list seen by the worker. An empty list disconnects
    /// the stream.
    pub fn set_connected_devices(&self, devices: &[AudioDevice]) -> Result<()> {
        if self.is_closed() {
            return Err(HalError::state("stream is closed"));
        }
        let mut shared = self.shared.lock();
        shared.driver.set_connected_devices(devices)?;
        shared.devices = devices.to_vec();
        tracing::debug!(
            port_config_id = self.context.port_config_id,
            devices = devices.len(),
            "updated stream devices"
        );
        Ok(())
    }

    /// Stops the worker, shuts the driver down and releases the queues.
    pub fn close(&self) -> Result<()> {
        let mut control = self.control.lock();
        if control.closed {
            return Err(HalError::state("stream is already closed"));
        }
        control.closed = true;
        self.stop_worker(&mut control)
    }

    fn stop_worker(&self, control: &mut Control) -> Result<()> {
        let Some(worker) = control.worker.take() else {
            return Ok(());
        };
        if let Some(exit) = control.exit.take() {
            if let Err(err) = exit.write_blocking(Command::HalReservedExit(control.exit_token)) {
                tracing::debug!(%err, "stream worker has already stopped");
            }
        }
        let state = worker
            .join()
            .map_err(|_| HalError::Internal("stream worker panicked".into()))?;
        control.state_prior_to_closing = Some(state);
        self.shared.lock().driver.shutdown();
        self.descriptor.lock().take();
        tracing::info!(
            port_config_id = self.context.port_config_id,
            state = %state,
            "closed stream"
        );
        Ok(())
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let mut control = self.control.lock();
        if control.closed {
            return;
        }
        tracing::error!(
            port_config_id = self.context.port_config_id,
            "stream session dropped while open"
        );
        control.closed = true;
        if let Err(err) = self.stop_worker(&mut control) {
            tracing::error!(?err, "failed to stop stream worker");
        }
    }
}
