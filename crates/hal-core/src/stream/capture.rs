use hal_rt::{Command, DataWriter, DrainMode, Reply, StreamState, STATUS_NOT_ENOUGH_DATA};

use super::worker::{WorkerCore, WorkerLogic};

/// Capture: the worker produces audio into the data queue.
pub(crate) struct CaptureLogic {
    data: DataWriter,
}

impl CaptureLogic {
    pub(crate) fn new(data: DataWriter) -> Self {
        Self { data }
    }

    fn read(
        &mut self,
        core: &mut WorkerCore,
        client_size: usize,
        reply: &mut Reply,
        connected: bool,
    ) -> hal_io::Result<()> {
        let frame_size = core.context.frame_size;
        let byte_count = client_size
            .min(self.data.available_to_write())
            .min(core.buffer.len());
        let frames = byte_count / frame_size;
        let mut latency = core.context.nominal_latency_ms();
        let actual_frames = if connected {
            let transfer = core.transfer(frames)?;
            latency = transfer.latency_ms;
            transfer.actual_frames
        } else {
            core.buffer[..frames * frame_size].fill(0);
            core.simulate_delay(frames);
            frames
        };
        let actual_bytes = actual_frames * frame_size;
        if actual_bytes == 0 || self.data.write(&core.buffer[..actual_bytes]) {
            core.advance(actual_frames);
            core.populate_reply(reply, connected);
            reply.fmq_byte_count = i32::try_from(actual_bytes).unwrap_or(i32::MAX);
        } else {
            tracing::warn!(actual_bytes, "writing to the data queue failed");
            reply.status = STATUS_NOT_ENOUGH_DATA;
        }
        reply.latency_ms = latency;
        Ok(())
    }
}

impl WorkerLogic for CaptureLogic {
    const RESOLVES_TRANSIENT_STATES: bool = false;

    fn handle(&mut self, core: &mut WorkerCore, command: Command) -> Reply {
        let mut reply = Reply::default();
        let connected = core.is_connected();
        match command {
            Command::HalReservedExit(_) => {}
            Command::GetStatus => core.populate_reply(&mut reply, connected),
            Command::Start => match core.state {
                StreamState::Standby | StreamState::Draining => {
                    let next = if core.state == StreamState::Standby {
                        StreamState::Idle
                    } else {
                        StreamState::Active
                    };
                    if core.call_driver(&mut reply, connected, |driver| driver.start()) {
                        core.state = next;
                    }
                }
                _ => core.wrong_state(&mut reply, command),
            },
            Command::Burst(count) => match usize::try_from(count) {
                Err(_) => tracing::warn!(count, "negative burst byte count"),
                Ok(_)
                    if !matches!(
                        core.state,
                        StreamState::Idle
                            | StreamState::Active
                            | StreamState::Paused
                            | StreamState::Draining
                    ) =>
                {
                    core.wrong_state(&mut reply, command)
                }
                Ok(size) => match self.read(core, size, &mut reply, connected) {
                    Ok(()) => {
                        core.state = match core.state {
                            StreamState::Idle | StreamState::Paused => StreamState::Active,
                            // The buffer is always reported drained after one burst.
                            StreamState::Draining => StreamState::Standby,
                            state => state,
                        }
                    }
                    Err(err) => core.fail(&mut reply, err),
                },
            },
            Command::Drain(mode) if mode != DrainMode::Unspecified => {
                tracing::warn!(?mode, "capture streams only accept an unspecified drain mode");
            }
            Command::Drain(mode) => match core.state {
                StreamState::Active => {
                    if core.call_driver(&mut reply, connected, |driver| driver.drain(mode)) {
                        core.state = StreamState::Draining;
                    }
                }
                _ => core.wrong_state(&mut reply, command),
            },
            Command::Standby => match core.state {
                StreamState::Idle => {
                    if core.call_driver(&mut reply, connected, |driver| driver.standby()) {
                        core.state = StreamState::Standby;
                    }
                }
                _ => core.wrong_state(&mut reply, command),
            },
            Command::Pause => match core.state {
                StreamState::Active => {
                    if core.call_driver(&mut reply, connected, |driver| driver.pause()) {
                        core.state = StreamState::Paused;
                    }
                }
                _ => core.wrong_state(&mut reply, command),
            },
            Command::Flush => match core.state {
                StreamState::Paused => {
                    if core.call_driver(&mut reply, connected, |driver| driver.flush()) {
                        core.state = StreamState::Standby;
                    }
                }
                _ => core.wrong_state(&mut reply, command),
            },
        }
        reply.state = core.state;
        reply
    }
}
