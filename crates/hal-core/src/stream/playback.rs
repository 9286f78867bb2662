use hal_rt::{Command, DataReader, DrainMode, Reply, StreamState, STATUS_NOT_ENOUGH_DATA};

use super::worker::{WorkerCore, WorkerLogic};

/// Playback: the worker consumes audio from the data queue.
///
/// `DRAINING` and `TRANSFERRING` complete asynchronously when the client
/// registered a callback, which is why pausing keeps three distinct paused
/// states.
pub(crate) struct PlaybackLogic {
    data: DataReader,
}

impl PlaybackLogic {
    pub(crate) fn new(data: DataReader) -> Self {
        Self { data }
    }

    /// Drains everything the client queued; only `min(request, queued, buffer)`
    /// bytes are played and counted.
    fn write(
        &mut self,
        core: &mut WorkerCore,
        client_size: usize,
        reply: &mut Reply,
        connected: bool,
    ) -> hal_io::Result<()> {
        let frame_size = core.context.frame_size;
        let queued = self.data.available_to_read().min(core.buffer.len());
        let mut latency = core.context.nominal_latency_ms();
        if queued > 0 && !self.data.read(&mut core.buffer[..queued]) {
            tracing::warn!(queued, "reading from the data queue failed");
            reply.status = STATUS_NOT_ENOUGH_DATA;
            reply.latency_ms = latency;
            return Ok(());
        }
        let mut byte_count = client_size.min(queued);
        if core.context.vendor_debug.force_transient_burst && byte_count >= frame_size {
            byte_count -= frame_size;
        }
        let frames = byte_count / frame_size;
        let actual_frames = if connected {
            let transfer = core.transfer(frames)?;
            latency = transfer.latency_ms;
            transfer.actual_frames
        } else {
            core.simulate_delay(frames);
            frames
        };
        core.advance(actual_frames);
        core.populate_reply(reply, connected);
        reply.fmq_byte_count = i32::try_from(actual_frames * frame_size).unwrap_or(i32::MAX);
        reply.latency_ms = latency;
        Ok(())
    }

    fn burst(&mut self, core: &mut WorkerCore, count: i32, reply: &mut Reply, connected: bool) {
        let Ok(size) = usize::try_from(count) else {
            tracing::warn!(count, "negative burst byte count");
            return;
        };
        if matches!(
            core.state,
            StreamState::Error | StreamState::Transferring | StreamState::TransferPaused
        ) {
            core.wrong_state(reply, Command::Burst(count));
            return;
        }
        if let Err(err) = self.write(core, size, reply, connected) {
            core.fail(reply, err);
            return;
        }
        let has_callback = core.context.callback.is_some();
        match core.state {
            StreamState::DrainPaused if has_callback => core.state = StreamState::TransferPaused,
            StreamState::Standby | StreamState::Paused | StreamState::DrainPaused => {
                core.state = StreamState::Paused
            }
            StreamState::Idle | StreamState::Draining | StreamState::Active => {
                if has_callback && reply.fmq_byte_count != count {
                    core.switch_to_transient(StreamState::Transferring);
                } else {
                    core.state = StreamState::Active;
                }
            }
            _ => {}
        }
    }
}

impl WorkerLogic for PlaybackLogic {
    const RESOLVES_TRANSIENT_STATES: bool = true;

    fn handle(&mut self, core: &mut WorkerCore, command: Command) -> Reply {
        let mut reply = Reply::default();
        let connected = core.is_connected();
        match command {
            Command::HalReservedExit(_) => {}
            Command::GetStatus => core.populate_reply(&mut reply, connected),
            Command::Start => {
                let next = match core.state {
                    StreamState::Standby => Some(StreamState::Idle),
                    StreamState::Paused => Some(StreamState::Active),
                    StreamState::DrainPaused => Some(StreamState::Draining),
                    StreamState::TransferPaused => Some(StreamState::Transferring),
                    _ => None,
                };
                match next {
                    Some(next) => {
                        if core.call_driver(&mut reply, connected, |driver| driver.start()) {
                            if next.is_transient() {
                                core.switch_to_transient(next);
                            } else {
                                core.state = next;
                            }
                        }
                    }
                    None => core.wrong_state(&mut reply, command),
                }
            }
            Command::Burst(count) => self.burst(core, count, &mut reply, connected),
            Command::Drain(DrainMode::Unspecified) => {
                tracing::warn!("playback streams need an explicit drain mode");
            }
            Command::Drain(mode) => match core.state {
                StreamState::Active | StreamState::Transferring => {
                    let synchronous = core.state == StreamState::Active
                        && core.context.vendor_debug.force_synchronous_drain;
                    if core.call_driver(&mut reply, connected, |driver| driver.drain(mode)) {
                        if synchronous {
                            core.state = StreamState::Idle;
                        } else {
                            core.switch_to_transient(StreamState::Draining);
                        }
                    }
                }
                StreamState::TransferPaused => {
                    core.populate_reply(&mut reply, connected);
                    core.state = StreamState::DrainPaused;
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
            Command::Pause => {
                let next = match core.state {
                    StreamState::Active => Some(StreamState::Paused),
                    StreamState::Draining => Some(StreamState::DrainPaused),
                    StreamState::Transferring => Some(StreamState::TransferPaused),
                    _ => None,
                };
                match next {
                    Some(next) => {
                        if core.call_driver(&mut reply, connected, |driver| driver.pause()) {
                            core.state = next;
                        }
                    }
                    None => core.wrong_state(&mut reply, command),
                }
            }
            Command::Flush => match core.state {
                StreamState::Paused | StreamState::DrainPaused | StreamState::TransferPaused => {
                    if core.call_driver(&mut reply, connected, |driver| driver.flush()) {
                        core.state = StreamState::Idle;
                    }
                }
                _ => core.wrong_state(&mut reply, command),
            },
        }
        reply.state = core.state;
        reply
    }
}
