//! Client-side endpoints of an open stream.

use crate::data::{DataReader, DataWriter};
use crate::protocol::{Command, Reply};
use crate::queue::{QueueError, QueueReader, QueueWriter};

/// Data endpoint handed to the client. Capture clients read, playback clients write.
pub enum AudioEndpoint {
    Capture(DataReader),
    Playback(DataWriter),
}

/// Everything a client needs to drive an open stream.
pub struct StreamDescriptor {
    pub command: QueueWriter<Command>,
    pub reply: QueueReader<Reply>,
    pub frame_size_bytes: usize,
    pub buffer_size_frames: usize,
    pub audio: AudioEndpoint,
}

impl StreamDescriptor {
    /// Writes one command and blocks for its reply.
    pub fn send(&self, command: Command) -> Result<Reply, QueueError> {
        self.command.write_blocking(command)?;
        self.reply.read_blocking()
    }

    pub fn capture_data(&mut self) -> Option<&mut DataReader> {
        match &mut self.audio {
            AudioEndpoint::Capture(reader) => Some(reader),
            AudioEndpoint::Playback(_) => None,
        }
    }

    pub fn playback_data(&mut self) -> Option<&mut DataWriter> {
        match &mut self.audio {
            AudioEndpoint::Playback(writer) => Some(writer),
            AudioEndpoint::Capture(_) => None,
        }
    }

    pub fn buffer_size_bytes(&self) -> usize {
        self.frame_size_bytes * self.buffer_size_frames
    }
}
