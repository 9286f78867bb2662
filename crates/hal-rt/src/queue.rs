//! Bounded blocking queues for stream commands and replies.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is empty")]
    Empty,
    #[error("queue peer has been dropped")]
    Disconnected,
}

/// Writing end of a bounded message queue.
#[derive(Debug)]
pub struct QueueWriter<T> {
    sender: Sender<T>,
}

// Derived `Clone` would require `T: Clone`.
impl<T> Clone for QueueWriter<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Reading end of a bounded message queue.
#[derive(Debug)]
pub struct QueueReader<T> {
    receiver: Receiver<T>,
}

/// Creates a bounded queue. Both blocking calls wait without a timeout.
pub fn message_queue<T>(capacity: usize) -> (QueueWriter<T>, QueueReader<T>) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (QueueWriter { sender }, QueueReader { receiver })
}

impl<T> QueueWriter<T> {
    /// Blocks until there is room for `value`.
    pub fn write_blocking(&self, value: T) -> Result<(), QueueError> {
        self.sender.send(value).map_err(|_| {
            tracing::debug!("message queue reader is gone");
            QueueError::Disconnected
        })
    }

    pub fn try_write(&self, value: T) -> Result<(), QueueError> {
        self.sender.try_send(value).map_err(|err| match err {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Disconnected(_) => QueueError::Disconnected,
        })
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or(usize::MAX)
    }
}

impl<T> QueueReader<T> {
    /// Blocks until a message arrives or every writer is gone.
    pub fn read_blocking(&self) -> Result<T, QueueError> {
        self.receiver.recv().map_err(|_| {
            tracing::debug!("message queue writers are gone");
            QueueError::Disconnected
        })
    }

    pub fn try_read(&self) -> Result<T, QueueError> {
        self.receiver.try_recv().map_err(|err| match err {
            TryRecvError::Empty => QueueError::Empty,
            TryRecvError::Disconnected => QueueError::Disconnected,
        })
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
