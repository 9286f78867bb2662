//! Transport primitives shared by stream workers and their clients.

pub mod callback;
pub mod data;
pub mod descriptor;
pub mod protocol;
pub mod queue;

pub use callback::{CallbackHandle, StreamCallback};
pub use data::{data_queue, DataReader, DataWriter};
pub use descriptor::{AudioEndpoint, StreamDescriptor};
pub use protocol::{
    Command, DrainMode, Position, Reply, StreamState, STATUS_BAD_VALUE, STATUS_INVALID_OPERATION,
    STATUS_NOT_ENOUGH_DATA, STATUS_OK,
};
pub use queue::{message_queue, QueueError, QueueReader, QueueWriter};
