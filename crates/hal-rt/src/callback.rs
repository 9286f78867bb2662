//! One-way notifications from a playback worker to its client.

use std::sync::Arc;

/// Callback channel supplied by clients that want asynchronous completion.
///
/// Notifications are issued from the stream worker thread, so implementations
/// must not block for long.
pub trait StreamCallback: Send + Sync {
    fn on_transfer_ready(&self);
    fn on_drain_ready(&self);
    fn on_error(&self) {}
}

pub type CallbackHandle = Arc<dyn StreamCallback>;
