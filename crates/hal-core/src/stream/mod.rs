//! Stream sessions: one worker thread per open stream serving the client
//! command protocol.

mod capture;
mod context;
mod playback;
mod session;
mod worker;

pub use context::{OffloadInfo, OpenStreamArgs, StreamContext};
pub use session::StreamSession;
