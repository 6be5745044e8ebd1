pub mod control;
pub mod streamer;

pub use control::{ControlReceiver, ControlTransport};
pub use streamer::StreamerTransport;
