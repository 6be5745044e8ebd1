//!
//! Protocol engine for the Xbox One NANO gamestreaming client: paired
//! TCP/UDP transports, the session bring-up state machine, and the
//! per-channel state machines that feed a renderer and carry controller
//! input upstream.
//!

use thiserror::Error;

use nano_protocol::CodecError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("{0}")]
    Codec(#[from] CodecError),
    #[error("transport closed: {0}")]
    TransportClosed(#[from] std::io::Error),
    #[error("handshake timed out")]
    HandshakeTimeout,
}

pub mod channel;
pub mod client;
pub mod session;
pub mod time;
pub mod transport;
