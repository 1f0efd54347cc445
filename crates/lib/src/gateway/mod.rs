//! Gateway: TCP session with the iTach and the client façade on top of it.
//!
//! One request line out, one CR-terminated reply back. The client resolves device
//! commands, owns the session, and retries a failed send once.

mod client;
mod protocol;
mod session;

pub use client::{ClientError, GatewayClient};
pub use protocol::{classify_reply, ReplyKind, DEFAULT_PORT, TERMINATOR};
pub use session::{
    Ack, Endpoint, GatewaySession, ReplyPolicy, SendError, SessionOptions, TransportError,
    DEFAULT_TIMEOUT,
};
