//! One TCP session with the gateway: connect, request/reply exchange, close.
//!
//! The session is either connected (socket halves present) or disconnected.
//! Every transport failure closes the socket before the error is returned, so the
//! next exchange always starts on a fresh connection. Gateway-level rejections
//! keep the connection.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::protocol::{classify_reply, ReplyKind, TERMINATOR};

/// Default bound for connect, write, and read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on port {}", self.host, self.port)
    }
}

/// How to treat a reply that is neither `completeir` nor `ERR`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyPolicy {
    /// Log it and count it as success.
    #[default]
    Lenient,
    /// Fail with [`SendError::UnexpectedReply`].
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Applied separately to connect, write, and read.
    pub timeout: Duration,
    pub reply_policy: ReplyPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            reply_policy: ReplyPolicy::default(),
        }
    }
}

/// Socket-level failures. The session is disconnected after any of these.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("connection refused, check host name or IP address")]
    ConnectionRefused,
    #[error("connect failed: {0}")]
    ConnectError(#[source] io::Error),
    #[error("failed to send command: {0}")]
    SendFailed(#[source] io::Error),
    #[error("receive timed out")]
    ReceiveTimeout,
    #[error("incomplete read, probably disconnected")]
    ReceiveIncomplete,
    #[error("empty reply")]
    ReceiveEmpty,
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The gateway answered with `ERR`; the connection is still usable.
    #[error("iTach error {code}")]
    Gateway { code: String },
    /// Strict policy only; the connection is still usable.
    #[error("unexpected reply {0:?}")]
    UnexpectedReply(String),
}

/// A successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Complete,
    /// Unrecognised reply accepted under [`ReplyPolicy::Lenient`].
    Other(String),
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    /// Write one request and read one terminated reply, each bounded by `limit`.
    async fn exchange(&mut self, line: &str, limit: Duration) -> Result<Vec<u8>, TransportError> {
        let write = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        };
        match timeout(limit, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(TransportError::SendFailed(e)),
            Err(_) => {
                return Err(TransportError::SendFailed(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "write timed out",
                )))
            }
        }

        let mut reply = Vec::new();
        let read = timeout(limit, self.reader.read_until(TERMINATOR, &mut reply)).await;
        match read {
            Err(_) => Err(TransportError::ReceiveTimeout),
            Ok(Err(e)) => Err(TransportError::ReceiveFailed(e)),
            Ok(Ok(0)) => Err(TransportError::ReceiveEmpty),
            Ok(Ok(_)) if reply.last() != Some(&TERMINATOR) => Err(TransportError::ReceiveIncomplete),
            Ok(Ok(_)) => Ok(reply),
        }
    }
}

pub struct GatewaySession {
    endpoint: Endpoint,
    options: SessionOptions,
    conn: Option<Connection>,
    /// Set while a request is on the wire. Still set on entry means the last
    /// exchange was dropped midway and the stream state is unknown.
    in_flight: bool,
}

impl fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySession")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl GatewaySession {
    pub fn new(endpoint: Endpoint, options: SessionOptions) -> Self {
        Self {
            endpoint,
            options,
            conn: None,
            in_flight: false,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.options.timeout
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open a fresh connection, dropping any existing one.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        log::debug!("connecting to {}", self.endpoint);
        self.conn = None;
        self.in_flight = false;

        let addr = (self.endpoint.host.as_str(), self.endpoint.port);
        let stream = match timeout(self.options.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                log::error!(
                    "cannot connect to iTach host {}, connection refused, check host name or IP address",
                    self.endpoint
                );
                return Err(TransportError::ConnectionRefused);
            }
            Ok(Err(e)) => {
                log::error!("cannot connect to iTach host {}: {}", self.endpoint, e);
                return Err(TransportError::ConnectError(e));
            }
            Err(_) => {
                log::error!(
                    "cannot connect to iTach host {}, a timeout occurred",
                    self.endpoint
                );
                return Err(TransportError::ConnectTimeout);
            }
        };

        let (reader, writer) = stream.into_split();
        self.conn = Some(Connection {
            reader: BufReader::new(reader),
            writer,
        });
        log::debug!("connected to iTach host {}", self.endpoint);
        Ok(())
    }

    /// Send one request line and wait for the gateway's reply, connecting first if needed.
    pub async fn send_and_await_reply(&mut self, line: &str) -> Result<Ack, SendError> {
        if self.in_flight {
            log::warn!(
                "previous exchange with {} was interrupted, rebuilding connection",
                self.endpoint
            );
            self.close().await;
        }
        if self.conn.is_none() {
            self.connect().await?;
        }

        log::debug!("sending command to {}", self.endpoint);
        self.in_flight = true;
        let outcome = match self.conn.as_mut() {
            Some(conn) => conn.exchange(line, self.options.timeout).await,
            None => Err(TransportError::ConnectError(io::Error::from(
                io::ErrorKind::NotConnected,
            ))),
        };
        self.in_flight = false;

        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("exchange with {} failed: {}", self.endpoint, e);
                self.close().await;
                return Err(e.into());
            }
        };
        log::debug!(
            "result from {} is {:?}",
            self.endpoint,
            String::from_utf8_lossy(&reply)
        );

        match classify_reply(&reply) {
            ReplyKind::Complete => {
                log::debug!("command sent to {}", self.endpoint);
                Ok(Ack::Complete)
            }
            ReplyKind::Error { code } => {
                log::error!(
                    "error sending command to {}, iTach error {}",
                    self.endpoint,
                    code
                );
                Err(SendError::Gateway { code })
            }
            ReplyKind::Empty => {
                log::error!("empty reply from {}", self.endpoint);
                self.close().await;
                Err(TransportError::ReceiveEmpty.into())
            }
            ReplyKind::Unexpected(text) => match self.options.reply_policy {
                ReplyPolicy::Lenient => {
                    log::warn!(
                        "unexpected result from command to {}, result was {:?}",
                        self.endpoint,
                        text
                    );
                    Ok(Ack::Other(text))
                }
                ReplyPolicy::Strict => {
                    log::error!(
                        "unexpected result from command to {}, result was {:?}",
                        self.endpoint,
                        text
                    );
                    Err(SendError::UnexpectedReply(text))
                }
            },
        }
    }

    /// Drop the connection. Shutdown errors are logged and ignored.
    pub async fn close(&mut self) {
        self.in_flight = false;
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        log::debug!("closing socket to {}", self.endpoint);
        match timeout(self.options.timeout, conn.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("error while closing socket to {}: {}", self.endpoint, e),
            Err(_) => log::warn!("timed out closing socket to {}", self.endpoint),
        }
    }
}
