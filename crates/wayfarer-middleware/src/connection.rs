//! [`ConnectionManager`] – the agent's single duplex stream to the server.
//!
//! # Framing
//!
//! The world server writes one JSON document per TCP write and adds no
//! length prefix or delimiter.  Under [`Framing::Raw`] (the default) the
//! manager mirrors that convention: every successful read of up to
//! [`MAX_CHUNK_BYTES`] is handed out as one message, and every `send` is one
//! write.  TCP is free to split or coalesce segments, so a large or bursty
//! peer can break this assumption; raw mode does not try to repair it.
//!
//! [`Framing::NewlineDelimited`] is the hardened alternative for servers
//! that speak newline-delimited JSON: outbound documents get a trailing
//! `\n`, and inbound bytes are buffered until a full line is available.
//! A line still unterminated after [`MAX_LINE_BYTES`] is dropped and
//! reported as [`ConnectionError::Io`] with [`io::ErrorKind::InvalidData`].
//! Payload shapes are identical in both modes.
//!
//! Only one read is ever outstanding; callers hold the manager by `&mut`.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use wayfarer_types::AgentError;

/// Upper bound for a single inbound read.
pub const MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Longest line buffered in newline-delimited mode.
pub const MAX_LINE_BYTES: usize = 4 * MAX_CHUNK_BYTES;

#[derive(Error, Debug)]
pub enum ConnectionError {
    /// DNS resolution or TCP handshake failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// The peer closed the stream, or the manager was already disconnected.
    #[error("stream closed by peer")]
    StreamClosed,
    #[error("transport fault: {0}")]
    Io(#[from] io::Error),
    #[error("no data received within {0:?}")]
    Timeout(Duration),
}

impl From<ConnectionError> for AgentError {
    fn from(e: ConnectionError) -> Self {
        AgentError::Connection(e.to_string())
    }
}

/// Message boundary convention on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// One read chunk is one message; one write is one message.
    #[default]
    Raw,
    /// Messages are terminated by `\n`.
    NewlineDelimited,
}

pub struct ConnectionManager {
    stream: Option<TcpStream>,
    peer: String,
    framing: Framing,
    read_timeout: Option<Duration>,
    /// Bytes received but not yet returned (newline-delimited mode only).
    pending: Vec<u8>,
}

impl ConnectionManager {
    /// Open the stream to `host:port` using raw framing and no read timeout.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ConnectionError> {
        Self::connect_with(host, port, Framing::Raw, None).await
    }

    pub async fn connect_with(
        host: &str,
        port: u16,
        framing: Framing,
        read_timeout: Option<Duration>,
    ) -> Result<Self, ConnectionError> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        info!(peer = %addr, ?framing, "connected to world server");
        Ok(Self {
            stream: Some(stream),
            peer: addr,
            framing,
            read_timeout,
            pending: Vec::new(),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Wait for the next inbound message.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::StreamClosed`] when the peer has closed the stream
    /// (or `disconnect` was called), [`ConnectionError::Timeout`] when a read
    /// timeout is configured and elapses, [`ConnectionError::Io`] on an
    /// oversized line or any other transport fault.
    pub async fn receive(&mut self) -> Result<Vec<u8>, ConnectionError> {
        match self.framing {
            Framing::Raw => self.read_chunk().await,
            Framing::NewlineDelimited => loop {
                if let Some(line) = self.take_line() {
                    return Ok(line);
                }
                if self.pending.len() > MAX_LINE_BYTES {
                    let dropped = self.pending.len();
                    self.pending.clear();
                    warn!(dropped, limit = MAX_LINE_BYTES, "inbound line too long; dropping buffer");
                    return Err(ConnectionError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("line exceeds {MAX_LINE_BYTES} bytes without a newline"),
                    )));
                }
                let chunk = self.read_chunk().await?;
                self.pending.extend_from_slice(&chunk);
            },
        }
    }

    /// Write one complete JSON document.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let framing = self.framing;
        let stream = self.stream.as_mut().ok_or(ConnectionError::StreamClosed)?;
        match framing {
            Framing::Raw => stream.write_all(bytes).await?,
            Framing::NewlineDelimited => {
                let mut framed = Vec::with_capacity(bytes.len() + 1);
                framed.extend_from_slice(bytes);
                framed.push(b'\n');
                stream.write_all(&framed).await?;
            }
        }
        stream.flush().await?;
        debug!(len = bytes.len(), "sent message");
        Ok(())
    }

    /// Shut the stream down.  Safe to call more than once.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "error while shutting down stream");
            }
            info!(peer = %self.peer, "disconnected from world server");
        }
        self.pending.clear();
    }

    async fn read_chunk(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::StreamClosed)?;
        let mut buf = vec![0u8; MAX_CHUNK_BYTES];
        let read = stream.read(&mut buf);
        let n = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ConnectionError::Timeout(limit))??,
            None => read.await?,
        };
        if n == 0 {
            return Err(ConnectionError::StreamClosed);
        }
        buf.truncate(n);
        debug!(len = n, "received chunk");
        Ok(buf)
    }

    /// Pop the next non-empty line out of the pending buffer.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
        None
    }
}
