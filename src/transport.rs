//! The byte channel between the engine and whatever drives the radio.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::TransportError;

/// A bidirectional channel carrying one JSON frame per message.
///
/// The engine owns its transport exclusively and polls `next_message` inside a
/// `select!`, so implementations must make it cancel safe: a dropped future
/// must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Writes one outbound frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Waits for the next inbound frame; `None` once the peer has closed.
    async fn next_message(&mut self) -> Result<Option<String>, TransportError>;
}

/// In-process transport backed by a pair of unbounded channels.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
}

/// The far end of a [`ChannelTransport`], standing in for the radio.
///
/// Dropping the peer closes the transport.
#[derive(Debug)]
pub struct TransportPeer {
    commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<String>,
}

/// Creates a connected transport and peer.
#[must_use]
pub fn channel() -> (ChannelTransport, TransportPeer) {
    let (outbound, commands) = mpsc::unbounded_channel();
    let (events, inbound) = mpsc::unbounded_channel();
    (
        ChannelTransport { outbound, inbound },
        TransportPeer { commands, events },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_closed| TransportError::Closed)
    }

    async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.recv().await)
    }
}

impl TransportPeer {
    /// Returns the next raw command frame; `None` once the engine has stopped.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.commands.recv().await
    }

    /// Returns the next command frame parsed as JSON.
    ///
    /// Frames the engine wrote are always valid JSON, so a parse failure is
    /// reported as `Value::Null`.
    pub async fn next_command(&mut self) -> Option<Value> {
        let frame = self.next_frame().await?;
        Some(serde_json::from_str(&frame).unwrap_or(Value::Null))
    }

    /// Returns a command frame that is already buffered, without waiting.
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.commands.try_recv().ok()
    }

    /// Delivers an inbound event frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the engine has stopped.
    pub fn send_event(&self, event: &Value) -> Result<(), TransportError> {
        self.send_frame(event.to_string())
    }

    /// Delivers an inbound frame verbatim, valid JSON or not.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the engine has stopped.
    pub fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        self.events
            .send(frame)
            .map_err(|_closed| TransportError::Closed)
    }
}

/// Newline-delimited JSON over any async byte stream (stdio, TCP, pipes).
#[derive(Debug)]
pub struct JsonLinesTransport<R, W> {
    lines: Lines<R>,
    writer: W,
}

impl<R, W> JsonLinesTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps a buffered reader and a writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: reader.lines(),
            writer,
        }
    }
}

#[async_trait]
impl<R, W> Transport for JsonLinesTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        trace!(%frame, "writing frame");
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.lines.next_line().await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(line)),
                None => return Ok(None),
            }
        }
    }
}
