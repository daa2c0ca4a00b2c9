//! Command/response channel bookkeeping and event-channel decoding.
//!
//! Responses on the command channel carry no correlation tag: the only
//! contract is that the debugger answers commands strictly in submission
//! order, exactly once each. The channel therefore keeps every
//! issued-but-unanswered command in a FIFO queue and decodes each inbound
//! response against the schema of the queue head.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::protocol::{Command, DebugEvent, Response};
use crate::wire::{self, WireError};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection write failed: {0}")]
    Write(#[source] std::io::Error),
    /// Bytes arrived with nothing in flight. There is no way to know what
    /// they mean; parsing state for this session is unrecoverable.
    #[error("received response bytes with no command in flight")]
    UnsolicitedResponse,
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Write half of the command pipe plus the in-flight queue.
pub struct CommandChannel<W> {
    writer: W,
    inflight: VecDeque<Command>,
    rx: BytesMut,
}

impl<W: AsyncWrite + Unpin> CommandChannel<W> {
    pub fn new(writer: W) -> Self {
        CommandChannel {
            writer,
            inflight: VecDeque::new(),
            rx: BytesMut::with_capacity(1024),
        }
    }

    /// Encode and write `command`, then queue it. The queue push happens
    /// only after the write call succeeds: a failed write must not leave a
    /// queue entry with no bytes on the wire, or every later response would
    /// be attributed one command too early.
    pub async fn send(&mut self, command: Command) -> Result<(), ChannelError> {
        let frame = wire::encode_command(&command)?;
        self.writer
            .write_all(&frame)
            .await
            .map_err(ChannelError::Write)?;
        trace!(opcode = command.opcode(), bytes = frame.len(), "sent command");
        self.inflight.push_back(command);
        Ok(())
    }

    /// Feed bytes read from the command pipe. A single delivery may carry
    /// several concatenated responses, or end mid-response; complete
    /// responses are matched to queue heads in order, a trailing partial
    /// one is kept for the next delivery.
    pub fn on_data(&mut self, data: &[u8]) -> Result<Vec<(Command, Response)>, ChannelError> {
        self.rx.extend_from_slice(data);
        let mut completed = Vec::new();
        while !self.rx.is_empty() {
            let decoded = match self.inflight.front() {
                Some(head) => wire::decode_response(head, &self.rx)?,
                None => return Err(ChannelError::UnsolicitedResponse),
            };
            let Some((response, consumed)) = decoded else {
                // Head response still incomplete; wait for the next read.
                break;
            };
            self.rx.advance(consumed);
            if let Some(command) = self.inflight.pop_front() {
                debug!(
                    opcode = command.opcode(),
                    result = ?response.result,
                    "completed command"
                );
                completed.push((command, response));
            }
        }
        Ok(completed)
    }

    /// Number of issued-but-unanswered commands.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Drop all in-flight commands and buffered bytes. Called on
    /// disconnect: once the channel is closed no late responses are
    /// expected, and none could be attributed anyway.
    pub fn discard_in_flight(&mut self) {
        self.inflight.clear();
        self.rx.clear();
    }
}

/// Accumulating decoder for the event pipe. Events are self-identifying
/// (tag + fixed schema), so no queue is involved, but the same no-framing
/// rules apply: partial reads are buffered until a whole event is present.
#[derive(Default)]
pub struct EventDecoder {
    rx: BytesMut,
}

impl EventDecoder {
    pub fn new() -> Self {
        EventDecoder {
            rx: BytesMut::with_capacity(256),
        }
    }

    pub fn on_data(&mut self, data: &[u8]) -> Result<Vec<DebugEvent>, WireError> {
        self.rx.extend_from_slice(data);
        let mut events = Vec::new();
        while !self.rx.is_empty() {
            let Some((event, consumed)) = wire::decode_event(&self.rx)? else {
                break;
            };
            self.rx.advance(consumed);
            events.push(event);
        }
        Ok(events)
    }
}
