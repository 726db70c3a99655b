//! Reassembly of logical messages from transport segments.
//!
//! The reassembler never knows a message's length on its own: the caller
//! supplies a [`LengthProbe`] that inspects the smallest header prefix able
//! to say how long the message is. Where the length field sits can itself
//! depend on the leading bytes, so the probe sees the whole buffered prefix
//! and the direction. Bytes beyond one message are kept for the next one.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::conversation::{ConnectionKey, Direction};
use crate::error::DecodeError;

/// What a length probe learned from the buffered header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Not enough bytes yet to locate or read the length field.
    NeedMore,
    /// The message declares its total length, including the header.
    Framed(usize),
    /// No length field; the message cannot span segments and is emitted
    /// whole once at least `min` bytes are buffered.
    Passthrough {
        /// Minimum fixed size required before emitting.
        min: usize,
    },
}

/// Computes a message's total length from its header prefix.
pub trait LengthProbe {
    /// Inspect `header` (the buffered prefix of the stream) and report how
    /// the next message is framed.
    fn probe(&self, direction: Direction, header: &[u8]) -> ProbeOutcome;
}

impl<F> LengthProbe for F
where
    F: Fn(Direction, &[u8]) -> ProbeOutcome,
{
    fn probe(&self, direction: Direction, header: &[u8]) -> ProbeOutcome {
        self(direction, header)
    }
}

/// Result of feeding one segment: zero or more complete messages, and
/// whether the direction's buffer had to be discarded.
#[derive(Debug, Default)]
pub struct FeedOutcome {
    /// Complete messages, in stream order.
    pub messages: Vec<Bytes>,
    /// Set when an absurd declared length forced a discard; bytes fed
    /// afterwards start a fresh resynchronization attempt.
    pub error: Option<DecodeError>,
}

/// Per-direction accumulator of stream bytes until whole messages emerge.
///
/// Buffers live per `(connection, direction)` and only until one message is
/// complete; surplus bytes stay buffered for the next message.
#[derive(Debug)]
pub struct Reassembler<P> {
    probe: P,
    max_message_len: usize,
    buffers: HashMap<(ConnectionKey, Direction), BytesMut>,
}

impl<P: LengthProbe> Reassembler<P> {
    /// Create a reassembler with the given probe and message-length ceiling.
    pub fn new(probe: P, max_message_len: usize) -> Self {
        Self {
            probe,
            max_message_len,
            buffers: HashMap::new(),
        }
    }

    /// Feed captured stream bytes for one direction of one connection,
    /// returning every message that became complete.
    pub fn feed(&mut self, key: ConnectionKey, direction: Direction, bytes: &[u8]) -> FeedOutcome {
        let mut outcome = FeedOutcome::default();
        let buffer = self.buffers.entry((key, direction)).or_default();
        buffer.extend_from_slice(bytes);

        loop {
            if buffer.is_empty() {
                break;
            }
            match self.probe.probe(direction, buffer) {
                ProbeOutcome::NeedMore => break,
                ProbeOutcome::Framed(total) => {
                    if total == 0 {
                        // A zero-length message can never complete; treat it
                        // like a corrupt length field and resynchronize.
                        tracing::warn!("discarding reassembly buffer, declared length is zero");
                        buffer.clear();
                        outcome.error = Some(DecodeError::Malformed(
                            "declared message length is zero".into(),
                        ));
                        break;
                    }
                    if total > self.max_message_len {
                        tracing::warn!(
                            declared = total,
                            max = self.max_message_len,
                            "discarding reassembly buffer, declared length is absurd"
                        );
                        buffer.clear();
                        outcome.error = Some(DecodeError::OversizedLength {
                            declared: total,
                            max: self.max_message_len,
                        });
                        break;
                    }
                    if buffer.len() < total {
                        break;
                    }
                    outcome.messages.push(buffer.split_to(total).freeze());
                }
                ProbeOutcome::Passthrough { min } => {
                    if buffer.len() < min {
                        break;
                    }
                    let len = buffer.len();
                    outcome.messages.push(buffer.split_to(len).freeze());
                }
            }
        }

        if buffer.is_empty() {
            self.buffers.remove(&(key, direction));
        }
        outcome
    }

    /// Bytes currently buffered for a direction.
    pub fn buffered(&self, key: ConnectionKey, direction: Direction) -> usize {
        self.buffers
            .get(&(key, direction))
            .map_or(0, BytesMut::len)
    }

    /// Drop all buffered bytes for a connection, both directions.
    pub fn abandon(&mut self, key: ConnectionKey) {
        self.buffers.remove(&(key, Direction::ClientToServer));
        self.buffers.remove(&(key, Direction::ServerToClient));
    }
}
