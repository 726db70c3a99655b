//! Per-connection state and request/response correlation.
//!
//! A conversation is one bidirectional transport flow. The engine keeps two
//! collections of in-flight operations per conversation: `unmatched` holds
//! requests still waiting for their response, keyed by invoke id; `matched`
//! holds completed exchanges so that re-decoding the same capture reproduces
//! the same pairing without re-running the matching logic.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Transport protocol of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// TCP flow.
    Tcp,
    /// UDP pseudo-flow.
    Udp,
}

/// Direction of a frame relative to the flow's initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the connection initiator to the responder.
    ClientToServer,
    /// From the responder back to the initiator.
    ServerToClient,
}

/// Identity of a bidirectional flow: both endpoints plus the transport.
///
/// Owned by the host's session table; the engine only uses it as a lookup
/// key and never invents one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    /// Initiator endpoint.
    pub client: std::net::SocketAddr,
    /// Responder endpoint.
    pub server: std::net::SocketAddr,
    /// Transport protocol.
    pub transport: Transport,
}

/// Capture metadata for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameMeta {
    /// Frame number within the capture, in presentation order.
    pub number: u32,
    /// Capture timestamp.
    pub time: DateTime<Utc>,
    /// Direction of the frame within its flow.
    pub direction: Direction,
}

/// One invoke/response exchange, in flight or completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOperation {
    /// Correlation id chosen by the invoking side, scoped to the connection.
    pub invoke_id: u32,
    /// Frame that carried the request.
    pub request_frame: Option<u32>,
    /// Capture time of the request frame.
    pub request_time: Option<DateTime<Utc>>,
    /// Frame that carried the response, once matched.
    pub response_frame: Option<u32>,
    /// Role of the frame most recently decoded against this entry. Display
    /// state only; flipped on re-decode, never used for matching.
    pub is_request: bool,
}

/// Outcome of correlating one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// A request with no response seen yet.
    Pending,
    /// Both sides of the exchange are known.
    Completed {
        /// Frame that carried the request.
        request_frame: u32,
        /// Frame that carried the response.
        response_frame: u32,
        /// Response time minus request time; only reported when the frame
        /// being decoded is the response.
        elapsed: Option<TimeDelta>,
    },
    /// A response whose invoke id was never seen as a request here.
    UnmatchedResponse,
}

/// State owned by exactly one connection.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Handshake protocol version negotiated on this connection. Two is the
    /// lowest version that appears on the wire and is assumed until a
    /// client challenge says otherwise.
    version: u8,
    unmatched: HashMap<u32, PendingOperation>,
    matched: HashMap<u32, Vec<PendingOperation>>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    /// Fresh state for a new flow.
    pub fn new() -> Self {
        Self {
            version: 2,
            unmatched: HashMap::new(),
            matched: HashMap::new(),
        }
    }

    /// Version negotiated by the handshake so far.
    pub fn negotiated_version(&self) -> u8 {
        self.version
    }

    /// Remember the version announced by the client challenge; later
    /// server messages on this connection are gated on it.
    pub fn set_negotiated_version(&mut self, version: u8) {
        self.version = version;
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.unmatched.len()
    }

    /// Correlate one frame of a remote-operation exchange.
    ///
    /// Matching is keyed purely by invoke id within the connection. When an
    /// id is reused while a previous exchange with the same id is still in
    /// flight, the newer request wins and the older one is abandoned; the
    /// protocol itself cannot disambiguate that case.
    pub fn correlate(
        &mut self,
        invoke_id: u32,
        is_request: bool,
        frame: u32,
        time: DateTime<Utc>,
    ) -> Correlation {
        // Re-decode of an already-matched frame must reproduce the pairing.
        if let Some(entries) = self.matched.get_mut(&invoke_id) {
            let hit = entries.iter_mut().find(|op| {
                if is_request {
                    op.request_frame == Some(frame)
                } else {
                    op.response_frame == Some(frame)
                }
            });
            if let Some(op) = hit {
                op.is_request = is_request;
                let elapsed = if is_request {
                    None
                } else {
                    op.request_time.map(|req| time - req)
                };
                return Correlation::Completed {
                    request_frame: op.request_frame.unwrap_or(0),
                    response_frame: op.response_frame.unwrap_or(0),
                    elapsed,
                };
            }
        }

        if is_request {
            // An invoke id is only in flight once; a reused id starts a new
            // exchange and abandons the old one.
            if self.unmatched.remove(&invoke_id).is_some() {
                tracing::debug!(invoke_id, frame, "invoke id reused, dropping stale request");
            }
            self.unmatched.insert(
                invoke_id,
                PendingOperation {
                    invoke_id,
                    request_frame: Some(frame),
                    request_time: Some(time),
                    response_frame: None,
                    is_request: true,
                },
            );
            return Correlation::Pending;
        }

        match self.unmatched.remove(&invoke_id) {
            Some(mut op) if op.response_frame.is_none() => {
                op.response_frame = Some(frame);
                op.is_request = false;
                let result = Correlation::Completed {
                    request_frame: op.request_frame.unwrap_or(0),
                    response_frame: frame,
                    elapsed: op.request_time.map(|req| time - req),
                };
                self.matched.entry(invoke_id).or_default().push(op);
                result
            }
            Some(op) => {
                // Entry already carries a response; put it back untouched.
                self.unmatched.insert(invoke_id, op);
                Correlation::UnmatchedResponse
            }
            None => Correlation::UnmatchedResponse,
        }
    }
}

/// Host-supplied storage of per-connection state.
///
/// The engine treats each slot as exclusively owned by its connection;
/// dropping a slot is the authoritative way to abandon a flow.
pub trait ConversationStore {
    /// Look up the state for a flow, creating it on the first packet.
    fn get_or_create(&mut self, key: &ConnectionKey) -> &mut ConversationState;

    /// Discard a flow's state entirely.
    fn remove(&mut self, key: &ConnectionKey);
}

/// Default in-memory conversation store.
#[derive(Debug, Default)]
pub struct SessionTable {
    states: HashMap<ConnectionKey, ConversationState>,
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flows currently tracked.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the table tracks no flows.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Read-only view of one flow's state.
    pub fn get(&self, key: &ConnectionKey) -> Option<&ConversationState> {
        self.states.get(key)
    }
}

impl ConversationStore for SessionTable {
    fn get_or_create(&mut self, key: &ConnectionKey) -> &mut ConversationState {
        self.states.entry(*key).or_default()
    }

    fn remove(&mut self, key: &ConnectionKey) {
        self.states.remove(key);
    }
}
