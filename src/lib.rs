//! # Packetlens: stateful capture decoding engine
//!
//! Reconstructs application-level meaning from captured network bytes for
//! two protocol families: a remote-operation protocol whose asynchronous
//! invoke/result/error exchanges must be correlated per connection, and an
//! authentication/handshake protocol whose wire layout varies with the
//! negotiated protocol version and with flag bytes read earlier in the
//! same message.
//!
//! The engine is a pure transform: no sockets, no capture files, no
//! rendering. Bytes and prior per-connection state go in; classified
//! fields, diagnostics and updated state come out. Feeding the same capture
//! through a fresh engine reproduces the same output.
//!
//! ## Data flow
//!
//! ```text
//!  raw segment bytes
//!        |
//!        v
//!  Reassembler ---- length probe picks the size-field offset from the
//!        |          leading bytes; surplus is kept for the next message
//!        v
//!  one complete message
//!        |
//!        v
//!  field decoder -- command/kind byte, then version- and flag-gated reads
//!        |          against the connection's negotiated state
//!        v
//!  registry dispatch (remote operations) + conversation correlation
//!        |
//!        v
//!  DecodedRecord (fields, byte ranges, diagnostics)
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use packetlens::{DecodeEngine, ConnectionKey, FrameMeta};
//!
//! let mut engine = DecodeEngine::new();
//!
//! for frame in capture {
//!     let records = engine.decode_auth_frame(frame.key, frame.meta, &frame.bytes);
//!     for record in records {
//!         println!("{}: {:?}", record.summary.as_deref().unwrap_or("-"), record.fields);
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: top-level per-frame entry points
//! - [`auth`]: authentication/handshake family decoder
//! - [`remoteop`]: remote-operation family decoder
//! - [`conversation`]: per-connection state and correlation
//! - [`registry`]: pluggable payload-decoder modules
//! - [`reassembly`]: segment-to-message reassembly
//! - [`record`]: decoded field output model
//! - [`wire`]: bounds-checked message cursor
//! - [`config`]: engine configuration
//! - [`error`]: error types and result alias

pub mod auth;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod reassembly;
pub mod record;
pub mod registry;
pub mod remoteop;
pub mod wire;

// Re-exports for convenience
pub use config::{EngineConfig, ReassemblyConfig};
pub use conversation::{
    ConnectionKey, ConversationState, ConversationStore, Correlation, Direction, FrameMeta,
    PendingOperation, SessionTable, Transport,
};
pub use engine::DecodeEngine;
pub use error::{DecodeError, Result};
pub use reassembly::{FeedOutcome, LengthProbe, ProbeOutcome, Reassembler};
pub use record::{DecodedRecord, Diagnostic, Field, FieldId, FieldSink, FieldValue, Severity};
pub use registry::{
    DecoderKind, PayloadDecoder, ProtocolModule, ProtocolRegistry, TransportRegistrar,
};
pub use wire::Reader;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
