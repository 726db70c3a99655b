//! Top-level decoding engine.
//!
//! One [`DecodeEngine`] per decoding session. Each captured frame's stream
//! bytes enter through a per-family entry point; the engine reassembles
//! complete messages, decodes them against the connection's state and
//! returns one record per message. Connections are independent: a malformed
//! message only ever affects its own record.

use bytes::Bytes;

use crate::auth;
use crate::config::EngineConfig;
use crate::conversation::{ConnectionKey, ConversationStore, Direction, FrameMeta, SessionTable};
use crate::error::Result;
use crate::reassembly::{ProbeOutcome, Reassembler};
use crate::record::DecodedRecord;
use crate::registry::{ProtocolModule, ProtocolRegistry, TransportRegistrar};
use crate::remoteop;

type Probe = fn(Direction, &[u8]) -> ProbeOutcome;

/// Decoding engine for both protocol families.
///
/// Generic over the conversation store so hosts can supply their own
/// session table; the bundled [`SessionTable`] is the default.
pub struct DecodeEngine<S: ConversationStore = SessionTable> {
    config: EngineConfig,
    registry: ProtocolRegistry,
    sessions: S,
    auth_streams: Reassembler<Probe>,
    op_streams: Reassembler<Probe>,
}

impl DecodeEngine<SessionTable> {
    /// Engine with default configuration and the bundled session table.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine with the given configuration and the bundled session table.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_store(config, SessionTable::new())
    }
}

impl Default for DecodeEngine<SessionTable> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ConversationStore> DecodeEngine<S> {
    /// Engine backed by a host-supplied conversation store.
    pub fn with_store(config: EngineConfig, sessions: S) -> Self {
        let max = config.reassembly.max_message_len;
        Self {
            config,
            registry: ProtocolRegistry::new(),
            sessions,
            auth_streams: Reassembler::new(auth::length_probe as Probe, max),
            op_streams: Reassembler::new(remoteop::length_probe as Probe, max),
        }
    }

    /// The module registry. Populate it before decoding starts; it is
    /// read-only afterwards.
    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// Register a remote-operation protocol module.
    pub fn register_module(&mut self, module: ProtocolModule) -> Result<()> {
        self.registry.register(module)
    }

    /// Register a module, forwarding to the outer transport dispatcher
    /// unless the module already rides it.
    pub fn register_module_with(
        &mut self,
        module: ProtocolModule,
        uses_outer_transport: bool,
        outer: &mut dyn TransportRegistrar,
    ) -> Result<()> {
        self.registry
            .register_with(module, uses_outer_transport, outer)
    }

    /// The conversation store.
    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    /// Feed one captured frame of authentication-family traffic.
    pub fn decode_auth_frame(
        &mut self,
        key: ConnectionKey,
        meta: FrameMeta,
        bytes: &[u8],
    ) -> Vec<DecodedRecord> {
        let mut records = Vec::new();
        let messages = self.reassemble(Family::Auth, key, meta.direction, bytes, &mut records);

        let conv = self.sessions.get_or_create(&key);
        for message in &messages {
            records.push(auth::decode_message(message, meta.direction, conv));
        }
        records
    }

    /// Feed one captured frame of remote-operation traffic. `identifier`
    /// is the application context negotiated for this connection.
    pub fn decode_remoteop_frame(
        &mut self,
        key: ConnectionKey,
        meta: FrameMeta,
        identifier: &str,
        bytes: &[u8],
    ) -> Vec<DecodedRecord> {
        let mut records = Vec::new();
        let messages = self.reassemble(Family::RemoteOp, key, meta.direction, bytes, &mut records);

        let conv = self.sessions.get_or_create(&key);
        for message in &messages {
            records.push(remoteop::decode_pdu(
                message,
                &meta,
                identifier,
                &self.registry,
                conv,
            ));
        }
        records
    }

    /// Abandon a connection: its remaining traffic will not be decoded and
    /// its pending operations are reclaimed.
    pub fn abandon(&mut self, key: ConnectionKey) {
        self.sessions.remove(&key);
        self.auth_streams.abandon(key);
        self.op_streams.abandon(key);
    }

    fn reassemble(
        &mut self,
        family: Family,
        key: ConnectionKey,
        direction: Direction,
        bytes: &[u8],
        records: &mut Vec<DecodedRecord>,
    ) -> Vec<Bytes> {
        if !self.config.reassembly.desegment {
            // Decode each segment as delivered.
            return vec![Bytes::copy_from_slice(bytes)];
        }

        let streams = match family {
            Family::Auth => &mut self.auth_streams,
            Family::RemoteOp => &mut self.op_streams,
        };
        let outcome = streams.feed(key, direction, bytes);
        if let Some(err) = outcome.error {
            let mut record = DecodedRecord::new(family.protocol());
            record.set_summary("Reassembly buffer discarded");
            record.note_error(&err);
            records.push(record);
        }
        outcome.messages
    }
}

#[derive(Clone, Copy)]
enum Family {
    Auth,
    RemoteOp,
}

impl Family {
    fn protocol(self) -> &'static str {
        match self {
            Family::Auth => auth::PROTOCOL,
            Family::RemoteOp => remoteop::PROTOCOL,
        }
    }
}
