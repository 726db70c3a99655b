//! Dispatch registry for remote-operation payload decoders.
//!
//! Each application protocol riding the remote-operation layer contributes a
//! [`ProtocolModule`]: decoder tables for its operation arguments, results
//! and errors plus name tables for display. Modules register once under a
//! case-sensitive identifier; the registry is populated at startup and
//! read-only afterwards, so lookups during decoding need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DecodeError, Result};
use crate::record::DecodedRecord;

/// Which of a module's decoder tables to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    /// Invoke argument payloads.
    Argument,
    /// Return-result payloads.
    Result,
    /// Return-error payloads.
    Error,
}

/// Decoder for one operation's payload bytes.
pub trait PayloadDecoder: Send + Sync {
    /// Decode `payload` into `record`. Failures are returned, not panicked;
    /// the caller downgrades them to diagnostics.
    fn decode(&self, payload: &[u8], record: &mut DecodedRecord) -> Result<()>;
}

impl<F> PayloadDecoder for F
where
    F: Fn(&[u8], &mut DecodedRecord) -> Result<()> + Send + Sync,
{
    fn decode(&self, payload: &[u8], record: &mut DecodedRecord) -> Result<()> {
        self(payload, record)
    }
}

type DecoderTable = Vec<(u32, Arc<dyn PayloadDecoder>)>;

/// One application protocol's decoders and names.
///
/// Tables keep insertion order and are scanned front to back; the module
/// source decides the order, so decoders must not attach meaning to it
/// beyond first-match-wins.
pub struct ProtocolModule {
    identifier: String,
    arguments: DecoderTable,
    results: DecoderTable,
    errors: DecoderTable,
    operation_names: Vec<(u32, String)>,
    error_names: Vec<(u32, String)>,
}

impl std::fmt::Debug for ProtocolModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolModule")
            .field("identifier", &self.identifier)
            .field("arguments", &self.arguments.len())
            .field("results", &self.results.len())
            .field("errors", &self.errors.len())
            .finish()
    }
}

impl ProtocolModule {
    /// Start an empty module for `identifier`.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            arguments: Vec::new(),
            results: Vec::new(),
            errors: Vec::new(),
            operation_names: Vec::new(),
            error_names: Vec::new(),
        }
    }

    /// Identifier the module registers under.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Add an argument decoder for an opcode.
    pub fn with_argument(mut self, opcode: u32, decoder: impl PayloadDecoder + 'static) -> Self {
        self.arguments.push((opcode, Arc::new(decoder)));
        self
    }

    /// Add a result decoder for an opcode.
    pub fn with_result(mut self, opcode: u32, decoder: impl PayloadDecoder + 'static) -> Self {
        self.results.push((opcode, Arc::new(decoder)));
        self
    }

    /// Add an error decoder for an error code.
    pub fn with_error(mut self, errcode: u32, decoder: impl PayloadDecoder + 'static) -> Self {
        self.errors.push((errcode, Arc::new(decoder)));
        self
    }

    /// Name an opcode for summaries.
    pub fn with_operation_name(mut self, opcode: u32, name: impl Into<String>) -> Self {
        self.operation_names.push((opcode, name.into()));
        self
    }

    /// Name an error code for summaries.
    pub fn with_error_name(mut self, errcode: u32, name: impl Into<String>) -> Self {
        self.error_names.push((errcode, name.into()));
        self
    }

    fn table(&self, kind: DecoderKind) -> &DecoderTable {
        match kind {
            DecoderKind::Argument => &self.arguments,
            DecoderKind::Result => &self.results,
            DecoderKind::Error => &self.errors,
        }
    }

    /// First decoder registered for `code` in the given table.
    pub fn decoder(&self, code: u32, kind: DecoderKind) -> Option<&Arc<dyn PayloadDecoder>> {
        self.table(kind)
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, d)| d)
    }

    /// Display name of an opcode, if registered.
    pub fn operation_name(&self, opcode: u32) -> Option<&str> {
        self.operation_names
            .iter()
            .find(|(c, _)| *c == opcode)
            .map(|(_, n)| n.as_str())
    }

    /// Display name of an error code, if registered.
    pub fn error_name(&self, errcode: u32) -> Option<&str> {
        self.error_names
            .iter()
            .find(|(c, _)| *c == errcode)
            .map(|(_, n)| n.as_str())
    }
}

/// Hook into the transport-layer dispatcher that sits outside this engine.
///
/// Modules that do not ride the outer transport themselves must still be
/// reachable through it, so registration is forwarded under the same
/// identifier.
pub trait TransportRegistrar {
    /// Make `identifier` reachable through the outer dispatcher.
    fn register(&mut self, identifier: &str);
}

/// Registry of all protocol modules known to the engine.
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    modules: HashMap<String, ProtocolModule>,
}

impl ProtocolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Re-registering an identifier is an error surfaced
    /// to the caller; nothing is overwritten.
    pub fn register(&mut self, module: ProtocolModule) -> Result<()> {
        let identifier = module.identifier.clone();
        if self.modules.contains_key(&identifier) {
            return Err(DecodeError::DuplicateRegistration(identifier));
        }
        self.modules.insert(identifier, module);
        Ok(())
    }

    /// Register a module and, unless it already rides the outer transport,
    /// forward the identifier to the outer dispatcher too.
    pub fn register_with(
        &mut self,
        module: ProtocolModule,
        uses_outer_transport: bool,
        outer: &mut dyn TransportRegistrar,
    ) -> Result<()> {
        let identifier = module.identifier.clone();
        self.register(module)?;
        if !uses_outer_transport {
            outer.register(&identifier);
        }
        Ok(())
    }

    /// The module registered under `identifier`, if any. Lookup is
    /// case-sensitive and exact.
    pub fn module(&self, identifier: &str) -> Option<&ProtocolModule> {
        self.modules.get(identifier)
    }

    /// Resolve a decoder for `(identifier, code, kind)`. `None` means the
    /// caller falls back to an undecoded blob plus a diagnostic.
    pub fn resolve(
        &self,
        identifier: &str,
        code: u32,
        kind: DecoderKind,
    ) -> Option<&Arc<dyn PayloadDecoder>> {
        self.modules.get(identifier)?.decoder(code, kind)
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
