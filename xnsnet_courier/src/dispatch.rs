//! Courier program registry and procedure dispatch.
//!
//! Programs are registered by (program number, version). A procedure
//! handler takes its decoded parameter record and either returns a result
//! record or raises one of its declared errors as a [`CourierAbort`].

use crate::error::CourierError;
use crate::message::{Message, RejectBody, VersionRange};
use crate::types::{CourierType, Empty, to_wire};
use crate::wire::{WireReader, WireWriter};
use bytes::Bytes;
use log::{debug, error, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// A RECORD that can be raised as a Courier ERROR under `CODE`.
pub trait CourierErrorRecord: CourierType {
    const CODE: u16;
}

/// A raised Courier ERROR: its code and serialized arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CourierAbort {
    pub code: u16,
    pub body: Bytes,
}

impl CourierAbort {
    pub fn raise<E: CourierErrorRecord>(error: &E) -> Self {
        let body = to_wire(error).unwrap_or_else(|e| {
            warn!("Error {} arguments could not be encoded: {e}", E::CODE);
            Bytes::new()
        });
        Self { code: E::CODE, body }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Return(Bytes),
    Abort(CourierAbort),
    Reject(RejectBody),
}

impl Outcome {
    pub fn into_message(self, transaction: u16) -> Message {
        match self {
            Outcome::Return(results) => Message::Return {
                transaction,
                results,
            },
            Outcome::Abort(abort) => Message::Abort {
                transaction,
                error: abort.code,
                arguments: abort.body,
            },
            Outcome::Reject(reject) => Message::Reject {
                transaction,
                reject,
            },
        }
    }
}

type Handler = Box<dyn Fn(&[u8]) -> Outcome + Send + Sync>;

struct Procedure {
    name: String,
    errors: Vec<u16>,
    handler: Handler,
}

pub struct CourierProgram {
    name: String,
    number: u32,
    version: u16,
    procedures: HashMap<u16, Procedure>,
}

impl CourierProgram {
    pub fn new(name: &str, number: u32, version: u16) -> Self {
        Self {
            name: name.to_string(),
            number,
            version,
            procedures: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// Binds procedure `number`; `errors` lists the codes it may raise.
    pub fn procedure<P, R, F>(mut self, number: u16, name: &str, errors: &[u16], handler: F) -> Self
    where
        P: CourierType,
        R: CourierType,
        F: Fn(P) -> Result<R, CourierAbort> + Send + Sync + 'static,
    {
        let label = format!("{}.{name}", self.name);
        let handler = move |arguments: &[u8]| -> Outcome {
            let mut reader = WireReader::from_slice(arguments);
            let params = match P::deserialize(&mut reader) {
                Ok(params) if reader.is_at_end() => params,
                Ok(_) => {
                    debug!("{label}: {} argument bytes left over", reader.remaining());
                    return Outcome::Reject(RejectBody::InvalidArguments(Empty));
                }
                Err(e) => {
                    debug!("{label}: invalid arguments: {e}");
                    return Outcome::Reject(RejectBody::InvalidArguments(Empty));
                }
            };
            trace!("{label} called with {}", params.to_json());
            match handler(params) {
                Ok(results) => match to_wire(&results) {
                    Ok(results) => Outcome::Return(results),
                    Err(e) => {
                        error!("{label}: results could not be encoded: {e}");
                        Outcome::Reject(RejectBody::UnspecifiedError(Empty))
                    }
                },
                Err(abort) => Outcome::Abort(abort),
            }
        };
        self.procedures.insert(
            number,
            Procedure {
                name: name.to_string(),
                errors: errors.to_vec(),
                handler: Box::new(handler),
            },
        );
        self
    }

    pub fn dispatch(&self, procedure: u16, arguments: &[u8]) -> Outcome {
        let Some(bound) = self.procedures.get(&procedure) else {
            debug!("{} has no procedure {procedure}", self.name);
            return Outcome::Reject(RejectBody::NoSuchProcedureValue(Empty));
        };
        debug!("Dispatching {}.{}", self.name, bound.name);
        match (bound.handler)(arguments) {
            Outcome::Abort(abort) if !bound.errors.contains(&abort.code) => {
                warn!(
                    "{}.{} raised undeclared error {}",
                    self.name, bound.name, abort.code
                );
                Outcome::Reject(RejectBody::UnspecifiedError(Empty))
            }
            outcome => outcome,
        }
    }
}

#[derive(Default)]
pub struct CourierRegistry {
    programs: HashMap<(u32, u16), CourierProgram>,
}

impl CourierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, program: CourierProgram) {
        debug!(
            "Registered Courier program {} ({} v{})",
            program.name, program.number, program.version
        );
        self.programs
            .insert((program.number, program.version), program);
    }

    pub fn dispatch(&self, program: u32, version: u16, procedure: u16, arguments: &[u8]) -> Outcome {
        if let Some(bound) = self.programs.get(&(program, version)) {
            return bound.dispatch(procedure, arguments);
        }
        let versions = self
            .programs
            .keys()
            .filter(|(number, _)| *number == program)
            .map(|(_, version)| *version);
        match (versions.clone().min(), versions.max()) {
            (Some(lowest), Some(highest)) => {
                Outcome::Reject(RejectBody::NoSuchVersionNumber(VersionRange::new(lowest, highest)))
            }
            _ => Outcome::Reject(RejectBody::NoSuchProgramNumber(Empty)),
        }
    }

    /// The reply to a CALL; other messages get none.
    pub fn handle_message(&self, message: &Message) -> Option<Message> {
        match message {
            Message::Call {
                transaction,
                program,
                version,
                procedure,
                arguments,
            } => Some(
                self.dispatch(*program, *version, *procedure, arguments)
                    .into_message(*transaction),
            ),
            other => {
                debug!("Ignoring Courier message {other:?}");
                None
            }
        }
    }
}

/// One Courier conversation: the version pair is expected first from the
/// peer and sent once with our first reply.
pub struct CourierSession {
    registry: Arc<CourierRegistry>,
    version_received: bool,
    version_sent: bool,
}

impl CourierSession {
    pub fn new(registry: Arc<CourierRegistry>) -> Self {
        Self {
            registry,
            version_received: false,
            version_sent: false,
        }
    }

    /// Handles one complete inbound message and returns the bytes to send.
    pub fn handle(&mut self, data: &[u8]) -> Result<Option<Bytes>, CourierError> {
        let mut reader = WireReader::from_slice(data);
        let mut writer = WireWriter::new();

        if !self.version_received {
            let range = VersionRange::deserialize(&mut reader)?;
            if !range.includes(crate::message::COURIER_PROTOCOL_VERSION) {
                return Err(CourierError::MessageError(format!(
                    "peer speaks Courier {}..{}",
                    range.lowest, range.highest
                )));
            }
            self.version_received = true;
        }
        if !self.version_sent {
            VersionRange::protocol().serialize(&mut writer)?;
            self.version_sent = true;
        }

        if !reader.is_at_end() {
            let message = Message::read(&mut reader)?;
            if let Some(reply) = self.registry.handle_message(&message) {
                reply.write(&mut writer)?;
            }
        }

        if writer.is_empty() {
            return Ok(None);
        }
        Ok(Some(writer.finish()))
    }
}
