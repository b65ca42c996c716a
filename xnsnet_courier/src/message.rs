//! Courier message framing.
//!
//! A Courier stream opens with a protocol version pair and then carries
//! messages, each a CARDINAL message type followed by its body:
//!
//! ```text
//! CALL   (0): transaction, program (LONG CARDINAL), version, procedure, arguments
//! REJECT (1): transaction, reject CHOICE
//! RETURN (2): transaction, results
//! ABORT  (3): transaction, error code, error arguments
//! ```

use crate::courier_choice;
use crate::courier_record;
use crate::error::CourierError;
use crate::types::{CourierType, Empty};
use crate::wire::{WireReader, WireWriter};
use bytes::Bytes;

pub const COURIER_PROTOCOL_VERSION: u16 = 3;

pub const CALL: u16 = 0;
pub const REJECT: u16 = 1;
pub const RETURN: u16 = 2;
pub const ABORT: u16 = 3;

courier_record! {
    /// An inclusive version range: the Courier protocol versions a peer
    /// speaks, or the versions of a program it implements.
    pub struct VersionRange {
        pub lowest: u16,
        pub highest: u16,
    }
}

impl VersionRange {
    pub fn new(lowest: u16, highest: u16) -> Self {
        Self { lowest, highest }
    }

    pub fn protocol() -> Self {
        Self::new(COURIER_PROTOCOL_VERSION, COURIER_PROTOCOL_VERSION)
    }

    pub fn includes(&self, version: u16) -> bool {
        (self.lowest..=self.highest).contains(&version)
    }
}

courier_choice! {
    pub enum RejectBody {
        NoSuchProgramNumber(Empty) = 0,
        NoSuchVersionNumber(VersionRange) = 1,
        NoSuchProcedureValue(Empty) = 2,
        InvalidArguments(Empty) = 3,
        UnspecifiedError(Empty) = 65535,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call {
        transaction: u16,
        program: u32,
        version: u16,
        procedure: u16,
        arguments: Bytes,
    },
    Reject {
        transaction: u16,
        reject: RejectBody,
    },
    Return {
        transaction: u16,
        results: Bytes,
    },
    Abort {
        transaction: u16,
        error: u16,
        arguments: Bytes,
    },
}

impl Message {
    pub fn transaction(&self) -> u16 {
        match self {
            Message::Call { transaction, .. }
            | Message::Reject { transaction, .. }
            | Message::Return { transaction, .. }
            | Message::Abort { transaction, .. } => *transaction,
        }
    }

    /// Reads one message; the arguments or results run to the end of the
    /// reader.
    pub fn read(reader: &mut WireReader) -> Result<Self, CourierError> {
        let message_type = reader.read_u16()?;
        let transaction = reader.read_u16()?;
        match message_type {
            CALL => Ok(Message::Call {
                transaction,
                program: reader.read_u32()?,
                version: reader.read_u16()?,
                procedure: reader.read_u16()?,
                arguments: reader.read_remaining(),
            }),
            REJECT => Ok(Message::Reject {
                transaction,
                reject: RejectBody::deserialize(reader)?,
            }),
            RETURN => Ok(Message::Return {
                transaction,
                results: reader.read_remaining(),
            }),
            ABORT => Ok(Message::Abort {
                transaction,
                error: reader.read_u16()?,
                arguments: reader.read_remaining(),
            }),
            other => Err(CourierError::MessageError(format!(
                "unknown message type {other}"
            ))),
        }
    }

    pub fn write(&self, writer: &mut WireWriter) -> Result<(), CourierError> {
        match self {
            Message::Call {
                transaction,
                program,
                version,
                procedure,
                arguments,
            } => {
                writer.write_u16(CALL);
                writer.write_u16(*transaction);
                writer.write_u32(*program);
                writer.write_u16(*version);
                writer.write_u16(*procedure);
                writer.write_raw(arguments);
            }
            Message::Reject {
                transaction,
                reject,
            } => {
                writer.write_u16(REJECT);
                writer.write_u16(*transaction);
                reject.serialize(writer)?;
            }
            Message::Return {
                transaction,
                results,
            } => {
                writer.write_u16(RETURN);
                writer.write_u16(*transaction);
                writer.write_raw(results);
            }
            Message::Abort {
                transaction,
                error,
                arguments,
            } => {
                writer.write_u16(ABORT);
                writer.write_u16(*transaction);
                writer.write_u16(*error);
                writer.write_raw(arguments);
            }
        }
        Ok(())
    }
}
