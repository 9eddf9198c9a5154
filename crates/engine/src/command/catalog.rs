use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::value::{ArgCursor, ArgValue, ParamKind};
use super::{short_type_name, AnyCommand, DecodeCommand};

/// Static description of one script opcode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpcodeDescriptor {
    pub opcode: u32,
    pub description: String,
    pub params: Vec<ParamKind>,
    pub command: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("opcode {opcode} is already registered to {existing}; cannot register {attempted}")]
    DuplicateOpcode {
        opcode: u32,
        existing: &'static str,
        attempted: &'static str,
    },
    #[error("{command} is already registered as opcode {existing_opcode}; cannot register it as {attempted_opcode}")]
    DuplicateCommand {
        command: &'static str,
        existing_opcode: u32,
        attempted_opcode: u32,
    },
    #[error("opcode {opcode} ({command}) has an invalid parameter shape: {reason}")]
    InvalidShape {
        opcode: u32,
        command: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {opcode}")]
    UnknownOpcode { opcode: u32 },
    #[error("opcode {opcode} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        opcode: u32,
        expected: usize,
        actual: usize,
    },
    #[error("opcode {opcode} argument {index} expects {expected}, got {actual}")]
    TypeMismatch {
        opcode: u32,
        index: usize,
        expected: ParamKind,
        actual: ParamKind,
    },
    #[error("opcode {opcode} decoder read argument {index} ({expected}) past the end of the list")]
    ArgumentsExhausted {
        opcode: u32,
        index: usize,
        expected: ParamKind,
    },
}

type DecodeFn = fn(&mut ArgCursor<'_>) -> Result<Box<dyn AnyCommand>, DecodeError>;

struct CatalogEntry {
    descriptor: OpcodeDescriptor,
    decode: DecodeFn,
}

/// Collects opcode registrations during startup.
///
/// Registration failures are configuration errors; [`CatalogBuilder::build`]
/// freezes the table into an immutable [`CommandCatalog`].
#[derive(Default)]
pub struct CatalogBuilder {
    entries: BTreeMap<u32, CatalogEntry>,
    opcodes_by_type: HashMap<TypeId, u32>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: DecodeCommand>(
        &mut self,
        opcode: u32,
        description: impl Into<String>,
    ) -> Result<&mut Self, CatalogError> {
        let command = short_type_name::<C>();
        if let Some(existing) = self.entries.get(&opcode) {
            return Err(CatalogError::DuplicateOpcode {
                opcode,
                existing: existing.descriptor.command,
                attempted: command,
            });
        }
        if let Some(&existing_opcode) = self.opcodes_by_type.get(&TypeId::of::<C>()) {
            return Err(CatalogError::DuplicateCommand {
                command,
                existing_opcode,
                attempted_opcode: opcode,
            });
        }
        check_shape::<C>(opcode, command)?;

        self.entries.insert(
            opcode,
            CatalogEntry {
                descriptor: OpcodeDescriptor {
                    opcode,
                    description: description.into(),
                    params: C::PARAMS.to_vec(),
                    command,
                },
                decode: decode_boxed::<C>,
            },
        );
        self.opcodes_by_type.insert(TypeId::of::<C>(), opcode);
        Ok(self)
    }

    pub fn build(self) -> CommandCatalog {
        debug!(opcode_count = self.entries.len(), "command_catalog_built");
        CommandCatalog {
            entries: self.entries,
        }
    }
}

/// Immutable opcode table: opcode to descriptor and decoder.
pub struct CommandCatalog {
    entries: BTreeMap<u32, CatalogEntry>,
}

impl CommandCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn decode(
        &self,
        opcode: u32,
        args: &[ArgValue],
    ) -> Result<Box<dyn AnyCommand>, DecodeError> {
        let entry = self
            .entries
            .get(&opcode)
            .ok_or(DecodeError::UnknownOpcode { opcode })?;
        let params = &entry.descriptor.params;
        if args.len() != params.len() {
            return Err(DecodeError::ArityMismatch {
                opcode,
                expected: params.len(),
                actual: args.len(),
            });
        }
        for (index, (arg, expected)) in args.iter().zip(params).enumerate() {
            if arg.kind() != *expected {
                return Err(DecodeError::TypeMismatch {
                    opcode,
                    index,
                    expected: *expected,
                    actual: arg.kind(),
                });
            }
        }

        let mut cursor = ArgCursor::new(opcode, args);
        (entry.decode)(&mut cursor)
    }

    pub fn descriptor(&self, opcode: u32) -> Option<&OpcodeDescriptor> {
        self.entries.get(&opcode).map(|entry| &entry.descriptor)
    }

    /// Descriptors in ascending opcode order.
    pub fn descriptors(&self) -> impl Iterator<Item = &OpcodeDescriptor> {
        self.entries.values().map(|entry| &entry.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let table = self.descriptors().collect::<Vec<_>>();
        serde_json::to_string_pretty(&table)
    }
}

fn decode_boxed<C: DecodeCommand>(
    cursor: &mut ArgCursor<'_>,
) -> Result<Box<dyn AnyCommand>, DecodeError> {
    C::decode(cursor).map(|command| Box::new(command) as Box<dyn AnyCommand>)
}

// Runs the decoder against neutral values built from the declared shape. A
// decoder that reads a different kind, reads too far, or stops early does not
// match its declared parameters.
fn check_shape<C: DecodeCommand>(opcode: u32, command: &'static str) -> Result<(), CatalogError> {
    let neutral_args = C::PARAMS
        .iter()
        .copied()
        .map(ArgValue::placeholder)
        .collect::<Vec<_>>();
    let mut cursor = ArgCursor::new(opcode, &neutral_args);
    if let Err(error) = C::decode(&mut cursor) {
        return Err(CatalogError::InvalidShape {
            opcode,
            command,
            reason: error.to_string(),
        });
    }
    if cursor.consumed() != neutral_args.len() {
        return Err(CatalogError::InvalidShape {
            opcode,
            command,
            reason: format!(
                "declares {} parameter(s) but the decoder reads {}",
                neutral_args.len(),
                cursor.consumed()
            ),
        });
    }
    Ok(())
}
