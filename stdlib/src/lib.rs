mod arith;
mod compare;
mod control;
pub mod host;
mod object;
pub mod opcodes;

#[cfg(test)]
mod test_util;

#[cfg(test)]
mod host_test;

use once_cell::sync::Lazy;
use tagvm_core::{
    Fault,
    vm::{ConstantDecoder, HandlerRegistry, HandlerTable, HostCapabilities, Machine, OpcodeMap},
};

pub use host::{HostStorage, register_host_capabilities};

static REFERENCE_OPCODES: Lazy<OpcodeMap> = Lazy::new(opcodes::reference_map);

/// Metadata for the reference opcode set, built on first use.
pub fn reference_opcode_map() -> &'static OpcodeMap {
    &REFERENCE_OPCODES
}

/// Handlers of the reference opcode set, keyed by opcode name.
pub fn standard_handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    opcodes::register_all(&mut registry);
    registry
}

/// Dispatch table for the reference opcode set.
pub fn standard_table() -> Result<HandlerTable, Fault> {
    HandlerTable::bind(reference_opcode_map(), &standard_handlers())
}

/// Standard capabilities backed by a fresh, private [`HostStorage`].
pub fn standard_host() -> HostCapabilities {
    standard_host_with(&HostStorage::new())
}

pub fn standard_host_with(storage: &HostStorage) -> HostCapabilities {
    let mut host = HostCapabilities::new();
    register_host_capabilities(&mut host, storage);
    host
}

/// A machine wired with the reference opcodes and the standard host capabilities.
///
/// `opcodes` replaces the reference metadata; handlers are still bound by name, so a map may
/// renumber the reference opcodes freely.
pub fn standard_machine(
    program: Vec<i32>,
    decoder: ConstantDecoder,
    opcodes: Option<&OpcodeMap>,
) -> Result<Machine, Fault> {
    let table = match opcodes {
        Some(map) => HandlerTable::bind(map, &standard_handlers())?,
        None => standard_table()?,
    };
    Ok(Machine::new(program, table)
        .with_decoder(decoder)
        .with_host(standard_host()))
}
