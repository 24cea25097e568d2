//! Program builders shared by the stdlib tests. Strings use the identity character transform.

use std::sync::Arc;

use anyhow::Result;
use tagvm_core::vm::{CharMode, ConstantDecoder, Context, RunOutcome, TagTable, Vm};

use crate::standard_machine;

pub(crate) const TRUE: i32 = 22;
pub(crate) const FALSE: i32 = 38;
pub(crate) const NULL: i32 = 36;

pub(crate) fn int(n: i32) -> i32 {
    (n << 1) | 1
}

pub(crate) fn slot(index: i32) -> i32 {
    index << 5
}

/// Inline string constant.
pub(crate) fn text(s: &str) -> Vec<i32> {
    let units: Vec<i32> = s.encode_utf16().map(i32::from).collect();
    let mut out = vec![2, units.len() as i32];
    out.extend(units);
    out
}

pub(crate) fn decoder() -> ConstantDecoder {
    ConstantDecoder::new(TagTable::default(), Arc::new(CharMode::Identity))
}

pub(crate) fn run(program: Vec<i32>) -> Result<(RunOutcome, Context)> {
    let machine = Arc::new(standard_machine(program, decoder(), None)?);
    let mut vm = Vm::new(machine);
    let outcome = vm.run();
    Ok((outcome, vm.context().clone()))
}
