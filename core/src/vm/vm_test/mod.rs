pub(super) use std::sync::Arc;

pub(super) use crate::{
    error::{Fault, Thrown},
    val::{Val, strict_eq},
    vm::{
        CharMode, Constant, ConstantDecoder, Context, Disassembler, Flow, HandlerCx, HandlerTable, Machine,
        OpcodeMap, OpcodeMeta, OperandClass, RunOutcome, StringPool, TagTable, TraceRecorder, Vm, VmState,
        decode_constant, raise,
    },
};

pub(super) const STRICT_EQUAL: i32 = 0;
pub(super) const HALT: i32 = 1;
pub(super) const THROW: i32 = 2;
pub(super) const TRY_ENTER: i32 = 3;
pub(super) const TRY_EXIT: i32 = 4;
pub(super) const GET_EXCEPTION: i32 = 5;
pub(super) const RETURN: i32 = 6;
pub(super) const CALL: i32 = 7;
pub(super) const STORE: i32 = 8;
pub(super) const JUMP: i32 = 9;
pub(super) const ADD: i32 = 10;

/// Raw destination slot encoding.
pub(super) fn slot(index: i32) -> i32 {
    index << 5
}

/// Small integer constant encoding.
pub(super) fn int(n: i32) -> i32 {
    (n << 1) | 1
}

fn strict_equal(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let [a, b] = cx.operands::<2>()?;
    cx.write(Val::Bool(strict_eq(&a, &b)))?;
    Ok(Flow::Continue)
}

fn halt(_: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    Ok(Flow::Halt)
}

fn throw(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    Err(Thrown::Exception(cx.operand()?))
}

fn try_enter(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let target = cx.target()?;
    cx.push_frame(Some(target))?;
    Ok(Flow::Continue)
}

fn try_exit(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    cx.pop_frame();
    Ok(Flow::Continue)
}

fn get_exception(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let value = cx.take_pending().unwrap_or_default();
    cx.write(value)?;
    Ok(Flow::Continue)
}

fn ret(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    Ok(Flow::Return(cx.operand()?))
}

fn call(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let entry = cx.target()?;
    let arg = cx.operand()?;
    let value = cx.call(entry, vec![arg])?;
    cx.write(value)?;
    Ok(Flow::Continue)
}

fn store(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let value = cx.operand()?;
    cx.write(value)?;
    Ok(Flow::Continue)
}

fn jump(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let target = cx.target()?;
    cx.jump(target)?;
    Ok(Flow::Continue)
}

fn add(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let [a, b] = cx.operands::<2>()?;
    let sum = (&a + &b).map_err(|e| Thrown::exception(e.to_string()))?;
    cx.write(sum)?;
    Ok(Flow::Continue)
}

pub(super) fn test_table() -> HandlerTable {
    let mut table = HandlerTable::new(0);
    table
        .set(STRICT_EQUAL as usize, "STRICT_EQUAL", strict_equal)
        .set(HALT as usize, "HALT", halt)
        .set(THROW as usize, "THROW", throw)
        .set(TRY_ENTER as usize, "TRY_ENTER", try_enter)
        .set(TRY_EXIT as usize, "TRY_EXIT", try_exit)
        .set(GET_EXCEPTION as usize, "GET_EXCEPTION", get_exception)
        .set(RETURN as usize, "RETURN", ret)
        .set(CALL as usize, "CALL", call)
        .set(STORE as usize, "STORE", store)
        .set(JUMP as usize, "JUMP", jump)
        .set(ADD as usize, "ADD", add);
    table
}

pub(super) fn machine(program: Vec<i32>) -> Arc<Machine> {
    Arc::new(Machine::new(program, test_table()))
}

pub(super) fn run(program: Vec<i32>) -> (RunOutcome, Context) {
    let mut vm = Vm::new(machine(program));
    let outcome = vm.run();
    (outcome, vm.context().clone())
}

mod constant;
mod disasm;
mod dispatch;
mod routing;
