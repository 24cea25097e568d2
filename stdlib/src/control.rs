use tagvm_core::{
    Thrown, Val,
    vm::{Flow, HandlerCx},
};

pub(crate) fn halt(_: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    Ok(Flow::Halt)
}

pub(crate) fn jump(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let target = cx.target()?;
    cx.jump(target)?;
    Ok(Flow::Continue)
}

fn branch(cx: &mut HandlerCx<'_, '_>, when: bool) -> Result<Flow, Thrown> {
    let cond = cx.operand()?;
    let target = cx.target()?;
    if cond.is_truthy() == when {
        cx.jump(target)?;
    }
    Ok(Flow::Continue)
}

pub(crate) fn jump_if_false(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    branch(cx, false)
}

pub(crate) fn jump_if_true(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    branch(cx, true)
}

pub(crate) fn ret(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    Ok(Flow::Return(cx.operand()?))
}

pub(crate) fn throw(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    Err(Thrown::Exception(cx.operand()?))
}

pub(crate) fn try_enter(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let target = cx.target()?;
    cx.push_frame(Some(target))?;
    Ok(Flow::Continue)
}

pub(crate) fn try_exit(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    cx.pop_frame();
    Ok(Flow::Continue)
}

/// Entry of a catch block: reads the delivered exception without clearing it and disarms the
/// frame's handler, so a throw from the catch block propagates outward.
pub(crate) fn get_exception(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    cx.clear_handler();
    let value = cx.pending().cloned().unwrap_or_default();
    cx.write(value)?;
    Ok(Flow::Continue)
}

pub(crate) fn clear_exception(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    cx.take_pending();
    Ok(Flow::Continue)
}

/// Integer callees are bytecode entry points; string callees name host capabilities.
fn invoke(cx: &mut HandlerCx<'_, '_>, callee: Val, args: Vec<Val>) -> Result<Val, Thrown> {
    match callee {
        Val::Int(entry) if entry >= 0 => cx.call(entry as usize, args),
        Val::Str(name) => cx.call_host(&name, &args),
        other => Err(Thrown::exception(format!(
            "TypeError: {} is not a function",
            other
        ))),
    }
}

fn call_with<const N: usize>(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let callee = cx.operand()?;
    let args = cx.operands::<N>()?;
    let value = invoke(cx, callee, args.into())?;
    cx.write(value)?;
    Ok(Flow::Continue)
}

pub(crate) fn call_0(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    call_with::<0>(cx)
}

pub(crate) fn call_1(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    call_with::<1>(cx)
}

pub(crate) fn call_2(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    call_with::<2>(cx)
}
