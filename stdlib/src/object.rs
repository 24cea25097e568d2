use tagvm_core::{
    Fault, Thrown, Val,
    vm::{Constant, Flow, HandlerCx},
};

pub(crate) fn new_array(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    cx.write(Val::from(Vec::<Val>::new()))?;
    Ok(Flow::Continue)
}

pub(crate) fn new_object(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    cx.write(Val::empty_map())?;
    Ok(Flow::Continue)
}

pub(crate) fn load_const(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let value = cx.operand()?;
    cx.write(value)?;
    Ok(Flow::Continue)
}

pub(crate) fn load_var(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let value = cx.read_var()?;
    cx.write(value)?;
    Ok(Flow::Continue)
}

/// Decodes an operand that must name a variable slot.
fn binding(cx: &mut HandlerCx<'_, '_>) -> Result<u32, Thrown> {
    let at = cx.ctx().ip();
    match cx.constant()? {
        Constant::VarRef(index) => Ok(index),
        other => Err(Fault::constant(at, format!("{} is not a variable", other)).into()),
    }
}

pub(crate) fn store_var(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let index = binding(cx)?;
    let value = cx.operand()?;
    cx.ctx_mut().assign(index, value);
    Ok(Flow::Continue)
}

pub(crate) fn property_get(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let [object, key] = cx.operands::<2>()?;
    if matches!(object, Val::Undefined | Val::Nil) {
        return Err(Thrown::exception(format!(
            "TypeError: Cannot read properties of {} (reading '{}')",
            object, key
        )));
    }
    cx.write(object.get_property(&key))?;
    Ok(Flow::Continue)
}

/// `v[key] = value`. Containers are immutable values, so the updated one is written back to the
/// innermost binding of `v`.
pub(crate) fn property_set(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let index = binding(cx)?;
    let [key, value] = cx.operands::<2>()?;
    let Some(object) = cx.ctx().resolve(index).cloned() else {
        return Err(Thrown::unbound(index));
    };
    let updated = object
        .with_property(&key, value)
        .map_err(|err| Thrown::exception(format!("TypeError: {}", err)))?;
    cx.ctx_mut().assign(index, updated);
    Ok(Flow::Continue)
}
