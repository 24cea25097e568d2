use tagvm_core::{
    Thrown, Val,
    val::{loose_eq, strict_eq},
    vm::{Flow, HandlerCx},
};

fn compare(cx: &mut HandlerCx<'_, '_>, test: fn(&Val, &Val) -> bool) -> Result<Flow, Thrown> {
    let [a, b] = cx.operands::<2>()?;
    cx.write(Val::Bool(test(&a, &b)))?;
    Ok(Flow::Continue)
}

pub(crate) fn strict_equal(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    compare(cx, strict_eq)
}

pub(crate) fn strict_not_equal(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    compare(cx, |a, b| !strict_eq(a, b))
}

pub(crate) fn equal(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    compare(cx, loose_eq)
}

pub(crate) fn not_equal(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    compare(cx, |a, b| !loose_eq(a, b))
}

pub(crate) fn less_than(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    compare(cx, Val::less_than)
}

pub(crate) fn greater_than(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    compare(cx, Val::greater_than)
}

/// `value instanceof Name`, where the right operand is a constructor name.
///
/// Only the two container constructors are known: `Array` matches lists and `Object` matches
/// lists and maps. Primitives are never instances.
pub(crate) fn instance_of(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let [value, ctor] = cx.operands::<2>()?;
    let Some(name) = ctor.as_str() else {
        return Err(Thrown::exception(format!(
            "TypeError: Right-hand side of 'instanceof' is not callable ({})",
            ctor.type_name()
        )));
    };
    let result = matches!(
        (&value, name),
        (Val::List(_), "Array" | "Object") | (Val::Map(_), "Object")
    );
    cx.write(Val::Bool(result))?;
    Ok(Flow::Continue)
}

pub(crate) fn logical_not(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let value = cx.operand()?;
    cx.write(Val::Bool(!value.is_truthy()))?;
    Ok(Flow::Continue)
}

pub(crate) fn type_of(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let value = cx.operand()?;
    cx.write(Val::from(value.type_name()))?;
    Ok(Flow::Continue)
}
