use tagvm_core::{
    Thrown, Val,
    val::to_int32,
    vm::{Flow, HandlerCx},
};

/// Operator errors surface as catchable `TypeError` exceptions.
fn type_error(err: anyhow::Error) -> Thrown {
    Thrown::exception(format!("TypeError: {}", err))
}

macro_rules! checked_binary {
    ($( $(#[$meta:meta])* $name:ident => $op:tt; )*) => {
        $(
            $(#[$meta])*
            pub(crate) fn $name(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
                let [a, b] = cx.operands::<2>()?;
                let value = (&a $op &b).map_err(type_error)?;
                cx.write(value)?;
                Ok(Flow::Continue)
            }
        )*
    };
}

macro_rules! int32_binary {
    ($( $name:ident => $method:ident; )*) => {
        $(
            pub(crate) fn $name(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
                let [a, b] = cx.operands::<2>()?;
                cx.write(a.$method(&b))?;
                Ok(Flow::Continue)
            }
        )*
    };
}

checked_binary! {
    /// Numeric addition; a string on either side concatenates.
    add => +;
    subtract => -;
    multiply => *;
    divide => /;
    modulo => %;
}

int32_binary! {
    bitwise_and => bit_and;
    bitwise_or => bit_or;
    bitwise_xor => bit_xor;
    left_shift => shl;
    right_shift => shr;
}

pub(crate) fn unary_plus(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let value = match cx.operand()? {
        n @ (Val::Int(_) | Val::Float(_)) => n,
        other => Val::number(other.to_number()),
    };
    cx.write(value)?;
    Ok(Flow::Continue)
}

pub(crate) fn bitwise_not(cx: &mut HandlerCx<'_, '_>) -> Result<Flow, Thrown> {
    let value = cx.operand()?;
    cx.write(Val::Int(!to_int32(&value) as i64))?;
    Ok(Flow::Continue)
}
