use std::ops::{Add, Div, Mul, Rem, Sub};

use anyhow::{Result, anyhow};

use super::Val;

fn err_op(l: &Val, op: &str, r: &Val) -> anyhow::Error {
    anyhow!("Invalid op: {} {} {}", l.type_name(), op, r.type_name())
}

/// Identity comparison: same type and value, numbers compared numerically, NaN never equal.
pub fn strict_eq(l: &Val, r: &Val) -> bool {
    match (l, r) {
        (Val::Int(a), Val::Int(b)) => a == b,
        (a, b) if a.is_number() && b.is_number() => a.to_number() == b.to_number(),
        (Val::Undefined, Val::Undefined) | (Val::Nil, Val::Nil) => true,
        (Val::Bool(a), Val::Bool(b)) => a == b,
        (Val::Str(a), Val::Str(b)) => a == b,
        (Val::List(a), Val::List(b)) => std::sync::Arc::ptr_eq(a, b),
        (Val::Map(a), Val::Map(b)) => std::sync::Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Coercing comparison: `null == undefined`, numbers against strings and booleans by value.
pub fn loose_eq(l: &Val, r: &Val) -> bool {
    match (l, r) {
        (Val::Undefined | Val::Nil, Val::Undefined | Val::Nil) => true,
        (Val::Undefined | Val::Nil, _) | (_, Val::Undefined | Val::Nil) => false,
        (Val::Str(_), Val::Str(_)) => strict_eq(l, r),
        (Val::List(_) | Val::Map(_), _) | (_, Val::List(_) | Val::Map(_)) => strict_eq(l, r),
        _ => l.to_number() == r.to_number(),
    }
}

/// 32-bit integer coercion with modular wrap-around; NaN and infinities become 0.
pub fn to_int32(v: &Val) -> i32 {
    match v {
        Val::Int(i) => *i as i32,
        other => {
            let n = other.to_number();
            if !n.is_finite() {
                return 0;
            }
            (n.trunc() as i128).rem_euclid(1 << 32) as u32 as i32
        }
    }
}

impl Val {
    pub fn less_than(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => a < b,
            (Val::Str(a), Val::Str(b)) => a < b,
            _ => self.to_number() < other.to_number(),
        }
    }

    pub fn greater_than(&self, other: &Val) -> bool {
        other.less_than(self)
    }

    pub fn bit_and(&self, other: &Val) -> Val {
        Val::Int((to_int32(self) & to_int32(other)) as i64)
    }

    pub fn bit_or(&self, other: &Val) -> Val {
        Val::Int((to_int32(self) | to_int32(other)) as i64)
    }

    pub fn bit_xor(&self, other: &Val) -> Val {
        Val::Int((to_int32(self) ^ to_int32(other)) as i64)
    }

    pub fn shl(&self, other: &Val) -> Val {
        let shift = (to_int32(other) as u32) & 31;
        Val::Int(to_int32(self).wrapping_shl(shift) as i64)
    }

    pub fn shr(&self, other: &Val) -> Val {
        let shift = (to_int32(other) as u32) & 31;
        Val::Int((to_int32(self) >> shift) as i64)
    }

    pub(crate) fn concat_strings(a: &str, b: &str) -> Val {
        let mut s = String::with_capacity(a.len() + b.len());
        s.push_str(a);
        s.push_str(b);
        Val::Str(s.into())
    }
}

impl Add for &Val {
    type Output = Result<Val>;

    /// - Str + any concatenates the display form.
    /// - List/Map operands are rejected.
    #[inline]
    fn add(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Ok(a.checked_add(*b).map_or_else(|| Val::Float(*a as f64 + *b as f64), Val::Int)),
            (Val::Str(a), Val::Str(b)) => Ok(Val::concat_strings(a, b)),
            (Val::Str(a), b) if !matches!(b, Val::List(_) | Val::Map(_)) => Ok(Val::concat_strings(a, &b.to_string())),
            (a, Val::Str(b)) if !matches!(a, Val::List(_) | Val::Map(_)) => Ok(Val::concat_strings(&a.to_string(), b)),
            (Val::List(_) | Val::Map(_), _) | (_, Val::List(_) | Val::Map(_)) => Err(err_op(self, "+", other)),
            (a, b) => Ok(Val::Float(a.to_number() + b.to_number())),
        }
    }
}

impl Sub for &Val {
    type Output = Result<Val>;

    #[inline]
    fn sub(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Ok(a.checked_sub(*b).map_or_else(|| Val::Float(*a as f64 - *b as f64), Val::Int)),
            (Val::List(_) | Val::Map(_), _) | (_, Val::List(_) | Val::Map(_)) => Err(err_op(self, "-", other)),
            (a, b) => Ok(Val::Float(a.to_number() - b.to_number())),
        }
    }
}

impl Mul for &Val {
    type Output = Result<Val>;

    #[inline]
    fn mul(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Ok(a.checked_mul(*b).map_or_else(|| Val::Float(*a as f64 * *b as f64), Val::Int)),
            (Val::List(_) | Val::Map(_), _) | (_, Val::List(_) | Val::Map(_)) => Err(err_op(self, "*", other)),
            (a, b) => Ok(Val::Float(a.to_number() * b.to_number())),
        }
    }
}

impl Div for &Val {
    type Output = Result<Val>;

    /// Integer division stays integral only when exact; division by zero follows IEEE 754.
    #[inline]
    fn div(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) if *b != 0 && a % b == 0 => Ok(Val::Int(a / b)),
            (Val::List(_) | Val::Map(_), _) | (_, Val::List(_) | Val::Map(_)) => Err(err_op(self, "/", other)),
            (a, b) => Ok(Val::Float(a.to_number() / b.to_number())),
        }
    }
}

impl Rem for &Val {
    type Output = Result<Val>;

    #[inline]
    fn rem(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) if *b != 0 => Ok(Val::Int(a.wrapping_rem(*b))),
            (Val::List(_) | Val::Map(_), _) | (_, Val::List(_) | Val::Map(_)) => Err(err_op(self, "%", other)),
            (a, b) => Ok(Val::Float(a.to_number() % b.to_number())),
        }
    }
}
