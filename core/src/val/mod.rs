use std::{fmt, sync::Arc};

use crate::util::fast_map::{FastHashMap, fast_hash_map_with_capacity};

mod ops;

pub use ops::{loose_eq, strict_eq, to_int32};


/// Runtime value manipulated by opcode handlers.
///
/// Numbers keep an integer fast path (`Int`) next to `Float`; both compare by numeric value
/// under [`strict_eq`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Val {
    #[default]
    Undefined,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// String type, wrapped in Arc<str> for efficient cloning
    Str(Arc<str>),
    /// List type, stored as Arc<[Val]> for compact, immutable sharing
    List(Arc<[Val]>),
    /// Map type, wrapped in Arc<FastHashMap> to avoid deep cloning
    Map(Arc<FastHashMap<Arc<str>, Val>>),
}

impl Val {
    /// `typeof`-style type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Undefined => "undefined",
            Val::Nil | Val::List(_) | Val::Map(_) => "object",
            Val::Bool(_) => "boolean",
            Val::Int(_) | Val::Float(_) => "number",
            Val::Str(_) => "string",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Nil => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0 && !f.is_nan(),
            Val::Str(s) => !s.is_empty(),
            Val::List(_) | Val::Map(_) => true,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Val::Int(_) | Val::Float(_))
    }

    /// Numeric coercion; non-numeric strings and containers become NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Val::Undefined => f64::NAN,
            Val::Nil => 0.0,
            Val::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Val::Int(i) => *i as f64,
            Val::Float(f) => *f,
            Val::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Val::List(_) | Val::Map(_) => f64::NAN,
        }
    }

    /// Builds the narrowest numeric value for `f`.
    pub fn number(f: f64) -> Val {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
            Val::Int(f as i64)
        } else {
            Val::Float(f)
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Property key used by map lookups.
    pub fn to_key(&self) -> Arc<str> {
        match self {
            Val::Str(s) => s.clone(),
            other => Arc::from(other.to_string()),
        }
    }

    /// Property read with list indices and map keys; missing entries yield `Undefined`.
    pub fn get_property(&self, key: &Val) -> Val {
        match (self, key) {
            (Val::List(items), Val::Str(name)) if name.as_ref() == "length" => Val::Int(items.len() as i64),
            (Val::Str(s), Val::Str(name)) if name.as_ref() == "length" => {
                Val::Int(s.encode_utf16().count() as i64)
            }
            (Val::List(items), k) if k.is_number() => {
                let idx = k.to_number();
                if idx >= 0.0 && idx.fract() == 0.0 {
                    items.get(idx as usize).cloned().unwrap_or_default()
                } else {
                    Val::Undefined
                }
            }
            (Val::Map(map), k) => map.get(k.to_key().as_ref()).cloned().unwrap_or_default(),
            _ => Val::Undefined,
        }
    }

    /// Functional property write; returns the updated container.
    pub fn with_property(&self, key: &Val, value: Val) -> anyhow::Result<Val> {
        match self {
            Val::List(items) => {
                let idx = key.to_number();
                if !(idx >= 0.0 && idx.fract() == 0.0) {
                    anyhow::bail!("Invalid list index: {}", key);
                }
                if idx >= MAX_LIST_LEN as f64 {
                    anyhow::bail!("List index {} exceeds the maximum length of {}", key, MAX_LIST_LEN);
                }
                let idx = idx as usize;
                let mut out = items.to_vec();
                if idx >= out.len() {
                    out.resize(idx + 1, Val::Undefined);
                }
                out[idx] = value;
                Ok(Val::List(out.into()))
            }
            Val::Map(map) => {
                let mut out = fast_hash_map_with_capacity(map.len() + 1);
                for (k, v) in map.iter() {
                    out.insert(k.clone(), v.clone());
                }
                out.insert(key.to_key(), value);
                Ok(Val::Map(Arc::new(out)))
            }
            other => anyhow::bail!("Cannot set property {} on {}", key, other.type_name()),
        }
    }

    pub fn empty_map() -> Val {
        Val::Map(Arc::new(fast_hash_map_with_capacity(0)))
    }
}

/// Upper bound on list growth through indexed writes.
pub const MAX_LIST_LEN: usize = 1 << 20;

pub(crate) fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        let mut buf = itoa::Buffer::new();
        f.write_str(buf.format(n as i64))
    } else {
        let mut buf = ryu::Buffer::new();
        f.write_str(buf.format(n))
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Undefined => f.write_str("undefined"),
            Val::Nil => f.write_str("null"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Int(i) => {
                let mut buf = itoa::Buffer::new();
                f.write_str(buf.format(*i))
            }
            Val::Float(n) => write_number(f, *n),
            Val::Str(s) => f.write_str(s),
            Val::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Val::Map(map) => {
                let mut keys: Vec<&Arc<str>> = map.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, map[key])?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Bool(value)
    }
}

impl From<i32> for Val {
    fn from(value: i32) -> Self {
        Val::Int(value as i64)
    }
}

impl From<i64> for Val {
    fn from(value: i64) -> Self {
        Val::Int(value)
    }
}

impl From<f64> for Val {
    fn from(value: f64) -> Self {
        Val::Float(value)
    }
}

impl From<&str> for Val {
    fn from(value: &str) -> Self {
        Val::Str(Arc::from(value))
    }
}

impl From<String> for Val {
    fn from(value: String) -> Self {
        Val::Str(Arc::from(value))
    }
}

impl<T: Into<Val>> From<Vec<T>> for Val {
    fn from(value: Vec<T>) -> Self {
        Val::List(value.into_iter().map(Into::into).collect::<Vec<_>>().into())
    }
}
