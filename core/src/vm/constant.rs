//! Tagged constant decoding.
//!
//! Constants are embedded inline in the program. Odd slots are small integers; even slots are
//! compared against the configured [`TagTable`] markers in a fixed order, and anything left over
//! is a variable reference.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::Fault;
use crate::val::{Val, write_number};

/// Typed value produced by one decode call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Constant {
    SmallInt(i32),
    Float64(f64),
    Bool(bool),
    Null,
    Str(String),
    VarRef(u32),
    /// Only produced when [`TagTable::undefined`] is configured.
    Undefined,
}

impl Constant {
    /// Literal value; `VarRef` has none without a frame to resolve it against.
    pub fn to_val(&self) -> Option<Val> {
        Some(match self {
            Constant::SmallInt(i) => Val::Int(*i as i64),
            Constant::Float64(f) => Val::Float(*f),
            Constant::Bool(b) => Val::Bool(*b),
            Constant::Null => Val::Nil,
            Constant::Str(s) => Val::from(s.as_str()),
            Constant::Undefined => Val::Undefined,
            Constant::VarRef(_) => return None,
        })
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::SmallInt(i) => {
                let mut buf = itoa::Buffer::new();
                f.write_str(buf.format(*i))
            }
            Constant::Float64(n) => write_number(f, *n),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Null => f.write_str("null"),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::VarRef(idx) => write!(f, "v{}", idx),
            Constant::Undefined => f.write_str("undefined"),
        }
    }
}

/// Marker values reserved for non-integer constants.
///
/// Markers must be even; an odd marker could never be reached because odd slots are small
/// integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagTable {
    #[serde(rename = "true")]
    pub true_tag: i32,
    #[serde(rename = "null")]
    pub null_tag: i32,
    #[serde(rename = "float")]
    pub float_tag: i32,
    #[serde(rename = "false")]
    pub false_tag: i32,
    #[serde(rename = "string")]
    pub string_tag: i32,
    /// Optional marker decoded as `Undefined` instead of a variable reference.
    #[serde(rename = "undefined", skip_serializing_if = "Option::is_none")]
    pub undefined: Option<i32>,
}

impl Default for TagTable {
    fn default() -> Self {
        Self {
            true_tag: 22,
            null_tag: 36,
            float_tag: 46,
            false_tag: 38,
            string_tag: 2,
            undefined: None,
        }
    }
}

impl TagTable {
    pub fn validate(&self) -> Result<(), Fault> {
        let mut markers = vec![
            ("true", self.true_tag),
            ("null", self.null_tag),
            ("float", self.float_tag),
            ("false", self.false_tag),
            ("string", self.string_tag),
        ];
        if let Some(undefined) = self.undefined {
            markers.push(("undefined", undefined));
        }
        for (i, (name, value)) in markers.iter().enumerate() {
            if value & 1 != 0 {
                return Err(Fault::config(format!("tag marker {} = {} must be even", name, value)));
            }
            if let Some((other, _)) = markers[..i].iter().find(|(_, v)| v == value) {
                return Err(Fault::config(format!(
                    "tag markers {} and {} share value {}",
                    other, name, value
                )));
            }
        }
        Ok(())
    }

    /// Whether `raw` is one of the reserved markers.
    pub fn is_marker(&self, raw: i32) -> bool {
        raw == self.true_tag
            || raw == self.null_tag
            || raw == self.float_tag
            || raw == self.false_tag
            || raw == self.string_tag
            || Some(raw) == self.undefined
    }
}

/// Maps one encoded string slot to a UTF-16 code unit.
pub trait CharTransform: Send + Sync + fmt::Debug {
    fn code_unit(&self, raw: i32) -> u16;
}

/// Built-in character transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CharMode {
    /// The slot already holds the code unit.
    Identity,
    /// `(c & !63) | (c * 41 & 63)` with 32-bit wrapping, as observed in the sample loader.
    #[default]
    MaskMultiply,
}

impl CharTransform for CharMode {
    #[inline]
    fn code_unit(&self, raw: i32) -> u16 {
        match self {
            CharMode::Identity => raw as u32 as u16,
            CharMode::MaskMultiply => ((raw & !63) | (raw.wrapping_mul(41) & 63)) as u32 as u16,
        }
    }
}

/// Shared string table addressed by `(length, offset)` in UTF-16 units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringPool {
    units: Arc<[u16]>,
}

impl StringPool {
    pub fn new(text: &str) -> Self {
        Self {
            units: text.encode_utf16().collect::<Vec<_>>().into(),
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn slice(&self, offset: usize, len: usize) -> Option<String> {
        let end = offset.checked_add(len)?;
        self.units.get(offset..end).map(String::from_utf16_lossy)
    }

    /// Removes the embedded pool constant from `program` and decodes it.
    ///
    /// The pool location is keyed off the final program slot:
    /// `offset = program[len - 1] ^ (len + 4)`. The region starting there is an inline string
    /// constant (`tag, length, units...`) and is spliced out of the returned program.
    pub fn extract(program: &[i32], tags: &TagTable, chars: &dyn CharTransform) -> Result<(Vec<i32>, Self), Fault> {
        let len = program.len();
        let last = *program
            .last()
            .ok_or_else(|| Fault::config("cannot extract a string pool from an empty program"))?;
        let key = (len as i64 + 4) as i32;
        let offset = (last ^ key) as i64;
        if offset < 0 || offset as usize + 1 >= len {
            return Err(Fault::config(format!("string pool offset {} outside program", offset)));
        }
        let offset = offset as usize;
        let count = program[offset + 1] as i64 + 2;
        if count < 2 || offset as i64 + count > len as i64 {
            return Err(Fault::config(format!(
                "string pool region of {} slots at {} overruns program",
                count, offset
            )));
        }
        let end = offset + count as usize;
        let region = &program[offset..end];
        let mut pos = 0;
        let pool = match decode_constant(region, &mut pos, tags, chars)? {
            Constant::Str(text) => Self::new(&text),
            other => {
                return Err(Fault::config(format!("string pool region decoded as {} instead of a string", other)));
            }
        };
        let mut rest = Vec::with_capacity(len - region.len());
        rest.extend_from_slice(&program[..offset]);
        rest.extend_from_slice(&program[end..]);
        Ok((rest, pool))
    }
}

#[inline]
fn take(program: &[i32], cursor: &mut usize, what: &str) -> Result<i32, Fault> {
    let value = program
        .get(*cursor)
        .copied()
        .ok_or_else(|| Fault::constant(*cursor, format!("program ended while reading {}", what)))?;
    *cursor += 1;
    Ok(value)
}

#[inline]
fn var_ref(raw: i32, cursor: usize) -> Result<Constant, Fault> {
    if raw < 0 {
        return Err(Fault::constant(cursor, format!("negative variable reference {}", raw)));
    }
    Ok(Constant::VarRef((raw >> 5) as u32))
}

/// Decodes one inline constant at `*pos`, advancing it past every slot consumed.
///
/// `*pos` is left untouched when decoding fails, so a multi-slot read is never half applied.
pub fn decode_constant(
    program: &[i32],
    pos: &mut usize,
    tags: &TagTable,
    chars: &dyn CharTransform,
) -> Result<Constant, Fault> {
    decode_with(program, pos, tags, chars, None)
}

fn decode_with(
    program: &[i32],
    pos: &mut usize,
    tags: &TagTable,
    chars: &dyn CharTransform,
    pool: Option<&StringPool>,
) -> Result<Constant, Fault> {
    let mut cursor = *pos;
    let v = take(program, &mut cursor, "a constant")?;
    let constant = if v & 1 != 0 {
        Constant::SmallInt(v >> 1)
    } else if v == tags.float_tag {
        let high = take(program, &mut cursor, "float high word")? as u32 as u64;
        let low = take(program, &mut cursor, "float low word")? as u32 as u64;
        Constant::Float64(f64::from_bits(high << 32 | low))
    } else if v == tags.true_tag {
        Constant::Bool(true)
    } else if v == tags.string_tag {
        let len = take(program, &mut cursor, "string length")?;
        if len < 0 {
            return Err(Fault::constant(cursor - 1, format!("negative string length {}", len)));
        }
        match pool {
            Some(pool) => {
                let offset = take(program, &mut cursor, "string pool offset")?;
                let text = usize::try_from(offset)
                    .ok()
                    .and_then(|offset| pool.slice(offset, len as usize))
                    .ok_or_else(|| {
                        Fault::constant(
                            cursor - 1,
                            format!("string pool slice {}+{} outside pool of {}", offset, len, pool.len()),
                        )
                    })?;
                Constant::Str(text)
            }
            None => {
                let len = len as usize;
                if cursor + len > program.len() {
                    return Err(Fault::constant(
                        program.len(),
                        format!("program ended inside string of length {}", len),
                    ));
                }
                let units: Vec<u16> = program[cursor..cursor + len]
                    .iter()
                    .map(|raw| chars.code_unit(*raw))
                    .collect();
                cursor += len;
                Constant::Str(String::from_utf16_lossy(&units))
            }
        }
    } else if v == tags.null_tag {
        Constant::Null
    } else if v == tags.false_tag {
        Constant::Bool(false)
    } else if Some(v) == tags.undefined {
        Constant::Undefined
    } else {
        var_ref(v, cursor)?
    };
    *pos = cursor;
    Ok(constant)
}

/// Tag table, character transform and optional string pool bundled for repeated decoding.
#[derive(Debug, Clone)]
pub struct ConstantDecoder {
    tags: TagTable,
    chars: Arc<dyn CharTransform>,
    pool: Option<StringPool>,
}

impl Default for ConstantDecoder {
    fn default() -> Self {
        Self::new(TagTable::default(), Arc::new(CharMode::default()))
    }
}

impl ConstantDecoder {
    pub fn new(tags: TagTable, chars: Arc<dyn CharTransform>) -> Self {
        Self { tags, chars, pool: None }
    }

    pub fn with_pool(mut self, pool: StringPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[inline]
    pub fn tags(&self) -> &TagTable {
        &self.tags
    }

    #[inline]
    pub fn chars(&self) -> &dyn CharTransform {
        self.chars.as_ref()
    }

    #[inline]
    pub fn pool(&self) -> Option<&StringPool> {
        self.pool.as_ref()
    }

    /// See [`decode_constant`]; pooled strings are used when a pool is installed.
    pub fn decode(&self, program: &[i32], pos: &mut usize) -> Result<Constant, Fault> {
        decode_with(program, pos, &self.tags, self.chars.as_ref(), self.pool.as_ref())
    }

    /// Reads a raw destination slot (`index = raw >> 5`), as used by result writes.
    pub fn decode_slot(&self, program: &[i32], pos: &mut usize) -> Result<u32, Fault> {
        let mut cursor = *pos;
        let raw = take(program, &mut cursor, "a destination slot")?;
        match var_ref(raw, cursor)? {
            Constant::VarRef(idx) => {
                *pos = cursor;
                Ok(idx)
            }
            _ => unreachable!("var_ref only builds VarRef"),
        }
    }
}
