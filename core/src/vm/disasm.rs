//! Static disassembler.
//!
//! Walks a program without executing it, decoding operands from opcode metadata. This is
//! best-effort: instruction boundaries are only known once the preceding instruction decoded,
//! so positions whose id is not in the opcode map are skipped as data and operand decode errors
//! are recorded on the instruction instead of stopping the scan.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

use super::constant::{Constant, ConstantDecoder, TagTable};
use super::opcode::OpcodeMap;

pub const DECODE_ERROR_NOTE: &str = "<decode error>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Operand {
    Const(Constant),
    /// Destination slot index written by the instruction.
    Dest(u32),
    /// Slot value that could not be decoded.
    Raw(i32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(c) => fmt::Display::fmt(c, f),
            Operand::Dest(idx) => write!(f, "-> v{}", idx),
            Operand::Raw(raw) => write!(f, "?{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub address: usize,
    pub opcode: i32,
    pub name: String,
    pub operation: String,
    pub operands: Vec<Operand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Instruction {
    pub fn is_decode_error(&self) -> bool {
        self.note.as_deref() == Some(DECODE_ERROR_NOTE)
    }
}

#[derive(Debug, Clone)]
pub struct Disassembler<'p> {
    program: &'p [i32],
    opcodes: &'p OpcodeMap,
    decoder: &'p ConstantDecoder,
    limit: Option<usize>,
}

impl<'p> Disassembler<'p> {
    pub fn new(program: &'p [i32], opcodes: &'p OpcodeMap, decoder: &'p ConstantDecoder) -> Self {
        Self {
            program,
            opcodes,
            decoder,
            limit: None,
        }
    }

    /// Stops after `limit` instructions.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Lazy scan from address 0; every call starts over.
    pub fn instructions(&self) -> Instructions<'_, 'p> {
        Instructions {
            dis: self,
            pos: 0,
            emitted: 0,
            skipped: 0,
        }
    }

    pub fn disassemble(&self) -> Disassembly {
        let mut iter = self.instructions();
        let instructions: Vec<Instruction> = iter.by_ref().collect();
        Disassembly {
            total_bytecode: self.program.len(),
            instructions_disassembled: instructions.len(),
            instructions,
            skipped: iter.skipped,
        }
    }

    fn decode_at(&self, address: usize, opcode: i32, pos: &mut usize) -> Option<Instruction> {
        let meta = self.opcodes.get(opcode)?;
        let mut inst = Instruction {
            address,
            opcode,
            name: meta.name.clone(),
            operation: meta.operation.clone(),
            operands: Vec::with_capacity(meta.class.operand_count() + meta.writes as usize),
            note: None,
        };
        let mut cursor = *pos;
        let mut failed = false;
        for _ in 0..meta.class.operand_count() {
            match self.decoder.decode(self.program, &mut cursor) {
                Ok(c) => inst.operands.push(Operand::Const(c)),
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }
        if !failed && meta.writes {
            match self.decoder.decode_slot(self.program, &mut cursor) {
                Ok(slot) => inst.operands.push(Operand::Dest(slot)),
                Err(_) => failed = true,
            }
        }
        if failed {
            if let Some(raw) = self.program.get(cursor) {
                inst.operands.push(Operand::Raw(*raw));
            }
            inst.note = Some(DECODE_ERROR_NOTE.to_string());
            tracing::debug!(address, opcode, at = cursor, "operand decode failed");
        }
        *pos = cursor;
        Some(inst)
    }
}

/// Restartable, finite instruction iterator; see [`Disassembler::instructions`].
#[derive(Debug, Clone)]
pub struct Instructions<'d, 'p> {
    dis: &'d Disassembler<'p>,
    pos: usize,
    emitted: usize,
    skipped: usize,
}

impl Instructions<'_, '_> {
    /// Positions skipped so far because their value is not a known opcode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for Instructions<'_, '_> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        if self.dis.limit.is_some_and(|limit| self.emitted >= limit) {
            return None;
        }
        while self.pos < self.dis.program.len() {
            let address = self.pos;
            let opcode = self.dis.program[address];
            self.pos += 1;
            match self.dis.decode_at(address, opcode, &mut self.pos) {
                Some(inst) => {
                    self.emitted += 1;
                    return Some(inst);
                }
                None => {
                    tracing::trace!(address, opcode, "skipping non-opcode position");
                    self.skipped += 1;
                }
            }
        }
        None
    }
}

/// Serialized as `{totalBytecode, instructionsDisassembled, instructions}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disassembly {
    pub total_bytecode: usize,
    pub instructions_disassembled: usize,
    pub instructions: Vec<Instruction>,
    #[serde(skip)]
    pub skipped: usize,
}

impl Disassembly {
    pub fn histogram(&self) -> OpcodeHistogram {
        let mut counts: FastHashMap<i32, (String, usize)> = fast_hash_map_new();
        for inst in &self.instructions {
            counts
                .entry(inst.opcode)
                .or_insert_with(|| (inst.name.clone(), 0))
                .1 += 1;
        }
        let mut entries: Vec<HistogramEntry> = counts
            .into_iter()
            .map(|(opcode, (name, count))| HistogramEntry { opcode, name, count })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.opcode.cmp(&b.opcode)));
        OpcodeHistogram { entries }
    }

    pub fn decode_errors(&self) -> usize {
        self.instructions.iter().filter(|i| i.is_decode_error()).count()
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IP    | OPCODE | INSTRUCTION             | OPERATION")?;
        writeln!(f, "------|--------|-------------------------|------------------------------------------")?;
        for inst in &self.instructions {
            write!(f, "{:>5} | {:>6} | {:<23} | ", inst.address, inst.opcode, inst.name)?;
            let mut first = true;
            if !inst.operation.is_empty() {
                f.write_str(&inst.operation)?;
                first = false;
            }
            for operand in &inst.operands {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{}", operand)?;
                first = false;
            }
            if let Some(note) = &inst.note {
                write!(f, " {}", note)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramEntry {
    pub opcode: i32,
    pub name: String,
    pub count: usize,
}

/// Opcode frequency over disassembled instructions, most frequent first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpcodeHistogram {
    pub entries: Vec<HistogramEntry>,
}

impl OpcodeHistogram {
    pub fn count(&self, opcode: i32) -> usize {
        self.entries.iter().find(|e| e.opcode == opcode).map_or(0, |e| e.count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: i32,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Raw value statistics over a whole program, independent of instruction boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueStats {
    pub length: usize,
    pub unique: usize,
    pub min: Option<i32>,
    pub max: Option<i32>,
    pub top: Vec<ValueCount>,
    /// Odd values, i.e. small integer constants.
    pub small_ints: usize,
    /// Even values in `0..100`.
    pub likely_opcodes: usize,
    /// Everything else: references and data.
    pub other: usize,
}

fn marker_name(tags: &TagTable, value: i32) -> Option<&'static str> {
    if value == tags.true_tag {
        Some("TRUE")
    } else if value == tags.null_tag {
        Some("NULL")
    } else if value == tags.float_tag {
        Some("FLOAT")
    } else if value == tags.false_tag {
        Some("FALSE")
    } else if value == tags.string_tag {
        Some("STRING")
    } else if Some(value) == tags.undefined {
        Some("UNDEFINED")
    } else {
        None
    }
}

impl ValueStats {
    /// Counts every value; the `top` most frequent are labelled with opcode or marker names.
    pub fn of(program: &[i32], top: usize, opcodes: &OpcodeMap, tags: &TagTable) -> Self {
        let mut freq: FastHashMap<i32, usize> = fast_hash_map_new();
        let (mut small_ints, mut likely_opcodes, mut other) = (0, 0, 0);
        for &value in program {
            *freq.entry(value).or_insert(0) += 1;
            if value & 1 != 0 {
                small_ints += 1;
            } else if (0..100).contains(&value) {
                likely_opcodes += 1;
            } else {
                other += 1;
            }
        }
        let mut sorted: Vec<(i32, usize)> = freq.iter().map(|(v, c)| (*v, *c)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let top = sorted
            .into_iter()
            .take(top)
            .map(|(value, count)| ValueCount {
                value,
                count,
                label: opcodes
                    .get(value)
                    .map(|meta| meta.name.clone())
                    .or_else(|| marker_name(tags, value).map(str::to_string)),
            })
            .collect();
        Self {
            length: program.len(),
            unique: freq.len(),
            min: program.iter().min().copied(),
            max: program.iter().max().copied(),
            top,
            small_ints,
            likely_opcodes,
            other,
        }
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

impl fmt::Display for ValueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Top {} most frequent bytecode values:", self.top.len())?;
        writeln!(f, "VALUE   | COUNT  | PERCENTAGE")?;
        writeln!(f, "--------|--------|------------")?;
        for entry in &self.top {
            write!(
                f,
                "{:>6}  | {:>6}  | {:.2}%",
                entry.value,
                entry.count,
                percent(entry.count, self.length)
            )?;
            if let Some(label) = &entry.label {
                write!(f, "  {}", label)?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Small integers (odd values): {} ({:.1}%)",
            self.small_ints,
            percent(self.small_ints, self.length)
        )?;
        writeln!(
            f,
            "Likely opcodes (0-99):       {} ({:.1}%)",
            self.likely_opcodes,
            percent(self.likely_opcodes, self.length)
        )?;
        writeln!(
            f,
            "Other values (refs/data):    {} ({:.1}%)",
            self.other,
            percent(self.other, self.length)
        )
    }
}

/// Convenience wrapper used by tooling: disassemble with an optional instruction limit.
pub fn disassemble(
    program: &[i32],
    opcodes: &OpcodeMap,
    decoder: &ConstantDecoder,
    limit: Option<usize>,
) -> Disassembly {
    let dis = Disassembler::new(program, opcodes, decoder);
    match limit {
        Some(limit) => dis.with_limit(limit).disassemble(),
        None => dis.disassemble(),
    }
}
