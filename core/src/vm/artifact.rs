//! Program artifacts: the JSON bytecode dump and the TGVB binary container.
//!
//! TGVB layout: magic, `u16` version, `u16` reserved, `u32` flags, then tagged sections
//! (`[u8; 4]` tag, `u32` length, payload). Unknown sections are skipped.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::config::VmConfig;

use super::constant::TagTable;
use super::program::ProgramStats;

const MAGIC: [u8; 4] = *b"TGVB";
pub const CURRENT_VERSION: u16 = 1;

/// JSON dump: `{bytecode, stats?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodeArtifact {
    pub bytecode: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProgramStats>,
}

impl BytecodeArtifact {
    pub fn new(bytecode: Vec<i32>) -> Self {
        let stats = Some(ProgramStats::of(&bytecode));
        Self { bytecode, stats }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let artifact: BytecodeArtifact = serde_json::from_str(text).context("Failed to parse bytecode artifact")?;
        if let Some(stats) = &artifact.stats {
            if stats.length != artifact.bytecode.len() {
                tracing::warn!(
                    declared = stats.length,
                    actual = artifact.bytecode.len(),
                    "bytecode artifact stats disagree with payload"
                );
            }
        }
        Ok(artifact)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleFlags(u32);

impl ModuleFlags {
    pub const NONE: ModuleFlags = ModuleFlags(0);
    /// The program still carries its embedded string pool.
    pub const STRING_POOL: ModuleFlags = ModuleFlags(1 << 0);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> ModuleFlags {
        ModuleFlags(bits)
    }

    #[inline]
    pub const fn contains(self, other: ModuleFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ModuleFlags) {
        self.0 |= other.0;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMeta {
    /// Where the program was decoded from.
    pub source: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ModuleMeta {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeModule {
    pub version: u16,
    pub flags: ModuleFlags,
    pub program: Vec<i32>,
    /// Tag markers the program was produced with, when they differ from the defaults.
    pub tags: Option<TagTable>,
    pub meta: Option<ModuleMeta>,
}

impl BytecodeModule {
    pub fn new(program: Vec<i32>) -> Self {
        Self {
            version: CURRENT_VERSION,
            flags: ModuleFlags::NONE,
            program,
            tags: None,
            meta: None,
        }
    }
}

pub fn encode_module(module: &BytecodeModule) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(16 + module.program.len() * 4);
    out.extend_from_slice(&MAGIC);
    write_u16(&mut out, module.version);
    write_u16(&mut out, 0); // reserved
    write_u32(&mut out, module.flags.bits());

    let mut prog = Vec::with_capacity(4 + module.program.len() * 4);
    let count = u32::try_from(module.program.len()).context("program too large for TGVB")?;
    write_u32(&mut prog, count);
    for value in &module.program {
        prog.extend_from_slice(&value.to_le_bytes());
    }
    write_section(&mut out, *b"PROG", &prog)?;

    if let Some(tags) = module.tags.as_ref() {
        write_section(&mut out, *b"TAGS", &serde_json::to_vec(tags)?)?;
    }

    if let Some(meta) = module.meta.as_ref().filter(|m| !m.is_empty()) {
        write_section(&mut out, *b"META", &serde_json::to_vec(meta)?)?;
    }

    Ok(out)
}

pub fn decode_module(bytes: &[u8]) -> Result<BytecodeModule> {
    ensure!(bytes.len() >= 12, "module too small");
    ensure!(bytes[..4] == MAGIC, "invalid TGVB magic");

    let mut cursor = 4;
    let version = read_u16(bytes, &mut cursor)?;
    let _reserved = read_u16(bytes, &mut cursor)?;
    let flags = ModuleFlags::from_bits(read_u32(bytes, &mut cursor)?);
    ensure!(
        version <= CURRENT_VERSION,
        "unsupported TGVB version {} (reader supports <= {})",
        version,
        CURRENT_VERSION
    );

    let mut program: Option<Vec<i32>> = None;
    let mut tags: Option<TagTable> = None;
    let mut meta: Option<ModuleMeta> = None;

    while cursor < bytes.len() {
        let tag = read_tag(bytes, &mut cursor)?;
        let len = read_u32(bytes, &mut cursor)? as usize;
        ensure!(cursor + len <= bytes.len(), "section overruns payload");
        let payload = &bytes[cursor..cursor + len];
        cursor += len;

        match &tag {
            b"PROG" => {
                ensure!(program.is_none(), "duplicate PROG section");
                program = Some(decode_program(payload)?);
            }
            b"TAGS" => {
                ensure!(tags.is_none(), "duplicate TAGS section");
                let table: TagTable = serde_json::from_slice(payload)?;
                table.validate()?;
                tags = Some(table);
            }
            b"META" => {
                ensure!(meta.is_none(), "duplicate META section");
                meta = Some(serde_json::from_slice(payload)?);
            }
            _ => {}
        }
    }

    let program = program.ok_or_else(|| anyhow::anyhow!("missing PROG section"))?;
    Ok(BytecodeModule {
        version,
        flags,
        program,
        tags,
        meta,
    })
}

fn decode_program(payload: &[u8]) -> Result<Vec<i32>> {
    let mut cursor = 0;
    let count = read_u32(payload, &mut cursor)? as usize;
    ensure!(
        payload.len() == 4 + count * 4,
        "PROG section declares {} slots but carries {} bytes",
        count,
        payload.len() - 4
    );
    Ok(payload[4..]
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Program read from disk together with anything its container pinned down.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedProgram {
    pub program: Vec<i32>,
    pub tags: Option<TagTable>,
    pub flags: ModuleFlags,
}

/// Reads a program in any supported form, sniffing the content:
/// a TGVB container, a JSON bytecode artifact, or an encoded stream decoded with `config`.
pub fn load_program(path: impl AsRef<Path>, config: &VmConfig) -> Result<LoadedProgram> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Failed to read program {}", path.display()))?;
    let loaded = parse_program(&bytes, config).with_context(|| format!("Invalid program {}", path.display()))?;
    tracing::info!(path = %path.display(), slots = loaded.program.len(), "loaded program");
    Ok(loaded)
}

pub fn parse_program(bytes: &[u8], config: &VmConfig) -> Result<LoadedProgram> {
    if bytes.starts_with(&MAGIC) {
        let module = decode_module(bytes)?;
        return Ok(LoadedProgram {
            program: module.program,
            tags: module.tags,
            flags: module.flags,
        });
    }
    let Ok(text) = std::str::from_utf8(bytes) else {
        bail!("program is neither a TGVB container nor UTF-8 text");
    };
    let text = text.trim();
    if text.starts_with('{') {
        let artifact = BytecodeArtifact::from_json_str(text)?;
        return Ok(LoadedProgram {
            program: artifact.bytecode,
            tags: None,
            flags: ModuleFlags::NONE,
        });
    }
    let program = config.alphabet()?.decode(text)?;
    Ok(LoadedProgram {
        program,
        tags: None,
        flags: ModuleFlags::NONE,
    })
}

fn write_section(out: &mut Vec<u8>, tag: [u8; 4], payload: &[u8]) -> Result<()> {
    out.extend_from_slice(&tag);
    write_u32(out, u32::try_from(payload.len()).context("section too large")?);
    out.extend_from_slice(payload);
    Ok(())
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    ensure!(*cursor + 2 <= bytes.len(), "unexpected EOF reading u16");
    let value = u16::from_le_bytes([bytes[*cursor], bytes[*cursor + 1]]);
    *cursor += 2;
    Ok(value)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    ensure!(*cursor + 4 <= bytes.len(), "unexpected EOF reading u32");
    let value = u32::from_le_bytes([
        bytes[*cursor],
        bytes[*cursor + 1],
        bytes[*cursor + 2],
        bytes[*cursor + 3],
    ]);
    *cursor += 4;
    Ok(value)
}

fn read_tag(bytes: &[u8], cursor: &mut usize) -> Result<[u8; 4]> {
    ensure!(*cursor + 4 <= bytes.len(), "unexpected EOF reading section tag");
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&bytes[*cursor..*cursor + 4]);
    *cursor += 4;
    Ok(tag)
}
