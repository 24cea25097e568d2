//! Runtime configuration shared by the CLI, the disassembler and the VM.

use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::Fault;
use crate::stream::Alphabet;
use crate::vm::{CharMode, ConstantDecoder, StringPool, TagTable};

/// Reference digit alphabet; 71 characters, one of them a Cyrillic `М`.
pub const DEFAULT_ALPHABET: &str = "OhМufJ5StvER1M~QCXWryDKi^dHqgGx0c9<k6a2I>$meP3onTB=LwlZj+Ns|VY4AbU78zpF";
pub const DEFAULT_BASE: usize = 43;
pub const DEFAULT_TRACE_LIMIT: usize = 1000;
/// Nested bytecode calls allowed before a `RangeError`; each call uses native stack.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub alphabet: String,
    pub base: usize,
    pub tags: TagTable,
    pub chars: CharMode,
    /// Extract the embedded string pool before running or disassembling.
    pub string_pool: bool,
    /// Handler invocation budget; `None` runs until halt or fault.
    pub max_steps: Option<u64>,
    /// Nested bytecode call bound.
    pub max_call_depth: usize,
    /// Maximum number of events kept by a trace recorder.
    pub trace_limit: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.to_string(),
            base: DEFAULT_BASE,
            tags: TagTable::default(),
            chars: CharMode::default(),
            string_pool: false,
            max_steps: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace_limit: DEFAULT_TRACE_LIMIT,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: VmConfig = toml::from_str(text).context("Failed to parse VM config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), Fault> {
        self.tags.validate()?;
        self.alphabet()?;
        Ok(())
    }

    pub fn alphabet(&self) -> Result<Alphabet, Fault> {
        Alphabet::new(&self.alphabet, self.base)
    }

    pub fn decoder(&self) -> ConstantDecoder {
        ConstantDecoder::new(self.tags, Arc::new(self.chars))
    }

    /// Applies the configured string mode to a freshly decoded program.
    ///
    /// Returns the program that should be executed together with a decoder that knows about the
    /// pool, if one was extracted.
    pub fn prepare(&self, program: Vec<i32>) -> Result<(Vec<i32>, ConstantDecoder), Fault> {
        let decoder = self.decoder();
        if !self.string_pool {
            return Ok((program, decoder));
        }
        let (program, pool) = StringPool::extract(&program, &self.tags, &self.chars)?;
        tracing::debug!(units = pool.len(), remaining = program.len(), "extracted string pool");
        Ok((program, decoder.with_pool(pool)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reproduce_reference_layout() {
        let config = VmConfig::default();
        assert_eq!(config.base, 43);
        assert_eq!(config.alphabet().unwrap().radix(), 28);
        assert_eq!(config.tags.string_tag, 2);
        assert_eq!(config.trace_limit, 1000);
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = VmConfig::from_toml_str(
            r#"
alphabet = "0123456789"
base = 5
chars = "identity"
max_steps = 64
max_call_depth = 16

[tags]
undefined = 50
"#,
        )
        .unwrap();
        assert_eq!(config.base, 5);
        assert_eq!(config.chars, CharMode::Identity);
        assert_eq!(config.max_steps, Some(64));
        assert_eq!(config.max_call_depth, 16);
        assert_eq!(config.tags.undefined, Some(50));
        assert_eq!(config.tags.true_tag, 22);
    }

    #[test]
    fn rejects_odd_tag_marker() {
        let err = VmConfig::from_toml_str("[tags]\ntrue = 21\n").unwrap_err();
        assert!(format!("{:#}", err).contains("must be even"));
    }

    #[test]
    fn rejects_colliding_tag_markers() {
        let err = VmConfig::from_toml_str("[tags]\nnull = 22\n").unwrap_err();
        assert!(format!("{:#}", err).contains("share value 22"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vm.toml");
        fs::write(&path, "base = 40\n").unwrap();
        let config = VmConfig::load(&path).unwrap();
        assert_eq!(config.base, 40);
    }
}
