//! Opcode metadata: names, operand shapes and the documents they are loaded from.

use std::{collections::BTreeMap, fmt, fs, path::Path};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Operand shape of one opcode, as consumed by the disassembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OperandClass {
    #[default]
    Nullary,
    Unary,
    Binary,
    /// Object, key and value, as in a property store.
    Ternary,
    /// Callee followed by `args` arguments.
    Call { args: u8 },
    /// Unconditional jump: a single target constant.
    Jump,
    /// Conditional jump: condition and target constants.
    Branch,
}

impl OperandClass {
    /// Constant operands read before the optional destination slot.
    pub fn operand_count(self) -> usize {
        match self {
            OperandClass::Nullary => 0,
            OperandClass::Unary | OperandClass::Jump => 1,
            OperandClass::Binary | OperandClass::Branch => 2,
            OperandClass::Ternary => 3,
            OperandClass::Call { args } => 1 + args as usize,
        }
    }
}

impl fmt::Display for OperandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandClass::Nullary => f.write_str("nullary"),
            OperandClass::Unary => f.write_str("unary"),
            OperandClass::Binary => f.write_str("binary"),
            OperandClass::Ternary => f.write_str("ternary"),
            OperandClass::Call { args } => write!(f, "call/{}", args),
            OperandClass::Jump => f.write_str("jump"),
            OperandClass::Branch => f.write_str("branch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcodeMeta {
    pub name: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub class: OperandClass,
    /// Whether the instruction ends with a destination slot.
    #[serde(default)]
    pub writes: bool,
}

impl OpcodeMeta {
    pub fn new(name: impl Into<String>, operation: impl Into<String>, class: OperandClass, writes: bool) -> Self {
        Self {
            name: name.into(),
            operation: operation.into(),
            description: String::new(),
            class,
            writes,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Numeric opcode ids may arrive as integers (YAML) or as strings (JSON and TOML keys).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
enum OpcodeKey {
    Id(i64),
    Text(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OpcodeDocument {
    #[serde(default)]
    opcodes: BTreeMap<OpcodeKey, OpcodeMeta>,
}

/// Opcode id to metadata mapping, shared read-only by the VM and the disassembler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpcodeMap {
    entries: BTreeMap<u32, OpcodeMeta>,
}

impl OpcodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, meta: OpcodeMeta) -> Option<OpcodeMeta> {
        self.entries.insert(id, meta)
    }

    /// Lookup by raw program value; negative ids are never assigned.
    #[inline]
    pub fn get(&self, id: i32) -> Option<&OpcodeMeta> {
        u32::try_from(id).ok().and_then(|id| self.entries.get(&id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of a dense table covering every assigned id.
    pub fn table_size(&self) -> usize {
        self.entries.keys().next_back().map_or(0, |max| *max as usize + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &OpcodeMeta)> {
        self.entries.iter().map(|(id, meta)| (*id, meta))
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.entries.iter().find(|(_, meta)| meta.name == name).map(|(id, _)| *id)
    }

    fn from_document(doc: OpcodeDocument) -> Result<Self> {
        let mut map = OpcodeMap::new();
        for (key, meta) in doc.opcodes {
            let id = match &key {
                OpcodeKey::Id(id) => *id,
                OpcodeKey::Text(text) => text
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("Opcode key {:?} is not a number", text))?,
            };
            let Ok(id) = u32::try_from(id) else {
                bail!("Opcode id {} out of range", id);
            };
            if map.insert(id, meta).is_some() {
                bail!("Duplicate opcode id {}", id);
            }
        }
        Ok(map)
    }

    fn to_document(&self) -> OpcodeDocument {
        OpcodeDocument {
            opcodes: self
                .entries
                .iter()
                .map(|(id, meta)| (OpcodeKey::Text(id.to_string()), meta.clone()))
                .collect(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_document(serde_json::from_str(text).context("Failed to parse opcode map JSON")?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_document(serde_yaml::from_str(text).context("Failed to parse opcode map YAML")?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::from_document(toml::from_str(text).context("Failed to parse opcode map TOML")?)
    }

    /// Loads a map, picking the format from the file extension (JSON when unknown).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read opcode map {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        let map = match ext.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        }
        .with_context(|| format!("Invalid opcode map {}", path.display()))?;
        tracing::info!(path = %path.display(), opcodes = map.len(), "loaded opcode map");
        Ok(map)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }
}

impl FromIterator<(u32, OpcodeMeta)> for OpcodeMap {
    fn from_iter<T: IntoIterator<Item = (u32, OpcodeMeta)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_document_with_string_keys() {
        let map = OpcodeMap::from_json_str(
            r#"{"opcodes": {
                "0": {"name": "STRICT_EQUAL", "operation": "a === b", "class": {"kind": "binary"}, "writes": true},
                "23": {"name": "JUMP", "class": {"kind": "jump"}},
                "20": {"name": "CALL_FUNCTION", "class": {"kind": "call", "args": 2}, "writes": true}
            }}"#,
        )
        .unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.table_size(), 24);
        let eq = map.get(0).unwrap();
        assert_eq!(eq.class, OperandClass::Binary);
        assert!(eq.writes);
        assert_eq!(map.get(20).unwrap().class.operand_count(), 3);
        assert!(map.get(-1).is_none());
        assert_eq!(map.id_of("JUMP"), Some(23));
    }

    #[test]
    fn yaml_document_with_integer_keys() {
        let map = OpcodeMap::from_yaml_str(
            "opcodes:\n  7:\n    name: ADD\n    class:\n      kind: binary\n    writes: true\n",
        )
        .unwrap();
        assert_eq!(map.get(7).unwrap().name, "ADD");
    }

    #[test]
    fn toml_document() {
        let map = OpcodeMap::from_toml_str(
            "[opcodes.\"25\"]\nname = \"RETURN\"\nclass = { kind = \"unary\" }\n",
        )
        .unwrap();
        assert_eq!(map.get(25).unwrap().class, OperandClass::Unary);
        assert!(!map.get(25).unwrap().writes);
    }

    #[test]
    fn rejects_non_numeric_keys() {
        let err = OpcodeMap::from_json_str(r#"{"opcodes": {"add": {"name": "ADD"}}}"#).unwrap_err();
        assert!(format!("{:#}", err).contains("not a number"));
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.yml");
        fs::write(&path, "opcodes:\n  \"3\": {name: EQUAL}\n").unwrap();
        let map = OpcodeMap::load(&path).unwrap();
        assert_eq!(map.get(3).unwrap().name, "EQUAL");

        let json = map.to_json_pretty().unwrap();
        assert_eq!(OpcodeMap::from_json_str(&json).unwrap(), map);
    }
}
