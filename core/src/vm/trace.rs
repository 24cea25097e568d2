//! Per-instruction instrumentation.
//!
//! Pass a [`TraceSink`] to the VM to observe every dispatched instruction. Closures taking a
//! `&TraceEvent` are sinks too.

use serde::{Deserialize, Serialize};

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

/// What a single dispatched instruction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    Continue,
    Halt,
    Return,
    /// Raised a runtime exception (whether or not it was caught).
    Exception,
    Fault,
}

#[derive(Debug, Clone, Copy)]
pub struct TraceEvent<'a> {
    pub address: usize,
    pub opcode: i32,
    pub name: &'a str,
    pub outcome: StepOutcome,
    /// Frame depth when the instruction was fetched.
    pub depth: usize,
}

pub trait TraceSink {
    fn instr(&mut self, event: &TraceEvent<'_>);
}

impl<F> TraceSink for F
where
    F: FnMut(&TraceEvent<'_>),
{
    fn instr(&mut self, event: &TraceEvent<'_>) {
        self(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub ip: usize,
    pub opcode: i32,
    pub name: String,
    pub outcome: StepOutcome,
    pub depth: usize,
}

/// Serialized form: `{totalOperations, trace}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceArtifact {
    pub total_operations: u64,
    pub trace: Vec<TraceEntry>,
}

/// Keeps the first `limit` events plus opcode frequencies over the whole run.
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    limit: usize,
    total: u64,
    trace: Vec<TraceEntry>,
    frequencies: FastHashMap<i32, u64>,
}

impl TraceRecorder {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            total: 0,
            trace: Vec::with_capacity(limit.min(4096)),
            frequencies: fast_hash_map_new(),
        }
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Opcode counts, most frequent first, ties by opcode id.
    pub fn frequencies(&self) -> Vec<(i32, u64)> {
        let mut out: Vec<(i32, u64)> = self.frequencies.iter().map(|(k, v)| (*k, *v)).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    pub fn artifact(&self) -> TraceArtifact {
        TraceArtifact {
            total_operations: self.total,
            trace: self.trace.clone(),
        }
    }

    pub fn into_artifact(self) -> TraceArtifact {
        TraceArtifact {
            total_operations: self.total,
            trace: self.trace,
        }
    }
}

impl TraceSink for TraceRecorder {
    fn instr(&mut self, event: &TraceEvent<'_>) {
        self.total += 1;
        *self.frequencies.entry(event.opcode).or_insert(0) += 1;
        if self.trace.len() < self.limit {
            self.trace.push(TraceEntry {
                ip: event.address,
                opcode: event.opcode,
                name: event.name.to_string(),
                outcome: event.outcome,
                depth: event.depth,
            });
        }
    }
}
