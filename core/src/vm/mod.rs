//! Bytecode VM subsystem
//!
//! Constant decoding, the frame chain and exception routing, the dispatch loop, and the offline
//! disassembler that shares the decoders with it.

mod artifact;
mod constant;
mod context;
mod disasm;
mod handler;
mod host;
mod opcode;
mod program;
mod router;
mod trace;
#[allow(clippy::module_inception)]
mod vm;

pub use artifact::*;
pub use constant::*;
pub use context::{Context, Frame, FrameKind};
pub use disasm::*;
pub use handler::{Flow, HandlerCx, HandlerRegistry, HandlerTable, OpcodeHandler};
pub use host::{HostCapabilities, HostFn, Interceptor};
pub use opcode::{OpcodeMap, OpcodeMeta, OperandClass};
pub use program::{Program, ProgramStats};
pub use router::{Recovered, raise};
pub use trace::{StepOutcome, TraceArtifact, TraceEntry, TraceEvent, TraceRecorder, TraceSink};
pub use vm::{Machine, RunOutcome, Vm, VmState};

#[cfg(test)]
mod vm_test;
