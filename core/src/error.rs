use std::fmt;

use crate::val::Val;

/// Terminal failure of a decode, disassembly or dispatch run.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Invalid character, bad alphabet or truncated number in the encoded stream.
    Decode { position: usize, message: String },
    /// A constant operand ran past the end of the program or carried an invalid payload.
    ConstantTag { position: usize, message: String },
    /// Dispatch fetched an opcode id with no handler behind it.
    UnknownOpcode { address: usize, opcode: i32 },
    /// The instruction pointer or a jump target left the program.
    OperandBounds { address: usize, len: usize },
    /// A runtime exception reached the end of the frame chain.
    UnhandledRuntimeException { value: Val },
    /// Missing or malformed handler table, opcode metadata or VM configuration.
    Config(String),
    /// The configured instruction budget was exhausted.
    StepLimit { limit: u64 },
}

impl Fault {
    pub fn decode(position: usize, message: impl Into<String>) -> Self {
        Fault::Decode {
            position,
            message: message.into(),
        }
    }

    pub fn constant(position: usize, message: impl Into<String>) -> Self {
        Fault::ConstantTag {
            position,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Fault::Config(message.into())
    }

    /// Stable taxonomy name, used in CLI output and trace summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::Decode { .. } => "DecodeFault",
            Fault::ConstantTag { .. } => "ConstantTagFault",
            Fault::UnknownOpcode { .. } => "UnknownOpcodeFault",
            Fault::OperandBounds { .. } => "OperandBoundsFault",
            Fault::UnhandledRuntimeException { .. } => "UnhandledRuntimeException",
            Fault::Config(_) => "ConfigFault",
            Fault::StepLimit { .. } => "StepLimitFault",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Decode { position, message } => {
                write!(f, "{}: {} at input position {}", self.kind(), message, position)
            }
            Fault::ConstantTag { position, message } => {
                write!(f, "{}: {} at program slot {}", self.kind(), message, position)
            }
            Fault::UnknownOpcode { address, opcode } => {
                write!(f, "{}: opcode {} at address {} has no handler", self.kind(), opcode, address)
            }
            Fault::OperandBounds { address, len } => {
                write!(f, "{}: address {} outside program of length {}", self.kind(), address, len)
            }
            Fault::UnhandledRuntimeException { value } => {
                write!(f, "{}: {}", self.kind(), value)
            }
            Fault::Config(message) => write!(f, "{}: {}", self.kind(), message),
            Fault::StepLimit { limit } => {
                write!(f, "{}: instruction budget of {} steps exhausted", self.kind(), limit)
            }
        }
    }
}

impl std::error::Error for Fault {}

/// Error channel of an opcode handler.
///
/// `Exception` values are offered to the exception router and may be caught by bytecode;
/// `Fault` values terminate the run immediately. `Halt` unwinds every enclosing call after a
/// nested `HALT`, skipping the callers' remaining operand reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Thrown {
    Exception(Val),
    Fault(Fault),
    Halt,
}

impl Thrown {
    pub fn exception(value: impl Into<Val>) -> Self {
        Thrown::Exception(value.into())
    }

    /// Catchable error for a variable no frame in the chain binds.
    pub fn unbound(slot: u32) -> Self {
        Thrown::exception(format!("ReferenceError: v{} is not defined", slot))
    }
}

impl From<Fault> for Thrown {
    fn from(fault: Fault) -> Self {
        Thrown::Fault(fault)
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thrown::Exception(value) => write!(f, "uncaught {}", value),
            Thrown::Fault(fault) => fmt::Display::fmt(fault, f),
            Thrown::Halt => f.write_str("halt"),
        }
    }
}

impl std::error::Error for Thrown {}
