use std::sync::Arc;

use crate::config::DEFAULT_MAX_CALL_DEPTH;
use crate::error::{Fault, Thrown};
use crate::val::Val;

use super::constant::ConstantDecoder;
use super::context::Context;
use super::handler::{Flow, HandlerCx, HandlerTable};
use super::host::HostCapabilities;
use super::program::Program;
use super::router;
use super::trace::{StepOutcome, TraceEvent, TraceSink};

/// Immutable half of the VM: everything that can be shared between runs and threads.
#[derive(Debug, Clone)]
pub struct Machine {
    program: Program,
    handlers: HandlerTable,
    decoder: ConstantDecoder,
    host: HostCapabilities,
    max_steps: Option<u64>,
    max_call_depth: usize,
}

impl Machine {
    pub fn new(program: impl Into<Program>, handlers: HandlerTable) -> Self {
        Self {
            program: program.into(),
            handlers,
            decoder: ConstantDecoder::default(),
            host: HostCapabilities::new(),
            max_steps: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_decoder(mut self, decoder: ConstantDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_host(mut self, host: HostCapabilities) -> Self {
        self.host = host;
        self
    }

    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Bounds nested bytecode calls; the call past the bound throws a `RangeError`.
    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    #[inline]
    pub fn program(&self) -> &[i32] {
        self.program.slots()
    }

    #[inline]
    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    #[inline]
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    #[inline]
    pub fn decoder(&self) -> &ConstantDecoder {
        &self.decoder
    }

    #[inline]
    pub fn host(&self) -> &HostCapabilities {
        &self.host
    }
}

/// Mutable state of one run.
pub(crate) struct Execution<'s> {
    pub(crate) ctx: Context,
    pub(crate) sink: Option<&'s mut dyn TraceSink>,
    pub(crate) steps: u64,
    pub(crate) max_steps: Option<u64>,
    pub(crate) result: Option<Val>,
    /// Nested dispatch loops currently running below the root loop.
    pub(crate) calls: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    Halted,
    Faulted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub state: VmState,
    pub result: Option<Val>,
    pub steps: u64,
    pub fault: Option<Fault>,
}

impl RunOutcome {
    pub fn into_result(self) -> Result<Val, Fault> {
        match self.fault {
            Some(fault) => Err(fault),
            None => Ok(self.result.unwrap_or_default()),
        }
    }
}

/// How a dispatch loop ended without an error.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Exit {
    Halted,
    Returned(Val),
}

/// One run of a [`Machine`].
pub struct Vm<'s> {
    machine: Arc<Machine>,
    exec: Execution<'s>,
    state: VmState,
    fault: Option<Fault>,
}

impl<'s> Vm<'s> {
    pub fn new(machine: Arc<Machine>) -> Self {
        let ctx = Context::new(machine.program().len());
        let max_steps = machine.max_steps;
        Self {
            machine,
            exec: Execution {
                ctx,
                sink: None,
                steps: 0,
                max_steps,
                result: None,
                calls: 0,
            },
            state: VmState::Running,
            fault: None,
        }
    }

    pub fn with_trace(mut self, sink: &'s mut dyn TraceSink) -> Self {
        self.exec.sink = Some(sink);
        self
    }

    #[inline]
    pub fn state(&self) -> VmState {
        self.state
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.exec.ctx
    }

    /// Mutable access for seeding locals or handler targets before running.
    #[inline]
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.exec.ctx
    }

    #[inline]
    pub fn steps(&self) -> u64 {
        self.exec.steps
    }

    /// Runs until the program halts or faults. Calling it again returns the same outcome.
    pub fn run(&mut self) -> RunOutcome {
        if self.state == VmState::Running {
            let machine = Arc::clone(&self.machine);
            match dispatch(&machine, &mut self.exec, 0) {
                Ok(Exit::Halted) | Err(Thrown::Halt) => self.state = VmState::Halted,
                Ok(Exit::Returned(value)) => {
                    self.exec.result = Some(value);
                    self.state = VmState::Halted;
                }
                Err(Thrown::Exception(value)) => {
                    self.fault = Some(Fault::UnhandledRuntimeException { value });
                    self.state = VmState::Faulted;
                }
                Err(Thrown::Fault(fault)) => {
                    self.fault = Some(fault);
                    self.state = VmState::Faulted;
                }
            }
            match &self.fault {
                Some(fault) => tracing::debug!(steps = self.exec.steps, %fault, "run faulted"),
                None => tracing::debug!(steps = self.exec.steps, "run halted"),
            }
        }
        RunOutcome {
            state: self.state,
            result: self.exec.result.clone(),
            steps: self.exec.steps,
            fault: self.fault.clone(),
        }
    }
}

/// Fetch/dispatch loop over frames at or above `base`.
///
/// `base` is the frame depth owned by the caller: `0` for the root loop, the caller's depth for
/// a nested call. Exceptions no frame at or above `base` handles are returned to the caller.
pub(crate) fn dispatch(machine: &Machine, exec: &mut Execution<'_>, base: usize) -> Result<Exit, Thrown> {
    let program = machine.program();
    loop {
        let address = exec.ctx.ip();
        if address >= program.len() {
            return Err(Fault::OperandBounds {
                address,
                len: program.len(),
            }
            .into());
        }
        if let Some(limit) = exec.max_steps {
            if exec.steps >= limit {
                return Err(Fault::StepLimit { limit }.into());
            }
        }
        let opcode = program[address];
        exec.ctx.set_ip(address + 1);
        let Some((handler, name)) = machine.handlers().get(opcode) else {
            return Err(Fault::UnknownOpcode { address, opcode }.into());
        };
        exec.steps += 1;
        let depth = exec.ctx.depth();

        let result = {
            let mut cx = HandlerCx::new(machine, exec, address, opcode, base);
            handler(&mut cx)
        };

        let outcome = match &result {
            Ok(Flow::Continue) => StepOutcome::Continue,
            Ok(Flow::Halt) | Err(Thrown::Halt) => StepOutcome::Halt,
            Ok(Flow::Return(_)) => StepOutcome::Return,
            Err(Thrown::Exception(_)) => StepOutcome::Exception,
            Err(Thrown::Fault(_)) => StepOutcome::Fault,
        };
        tracing::trace!(address, opcode, name, ?outcome, depth, "dispatch");
        if let Some(sink) = exec.sink.as_deref_mut() {
            sink.instr(&TraceEvent {
                address,
                opcode,
                name,
                outcome,
                depth,
            });
        }

        match result {
            Ok(Flow::Continue) => {}
            Ok(Flow::Halt) | Err(Thrown::Halt) => return Ok(Exit::Halted),
            Ok(Flow::Return(value)) => {
                if base > 0 {
                    exec.ctx.truncate(base);
                }
                return Ok(Exit::Returned(value));
            }
            Err(Thrown::Exception(value)) => match router::raise(&mut exec.ctx, value, base) {
                Ok(recovered) => {
                    tracing::debug!(address, target = recovered.target, "exception caught");
                }
                Err(value) => {
                    tracing::debug!(address, %value, base, "exception left dispatch loop");
                    if base > 0 {
                        exec.ctx.truncate(base);
                    }
                    return Err(Thrown::Exception(value));
                }
            },
            Err(Thrown::Fault(fault)) => {
                tracing::debug!(address, %fault, "handler fault");
                return Err(Thrown::Fault(fault));
            }
        }
    }
}
