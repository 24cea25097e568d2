//! Opcode handlers and the view of the VM they operate on.

use std::sync::Arc;

use crate::error::{Fault, Thrown};
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::Val;

use super::constant::Constant;
use super::context::{Context, Frame};
use super::host::HostCapabilities;
use super::opcode::OpcodeMap;
use super::trace::TraceSink;
use super::vm::{Execution, Exit, Machine, dispatch};

/// Control-flow decision returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue,
    /// Stop the whole run.
    Halt,
    /// Leave the current call with a value; at the root this ends the run.
    Return(Val),
}

pub type OpcodeHandler = fn(&mut HandlerCx<'_, '_>) -> Result<Flow, Thrown>;

/// Handlers addressed by opcode name, used to build a [`HandlerTable`] from an opcode map.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    by_name: FastHashMap<String, OpcodeHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            by_name: fast_hash_map_new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: OpcodeHandler) -> &mut Self {
        self.by_name.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<OpcodeHandler> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Dense `opcode id -> handler` array. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    handlers: Vec<Option<(OpcodeHandler, Arc<str>)>>,
}

impl HandlerTable {
    pub fn new(size: usize) -> Self {
        Self {
            handlers: vec![None; size],
        }
    }

    /// Assigns `id`, growing the table if needed.
    pub fn set(&mut self, id: usize, name: &str, handler: OpcodeHandler) -> &mut Self {
        if id >= self.handlers.len() {
            self.handlers.resize(id + 1, None);
        }
        self.handlers[id] = Some((handler, Arc::from(name)));
        self
    }

    #[inline]
    pub fn get(&self, id: i32) -> Option<(OpcodeHandler, &str)> {
        let idx = usize::try_from(id).ok()?;
        self.handlers
            .get(idx)
            .and_then(Option::as_ref)
            .map(|(handler, name)| (*handler, name.as_ref()))
    }

    /// Table size; ids at or above it are unknown.
    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn assigned(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    /// Builds a table from metadata, taking each opcode's handler from `registry` by name.
    ///
    /// Opcodes without a registered handler stay unassigned and fault when dispatched.
    pub fn bind(map: &OpcodeMap, registry: &HandlerRegistry) -> Result<Self, Fault> {
        let mut table = HandlerTable::new(map.table_size());
        for (id, meta) in map.iter() {
            match registry.get(&meta.name) {
                Some(handler) => {
                    table.set(id as usize, &meta.name, handler);
                }
                None => tracing::debug!(id, name = %meta.name, "opcode has no handler"),
            }
        }
        if table.assigned() == 0 {
            return Err(Fault::config("handler table has no assigned opcodes"));
        }
        Ok(table)
    }
}

/// Everything a handler may touch while it runs.
pub struct HandlerCx<'a, 's> {
    machine: &'a Machine,
    exec: &'a mut Execution<'s>,
    address: usize,
    opcode: i32,
    base: usize,
}

impl<'a, 's> HandlerCx<'a, 's> {
    pub(crate) fn new(machine: &'a Machine, exec: &'a mut Execution<'s>, address: usize, opcode: i32, base: usize) -> Self {
        Self {
            machine,
            exec,
            address,
            opcode,
            base,
        }
    }

    /// Address of the opcode being executed.
    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    #[inline]
    pub fn opcode(&self) -> i32 {
        self.opcode
    }

    #[inline]
    pub fn program(&self) -> &[i32] {
        self.machine.program()
    }

    #[inline]
    pub fn ctx(&self) -> &Context {
        &self.exec.ctx
    }

    #[inline]
    pub fn ctx_mut(&mut self) -> &mut Context {
        &mut self.exec.ctx
    }

    #[inline]
    pub fn host(&self) -> &HostCapabilities {
        self.machine.host()
    }

    /// Decodes the next inline constant.
    pub fn constant(&mut self) -> Result<Constant, Thrown> {
        let mut ip = self.exec.ctx.ip();
        let constant = self.machine.decoder().decode(self.machine.program(), &mut ip)?;
        self.exec.ctx.set_ip(ip);
        Ok(constant)
    }

    /// Decodes the next constant and resolves variable references through the frame chain.
    pub fn operand(&mut self) -> Result<Val, Thrown> {
        match self.constant()? {
            Constant::VarRef(index) => self
                .exec
                .ctx
                .resolve(index)
                .cloned()
                .ok_or_else(|| Thrown::unbound(index)),
            other => Ok(other.to_val().unwrap_or_default()),
        }
    }

    pub fn operands<const N: usize>(&mut self) -> Result<[Val; N], Thrown> {
        let mut out: [Val; N] = std::array::from_fn(|_| Val::Undefined);
        for slot in out.iter_mut() {
            *slot = self.operand()?;
        }
        Ok(out)
    }

    /// Stores `value` in the destination slot that follows the operands.
    pub fn write(&mut self, value: Val) -> Result<(), Thrown> {
        self.exec
            .ctx
            .write(self.machine.program(), self.machine.decoder(), value)?;
        Ok(())
    }

    pub fn read_var(&mut self) -> Result<Val, Thrown> {
        self.exec.ctx.read_var(self.machine.program(), self.machine.decoder())
    }

    /// Decodes a jump target constant; only non-negative small integers are addresses.
    pub fn target(&mut self) -> Result<usize, Thrown> {
        let at = self.exec.ctx.ip();
        match self.constant()? {
            Constant::SmallInt(n) if n >= 0 => Ok(n as usize),
            other => Err(Fault::constant(at, format!("jump target {} is not an address", other)).into()),
        }
    }

    pub fn jump(&mut self, target: usize) -> Result<(), Thrown> {
        self.exec.ctx.jump(target)?;
        Ok(())
    }

    /// Calls a host capability; host errors surface as catchable exceptions.
    pub fn call_host(&self, name: &str, args: &[Val]) -> Result<Val, Thrown> {
        self.machine
            .host()
            .call(name, args)
            .map_err(|err| Thrown::exception(format!("{:#}", err)))
    }

    pub fn push_frame(&mut self, handler: Option<usize>) -> Result<usize, Thrown> {
        Ok(self.exec.ctx.push_frame(handler)?)
    }

    /// Pops the current scope; frames owned by an outer dispatch loop are never popped.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        if self.exec.ctx.depth() <= self.base + 1 {
            return None;
        }
        self.exec.ctx.pop_frame()
    }

    pub fn set_handler(&mut self, target: usize) -> Result<(), Thrown> {
        Ok(self.exec.ctx.set_handler(target)?)
    }

    pub fn clear_handler(&mut self) -> Option<usize> {
        self.exec.ctx.clear_handler()
    }

    pub fn pending(&self) -> Option<&Val> {
        self.exec.ctx.pending()
    }

    pub fn take_pending(&mut self) -> Option<Val> {
        self.exec.ctx.take_pending()
    }

    /// Records the value reported as the run's result.
    pub fn set_result(&mut self, value: Val) {
        self.exec.result = Some(value);
    }

    /// Runs a nested dispatch loop starting at `entry` with `args` in slots `0..n`.
    ///
    /// Exceptions the callee does not catch cross back into this handler as `Err`. A `HALT` in
    /// the callee comes back as `Err(Thrown::Halt)` so `?` unwinds the caller too.
    pub fn call(&mut self, entry: usize, args: Vec<Val>) -> Result<Val, Thrown> {
        let limit = self.machine.max_call_depth();
        if self.exec.calls >= limit {
            return Err(Thrown::exception(format!(
                "RangeError: maximum call depth of {} exceeded",
                limit
            )));
        }
        let base = self.exec.ctx.depth();
        self.exec.ctx.push_call(entry)?;
        for (i, arg) in args.into_iter().enumerate() {
            self.exec.ctx.store(i as u32, arg);
        }
        self.exec.calls += 1;
        let exit = dispatch(self.machine, self.exec, base);
        self.exec.calls -= 1;
        match exit? {
            Exit::Returned(value) => Ok(value),
            Exit::Halted => Err(Thrown::Halt),
        }
    }

    /// Instrumentation hook installed for this run, if any.
    pub fn sink(&mut self) -> Option<&mut (dyn TraceSink + 's)> {
        self.exec.sink.as_deref_mut()
    }
}
