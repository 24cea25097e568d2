use crate::error::{Fault, Thrown};
use crate::val::Val;

use super::constant::ConstantDecoder;

/// How a frame was introduced; decides what happens to its ip when it is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Root,
    /// Lexical scope inside the same instruction stream; its ip flows back to the parent on pop.
    Scope,
    /// Nested invocation; the caller resumes at its own saved ip.
    Call,
}

/// 单个执行帧。
///
/// 局部变量按槽位编号存放，未绑定的槽位为 `None`。
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub ip: usize,
    pub locals: Vec<Option<Val>>,
    pub handler: Option<usize>,
    pub pending: Option<Val>,
    pub parent: Option<usize>,
    pub kind: FrameKind,
}

impl Frame {
    fn new(ip: usize, parent: Option<usize>, kind: FrameKind) -> Self {
        Self {
            ip,
            locals: Vec::new(),
            handler: None,
            pending: None,
            parent,
            kind,
        }
    }

    #[inline]
    pub fn local(&self, index: u32) -> Option<&Val> {
        self.locals.get(index as usize).and_then(Option::as_ref)
    }

    pub fn store(&mut self, index: u32, value: Val) {
        let index = index as usize;
        if index >= self.locals.len() {
            self.locals.resize(index + 1, None);
        }
        self.locals[index] = Some(value);
    }
}

/// 执行上下文：帧链及指向当前帧的游标。
///
/// Frames live in an arena owned by the context. Parent links are indices into that arena and
/// the current frame is always the last one.
#[derive(Debug, Clone)]
pub struct Context {
    frames: Vec<Frame>,
    program_len: usize,
}

impl Context {
    pub fn new(program_len: usize) -> Self {
        Self::with_entry(program_len, 0)
    }

    pub fn with_entry(program_len: usize, entry: usize) -> Self {
        Self {
            frames: vec![Frame::new(entry, None, FrameKind::Root)],
            program_len,
        }
    }

    #[inline]
    pub fn program_len(&self) -> usize {
        self.program_len
    }

    /// Number of live frames, root included.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.frames.len() - 1
    }

    #[inline]
    pub fn current(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    #[inline]
    pub fn ip(&self) -> usize {
        self.current().ip
    }

    #[inline]
    pub fn set_ip(&mut self, ip: usize) {
        self.current_mut().ip = ip;
    }

    /// Moves the current ip to `target` after checking it addresses the program.
    pub fn jump(&mut self, target: usize) -> Result<(), Fault> {
        self.check_target(target)?;
        self.set_ip(target);
        Ok(())
    }

    fn check_target(&self, target: usize) -> Result<(), Fault> {
        if target >= self.program_len {
            return Err(Fault::OperandBounds {
                address: target,
                len: self.program_len,
            });
        }
        Ok(())
    }

    /// Reads the destination slot at the current ip and stores `value` there.
    pub fn write(&mut self, program: &[i32], decoder: &ConstantDecoder, value: Val) -> Result<u32, Fault> {
        let mut ip = self.ip();
        let slot = decoder.decode_slot(program, &mut ip)?;
        self.set_ip(ip);
        self.current_mut().store(slot, value);
        Ok(slot)
    }

    /// Reads a slot reference at the current ip and resolves it through the frame chain.
    ///
    /// An unbound slot is a catchable runtime exception rather than a fault.
    pub fn read_var(&mut self, program: &[i32], decoder: &ConstantDecoder) -> Result<Val, Thrown> {
        let mut ip = self.ip();
        let slot = decoder.decode_slot(program, &mut ip)?;
        self.set_ip(ip);
        self.resolve(slot).cloned().ok_or_else(|| Thrown::unbound(slot))
    }

    /// Chain lookup starting at the current frame.
    pub fn resolve(&self, index: u32) -> Option<&Val> {
        let mut cursor = Some(self.current_index());
        while let Some(i) = cursor {
            let frame = &self.frames[i];
            if let Some(value) = frame.local(index) {
                return Some(value);
            }
            cursor = frame.parent;
        }
        None
    }

    /// Stores into the innermost frame already binding `index`, else into the current frame.
    pub fn assign(&mut self, index: u32, value: Val) {
        let mut cursor = Some(self.current_index());
        while let Some(i) = cursor {
            if self.frames[i].local(index).is_some() {
                self.frames[i].store(index, value);
                return;
            }
            cursor = self.frames[i].parent;
        }
        self.current_mut().store(index, value);
    }

    #[inline]
    pub fn store(&mut self, index: u32, value: Val) {
        self.current_mut().store(index, value);
    }

    /// Enters a child scope that continues at the current ip.
    pub fn push_frame(&mut self, handler: Option<usize>) -> Result<usize, Fault> {
        if let Some(target) = handler {
            self.check_target(target)?;
        }
        let parent = self.current_index();
        let mut frame = Frame::new(self.ip(), Some(parent), FrameKind::Scope);
        frame.handler = handler;
        self.frames.push(frame);
        Ok(self.current_index())
    }

    /// Enters a call frame starting at `entry`; the caller keeps its own ip.
    pub fn push_call(&mut self, entry: usize) -> Result<usize, Fault> {
        self.check_target(entry)?;
        let parent = self.current_index();
        self.frames.push(Frame::new(entry, Some(parent), FrameKind::Call));
        Ok(self.current_index())
    }

    /// Releases the current frame. The root frame is never popped.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        if self.frames.len() <= 1 {
            return None;
        }
        let frame = self.frames.pop()?;
        if frame.kind == FrameKind::Scope {
            self.set_ip(frame.ip);
        }
        Some(frame)
    }

    /// Releases every frame above `depth`, innermost last in the returned list.
    pub fn truncate(&mut self, depth: usize) -> Vec<Frame> {
        let depth = depth.max(1);
        if depth >= self.frames.len() {
            return Vec::new();
        }
        self.frames.split_off(depth)
    }

    pub fn set_handler(&mut self, target: usize) -> Result<(), Fault> {
        self.check_target(target)?;
        self.current_mut().handler = Some(target);
        Ok(())
    }

    pub fn clear_handler(&mut self) -> Option<usize> {
        self.current_mut().handler.take()
    }

    #[inline]
    pub fn pending(&self) -> Option<&Val> {
        self.current().pending.as_ref()
    }

    pub fn take_pending(&mut self) -> Option<Val> {
        self.current_mut().pending.take()
    }

    pub(crate) fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }
}
