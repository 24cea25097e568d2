use crate::val::Val;

use super::context::{Context, Frame};

/// Result of a successful [`raise`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    /// Arena index of the frame that caught the exception.
    pub frame: usize,
    /// Address execution resumes at.
    pub target: usize,
    /// Frames above the handler frame, released during unwinding.
    pub released: Vec<Frame>,
}

/// Routes `exception` to the nearest frame with a handler target, never searching below `floor`.
///
/// Every level between the current frame and the handler is visited in order. On success the
/// exception is parked in the handler frame's pending slot and that frame becomes current at the
/// handler address. The handler target stays set; catch code disarms it with
/// [`Context::clear_handler`] before it may throw again. When no eligible frame exists the
/// context is left untouched and the exception is handed back.
pub fn raise(ctx: &mut Context, exception: Val, floor: usize) -> Result<Recovered, Val> {
    let mut cursor = Some(ctx.current_index());
    let found = loop {
        match cursor {
            Some(i) if i >= floor => {
                let frame = &ctx.frames()[i];
                if frame.handler.is_some() {
                    break Some(i);
                }
                cursor = frame.parent;
            }
            _ => break None,
        }
    };
    let Some(index) = found else {
        return Err(exception);
    };

    let released = ctx.truncate(index + 1);
    let frame = &mut ctx.frames_mut()[index];
    let Some(target) = frame.handler else {
        return Err(exception);
    };
    frame.pending = Some(exception);
    frame.ip = target;
    tracing::debug!(frame = index, target, released = released.len(), "exception routed to handler");
    Ok(Recovered {
        frame: index,
        target,
        released,
    })
}
