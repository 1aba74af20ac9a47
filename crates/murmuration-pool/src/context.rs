//! Per-task execution context handed to every work item.

use murmuration_arena::ArenaFrame;
use murmuration_core::WorkerId;

/// Execution context for one work item.
///
/// Carries the executing thread's identity and a fresh scratch frame over
/// that thread's private arena. The frame is reset (dropped) when the
/// work item returns, so scratch allocations cannot leak across tasks.
#[derive(Debug)]
pub struct TaskContext<'a> {
    worker: WorkerId,
    /// Scratch frame over the executing thread's arena.
    pub scratch: ArenaFrame<'a>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(worker: WorkerId, scratch: ArenaFrame<'a>) -> Self {
        Self { worker, scratch }
    }

    /// Identity of the executing thread ([`WorkerId::MAIN`] when the
    /// waiting caller drained this item itself).
    pub fn worker(&self) -> WorkerId {
        self.worker
    }
}
