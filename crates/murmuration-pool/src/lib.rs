//! Fixed worker pool over a lock-free MPMC work queue.
//!
//! The pool owns `n_workers` OS threads, each consuming work items from a
//! shared ring buffer and each owning a private scratch arena. Producers
//! enqueue with a single atomic increment; consumers claim slots with an
//! increment-then-verify protocol that rolls back on a race. Idle workers
//! run a three-tier adaptive wait (pause spin, cooperative yield, short
//! event wait) so a saturated frame never pays a syscall and an idle pool
//! never pins a core.
//!
//! The waiting thread participates: [`ThreadPool::wait_for_completion`]
//! drains queue items on the calling thread with its own arena until the
//! queue is empty and every worker has gone idle.
//!
//! This crate is one of two in the workspace that may contain `unsafe`
//! code (along with `murmuration-hash`): work items carry a type-erased
//! payload pointer whose validity is scoped by the safe
//! [`ThreadPool::run_batch`] / [`ThreadPool::run_batch_mut`] wrappers.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod context;
mod error;
mod event;
mod pool;
mod queue;

pub use context::TaskContext;
pub use error::PoolError;
pub use pool::{PoolStats, RawTask, RawTaskFn, ThreadPool};
