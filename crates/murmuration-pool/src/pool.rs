//! The worker pool: spawn, submit, participate, reset, shutdown.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use murmuration_arena::ScratchArena;
use murmuration_core::WorkerId;
use smallvec::SmallVec;

use crate::context::TaskContext;
use crate::error::PoolError;
use crate::event::Event;
use crate::queue::WorkQueue;

/// Entry point of a type-erased work item.
///
/// # Safety
///
/// `payload` must point to memory that outlives the item's execution;
/// the safe batch APIs guarantee this by draining the queue before the
/// payload storage goes out of scope.
pub type RawTaskFn = unsafe fn(payload: *mut u8, ctx: &mut TaskContext<'_>);

/// A type-erased work item: a function, its payload, and a priority tag.
///
/// The priority is retained for callers that want it but does not affect
/// execution order — the queue is FIFO by slot index.
#[derive(Clone, Copy, Debug)]
pub struct RawTask {
    /// Function executed by the claiming thread.
    pub run: RawTaskFn,
    /// Opaque payload handed to `run`.
    pub payload: *mut u8,
    /// Caller-defined priority tag (FIFO execution regardless).
    pub priority: u32,
}

/// Cumulative queue counters, for telemetry and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Work items enqueued since the pool started.
    pub items_added: u64,
    /// Work items executed since the pool started.
    pub items_processed: u64,
}

/// State shared between the pool handle and its worker threads.
struct PoolShared {
    queue: WorkQueue,
    /// Workers currently holding a claim or executing an item. A worker
    /// increments *before* attempting a claim and decrements on a miss,
    /// so "queue empty and `active_workers == 0`" genuinely means no
    /// in-flight work.
    active_workers: AtomicU32,
    shutdown: AtomicBool,
    /// Manual-reset event for the long-wait tier of idle workers.
    work_available: Event,
    /// Manual-reset event signaled when the pool drains completely.
    work_complete: Event,
    /// Spinlock guarding [`ThreadPool::reset`]; never on the hot path.
    reset_lock: AtomicBool,
}

impl PoolShared {
    /// Claim and execute one item on the current thread.
    ///
    /// Returns `false` when no item could be claimed.
    fn try_execute(&self, worker: WorkerId, scratch: &mut ScratchArena) -> bool {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
        let Some(task) = self.queue.pop() else {
            self.active_workers.fetch_sub(1, Ordering::AcqRel);
            return false;
        };
        {
            let mut ctx = TaskContext::new(worker, scratch.frame());
            // SAFETY: payload validity is the submitter's contract; the
            // safe batch APIs keep payload storage alive until the queue
            // is drained.
            unsafe { (task.run)(task.payload, &mut ctx) };
        }
        if self.active_workers.fetch_sub(1, Ordering::AcqRel) == 1 && self.queue.is_empty() {
            self.work_complete.set();
        }
        true
    }

    /// Three-tier adaptive wait for an idle worker.
    fn adaptive_wait(&self, misses: &mut u32) {
        const SPIN_MISSES: u32 = 1_000;

        *misses += 1;
        if *misses < SPIN_MISSES {
            // Tier 1: stay hot for work that arrives within microseconds.
            for _ in 0..10 {
                std::hint::spin_loop();
            }
        } else if *misses < SPIN_MISSES * 10 {
            // Tier 2: release the core but stay runnable.
            thread::yield_now();
        } else {
            // Tier 3: sleep on the event, bounded so the shutdown flag
            // is observed promptly.
            if self.queue.is_empty() && self.active_workers.load(Ordering::Acquire) == 0 {
                self.work_available.reset();
            }
            if self.work_available.wait_timeout(Duration::from_millis(1)) {
                *misses = 0;
            }
        }
    }
}

fn worker_main(shared: Arc<PoolShared>, worker: WorkerId, mut scratch: ScratchArena) {
    let mut misses = 0u32;
    while !shared.shutdown.load(Ordering::Acquire) {
        if shared.try_execute(worker, &mut scratch) {
            misses = 0;
        } else {
            shared.adaptive_wait(&mut misses);
        }
    }
}

/// Fixed set of worker threads over a shared lock-free work queue.
///
/// Created once at simulation startup, reset once per frame, shut down at
/// exit (or on drop). See the crate docs for the execution model.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    handles: Vec<thread::JoinHandle<()>>,
    /// Arena used when the waiting caller executes items itself.
    main_scratch: ScratchArena,
    n_workers: u32,
    arena_bytes: usize,
}

impl ThreadPool {
    /// Spawn `n_workers` workers and allocate the ring buffer.
    ///
    /// The ring capacity is the next power of two of `2 * queue_capacity`,
    /// so a frame that submits exactly `queue_capacity` items always has
    /// headroom. Each worker owns a scratch arena of `arena_bytes`, as
    /// does the participating caller.
    pub fn start(
        n_workers: usize,
        queue_capacity: usize,
        arena_bytes: usize,
    ) -> Result<Self, PoolError> {
        if n_workers == 0 {
            return Err(PoolError::ZeroWorkers);
        }
        if queue_capacity == 0 {
            return Err(PoolError::ZeroQueueCapacity);
        }

        let shared = Arc::new(PoolShared {
            queue: WorkQueue::with_capacity(queue_capacity),
            active_workers: AtomicU32::new(0),
            shutdown: AtomicBool::new(false),
            work_available: Event::new(false),
            // No work pending at startup.
            work_complete: Event::new(true),
            reset_lock: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(n_workers);
        for i in 0..n_workers as u32 {
            let scratch = ScratchArena::with_capacity(arena_bytes)?;
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("murmuration-worker-{i}"))
                .spawn(move || worker_main(worker_shared, WorkerId(i), scratch));
            match handle {
                Ok(h) => handles.push(h),
                Err(source) => {
                    // Abort the partial pool; already-spawned workers
                    // exit via the shutdown flag.
                    shared.shutdown.store(true, Ordering::Release);
                    shared.work_available.set();
                    return Err(PoolError::ThreadSpawn { worker: i, source });
                }
            }
        }

        Ok(Self {
            shared,
            handles,
            main_scratch: ScratchArena::with_capacity(arena_bytes)?,
            n_workers: n_workers as u32,
            arena_bytes,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.n_workers as usize
    }

    /// Requested scratch capacity of each per-thread arena, in bytes.
    /// Callers use this to validate their worst-case task allocation
    /// before submitting.
    pub fn arena_capacity(&self) -> usize {
        self.arena_bytes
    }

    /// Ring buffer capacity after power-of-two rounding.
    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Cumulative queue counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            items_added: self.shared.queue.items_added(),
            items_processed: self.shared.queue.items_processed(),
        }
    }

    /// Enqueue a raw work item and wake the pool.
    ///
    /// # Safety
    ///
    /// `task.payload` must remain valid until the item has executed —
    /// in practice, until a subsequent
    /// [`wait_for_completion`](Self::wait_for_completion) with no
    /// timeout has returned. Prefer [`run_batch`](Self::run_batch) /
    /// [`run_batch_mut`](Self::run_batch_mut), which enforce this.
    ///
    /// # Panics
    ///
    /// Panics on queue overflow (fatal mis-sizing).
    pub unsafe fn submit(&self, task: RawTask) {
        self.shared.queue.push(task);
        self.shared.work_complete.reset();
        self.shared.work_available.set();
    }

    /// Wait until the queue is empty and all workers are idle,
    /// executing queued items on the calling thread while waiting.
    ///
    /// Returns `true` when the pool drained, `false` when `timeout`
    /// expired with work still outstanding. The frame driver always
    /// passes `None` and so always drains.
    pub fn wait_for_completion(&mut self, timeout: Option<Duration>) -> bool {
        let shared = Arc::clone(&self.shared);
        if shared.queue.is_empty() && shared.active_workers.load(Ordering::Acquire) == 0 {
            return true;
        }

        let start = Instant::now();
        loop {
            if shared.try_execute(WorkerId::MAIN, &mut self.main_scratch) {
                continue;
            }
            if shared.queue.is_empty() && shared.active_workers.load(Ordering::Acquire) == 0 {
                return true;
            }

            let elapsed = start.elapsed();
            if elapsed < Duration::from_millis(10) {
                std::hint::spin_loop();
            } else if elapsed < Duration::from_millis(50) {
                thread::yield_now();
            } else {
                // The completion event is a hint; the loop re-checks the
                // authoritative queue-empty-and-idle condition above.
                let _ = shared.work_complete.wait_timeout(Duration::from_millis(1));
                if let Some(limit) = timeout {
                    if elapsed > limit {
                        return false;
                    }
                }
            }
        }
    }

    /// Run one work item per element of `jobs`, blocking until all have
    /// executed. Items may run on any worker or on the calling thread.
    pub fn run_batch<T: Sync>(&mut self, jobs: &[T], run: fn(&T, &mut TaskContext<'_>)) {
        struct SharedJob<T> {
            job: *const T,
            run: fn(&T, &mut TaskContext<'_>),
        }

        unsafe fn trampoline<T>(payload: *mut u8, ctx: &mut TaskContext<'_>) {
            let slot = &*payload.cast::<SharedJob<T>>();
            (slot.run)(&*slot.job, ctx);
        }

        if jobs.is_empty() {
            return;
        }
        let slots: SmallVec<[SharedJob<T>; 32]> = jobs
            .iter()
            .map(|job| SharedJob { job, run })
            .collect();
        for slot in &slots {
            // SAFETY: `slots` (and the `jobs` borrow inside it) outlives
            // the unconditional drain below.
            unsafe {
                self.submit(RawTask {
                    run: trampoline::<T>,
                    payload: slot as *const SharedJob<T> as *mut u8,
                    priority: 0,
                });
            }
        }
        self.wait_for_completion(None);
    }

    /// Like [`run_batch`](Self::run_batch) but each work item receives
    /// exclusive access to its element.
    pub fn run_batch_mut<T: Send>(&mut self, jobs: &mut [T], run: fn(&mut T, &mut TaskContext<'_>)) {
        struct ExclusiveJob<T> {
            job: *mut T,
            run: fn(&mut T, &mut TaskContext<'_>),
        }

        unsafe fn trampoline<T>(payload: *mut u8, ctx: &mut TaskContext<'_>) {
            let slot = &*payload.cast::<ExclusiveJob<T>>();
            (slot.run)(&mut *slot.job, ctx);
        }

        if jobs.is_empty() {
            return;
        }
        let slots: SmallVec<[ExclusiveJob<T>; 32]> = jobs
            .iter_mut()
            .map(|job| ExclusiveJob { job, run })
            .collect();
        for slot in &slots {
            // SAFETY: each element is referenced by exactly one slot, the
            // queue hands each slot to exactly one thread, and the drain
            // below bounds every borrow.
            unsafe {
                self.submit(RawTask {
                    run: trampoline::<T>,
                    payload: slot as *const ExclusiveJob<T> as *mut u8,
                    priority: 0,
                });
            }
        }
        self.wait_for_completion(None);
    }

    /// Return the pool to the no-work-pending state for the next frame.
    ///
    /// Must only be called after a full [`wait_for_completion`]
    /// (the frame driver's sequencing guarantees this); concurrent
    /// submitters are excluded by `&mut self`.
    ///
    /// `active_workers` is deliberately not zeroed here: idle workers
    /// increment and decrement it around every claim probe, so it is
    /// balanced by construction and already zero whenever the drained
    /// precondition holds — a blind store could corrupt an in-flight
    /// probe's pairing.
    ///
    /// [`wait_for_completion`]: Self::wait_for_completion
    pub fn reset(&mut self) {
        while self.shared.reset_lock.swap(true, Ordering::Acquire) {
            std::hint::spin_loop();
        }
        self.shared.queue.reset();
        self.shared.reset_lock.store(false, Ordering::Release);

        self.shared.work_complete.set();
        self.shared.work_available.reset();
    }

    /// Stop the workers: set the shutdown flag, wake sleepers, and join
    /// each thread with a bounded timeout (a wedged worker is detached
    /// rather than hanging the caller).
    pub fn shutdown(&mut self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.work_available.set();

        let deadline = Instant::now() + Duration::from_secs(1);
        for handle in self.handles.drain(..) {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.n_workers)
            .field("queue_capacity", &self.shared.queue.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}
