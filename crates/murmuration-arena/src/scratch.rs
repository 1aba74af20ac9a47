//! The bump arena and its frame-scoped allocation view.

use crate::error::ArenaError;
use glam::Mat4;

/// Allocation granularity and alignment, in bytes.
///
/// Every block handed out starts on a cache-line boundary and occupies a
/// whole number of lines, so 8-wide f32 SIMD loads never straddle lines
/// and adjacent allocations never false-share.
pub const CACHE_LINE: usize = 64;

/// A fixed-capacity bump allocator for per-frame scratch data.
///
/// The backing storage is allocated once and reused for the lifetime of
/// the arena; opening a [`frame`](ScratchArena::frame) costs nothing but
/// a pointer split. Capacity never grows — an undersized arena is a
/// configuration bug surfaced by `alloc` returning `None`.
pub struct ScratchArena {
    /// Backing bytes, over-allocated by one cache line so the usable
    /// region can start on a 64-byte boundary regardless of where the
    /// allocator placed the buffer.
    storage: Vec<u8>,
    capacity: usize,
}

impl ScratchArena {
    /// Allocate an arena with at least `bytes` of usable scratch space.
    ///
    /// The capacity is rounded up to a whole number of cache lines.
    pub fn with_capacity(bytes: usize) -> Result<Self, ArenaError> {
        if bytes == 0 {
            return Err(ArenaError::ZeroCapacity);
        }
        let capacity = round_up(bytes);
        Ok(Self {
            storage: vec![0u8; capacity + CACHE_LINE - 1],
            capacity,
        })
    }

    /// Usable capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Open a frame over the whole arena.
    ///
    /// The returned [`ArenaFrame`] borrows the arena mutably, so no two
    /// frames can coexist and no allocation can outlive its frame.
    /// Dropping the frame resets the arena to empty.
    pub fn frame(&mut self) -> ArenaFrame<'_> {
        let start = self.storage.as_ptr().align_offset(CACHE_LINE);
        debug_assert!(start < CACHE_LINE, "u8 buffer must be alignable to a cache line");
        let capacity = self.capacity;
        ArenaFrame {
            remaining: &mut self.storage[start..start + capacity],
            used: 0,
        }
    }
}

impl std::fmt::Debug for ScratchArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchArena")
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A frame-scoped bump view over a [`ScratchArena`].
///
/// Allocations are zero-initialised, 64-byte aligned, and live as long as
/// the frame's borrow of the arena (`'a`), not merely as long as the next
/// `alloc` call — several allocations can be held simultaneously.
pub struct ArenaFrame<'a> {
    remaining: &'a mut [u8],
    used: usize,
}

impl std::fmt::Debug for ArenaFrame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaFrame")
            .field("used", &self.used)
            .field("available", &self.remaining.len())
            .finish()
    }
}

impl<'a> ArenaFrame<'a> {
    /// Allocate `n` zeroed bytes, rounded up to cache-line granularity.
    ///
    /// Returns `None` when the arena cannot satisfy the request; callers
    /// treat that as a sizing error, not a recoverable condition.
    pub fn alloc_bytes(&mut self, n: usize) -> Option<&'a mut [u8]> {
        let rounded = round_up(n);
        if rounded > self.remaining.len() {
            return None;
        }
        let taken = std::mem::take(&mut self.remaining);
        let (head, tail) = taken.split_at_mut(rounded);
        self.remaining = tail;
        self.used += rounded;
        // Stale bytes from the previous frame must not leak through.
        head.fill(0);
        Some(&mut head[..n])
    }

    /// Allocate a zeroed slice of `len` elements of any plain-old-data type.
    pub fn alloc<T: bytemuck::Pod>(&mut self, len: usize) -> Option<&'a mut [T]> {
        let bytes = self.alloc_bytes(len.checked_mul(std::mem::size_of::<T>())?)?;
        Some(bytemuck::cast_slice_mut(bytes))
    }

    /// Allocate a zeroed `u32` index buffer.
    pub fn alloc_u32(&mut self, len: usize) -> Option<&'a mut [u32]> {
        self.alloc(len)
    }

    /// Allocate a zeroed `f32` buffer.
    pub fn alloc_f32(&mut self, len: usize) -> Option<&'a mut [f32]> {
        self.alloc(len)
    }

    /// Allocate a buffer of zero matrices.
    pub fn alloc_mat4(&mut self, len: usize) -> Option<&'a mut [Mat4]> {
        self.alloc(len)
    }

    /// Bytes consumed so far, including rounding.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes still available.
    pub fn available(&self) -> usize {
        self.remaining.len()
    }
}

fn round_up(n: usize) -> usize {
    n.div_ceil(CACHE_LINE) * CACHE_LINE
}
