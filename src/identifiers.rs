//! Type-safe identifiers for dispatch entities.
//!
//! Newtype wrappers prevent mixing incompatible ids at compile time.
//!
//! # Sync Id Addressing
//!
//! Replies from the engine arrive on one shared socket for all slots. To
//! route them without a central correlation table, every query carries a
//! composite [`SyncId`] packing the originating slot into the high 8 bits:
//!
//! ```text
//! bit 31        24 23                             0
//!     ┌───────────┬───────────────────────────────┐
//!     │  slot id  │     per-slot counter          │
//!     └───────────┴───────────────────────────────┘
//! ```
//!
//! The 8-bit slot field caps the worker pool at 255 slots. The 24-bit
//! counter is strictly increasing per slot for the connection's lifetime;
//! wraparound is not handled (16M queries per slot is assumed sufficient).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Number of low bits holding the per-slot counter.
const COUNTER_BITS: u32 = 24;

/// Mask for the counter field.
const COUNTER_MASK: u32 = (1 << COUNTER_BITS) - 1;

/// Maximum valid slot index (pool size is capped at 255 slots, 0..=254).
pub const MAX_SLOT_INDEX: u8 = 254;

// ============================================================================
// SlotId
// ============================================================================

/// Identifier of one worker slot in the pool.
///
/// Slot indices run `0..N-1` for a pool of size N (1–255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u8);

impl SlotId {
    /// Creates a slot id from a raw index.
    ///
    /// Returns `None` if the index exceeds [`MAX_SLOT_INDEX`].
    #[inline]
    #[must_use]
    pub fn new(index: u8) -> Option<Self> {
        (index <= MAX_SLOT_INDEX).then_some(Self(index))
    }

    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SyncId
// ============================================================================

/// Composite correlation token for matching a query to its reply.
///
/// Packs the originating [`SlotId`] into the high 8 bits so the dispatcher
/// can route a reply without consulting any shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncId(u32);

impl SyncId {
    /// Packs a slot id and counter into a composite sync id.
    ///
    /// The counter is truncated to 24 bits.
    #[inline]
    #[must_use]
    pub fn pack(slot: SlotId, counter: u32) -> Self {
        Self((u32::from(slot.index()) << COUNTER_BITS) | (counter & COUNTER_MASK))
    }

    /// Recovers the originating slot id from a composite sync id.
    #[inline]
    #[must_use]
    pub fn slot(self) -> Option<SlotId> {
        SlotId::new((self.0 >> COUNTER_BITS) as u8)
    }

    /// Returns the counter portion of the sync id.
    #[inline]
    #[must_use]
    pub fn counter(self) -> u32 {
        self.0 & COUNTER_MASK
    }

    /// Returns the raw 32-bit value as carried on the wire.
    #[inline]
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Reconstructs a sync id from its raw wire value.
    #[inline]
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0 >> COUNTER_BITS, self.counter())
    }
}

// ============================================================================
// SyncIdAllocator
// ============================================================================

/// Per-slot sync id source.
///
/// Each worker owns its own allocator, so there is no shared counter and
/// no cross-slot contention. Ids are strictly increasing per slot.
#[derive(Debug)]
pub struct SyncIdAllocator {
    /// The slot all ids from this allocator are tagged with.
    slot: SlotId,
    /// Next counter value.
    counter: u32,
}

impl SyncIdAllocator {
    /// Creates an allocator for the given slot. Counters start at 1.
    #[inline]
    #[must_use]
    pub fn new(slot: SlotId) -> Self {
        Self { slot, counter: 1 }
    }

    /// Produces the next sync id for this slot.
    #[inline]
    pub fn next(&mut self) -> SyncId {
        let id = SyncId::pack(self.slot, self.counter);
        self.counter += 1;
        id
    }

    /// Returns the slot this allocator is bound to.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

// ============================================================================
// DocHandle
// ============================================================================

/// Opaque remote-side identifier of an opened document.
///
/// Returned by the engine in the open-succeeded notification; never
/// interpreted locally, only echoed back in start and close instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocHandle(String);

impl DocHandle {
    /// Wraps a raw handle string from the engine.
    #[inline]
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw handle string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
