//! Reservation/commit allocator over the shared ring.
//!
//! ```text
//! Producer ──▶ reserve(n) ──▶ write bytes ──▶ release()
//!              [critical]      (unlocked)     [critical]
//! ```
//!
//! Producers claim contiguous disjoint ranges in reservation order but may
//! finish writing in any order. The published head therefore moves with
//! last-writer-out semantics: the release that drops the active-writer
//! count to zero stores `head = allocation_head`, never a partial value, so
//! a reader can never observe bytes that are still being written.
//!
//! Every counter mutation happens inside `critical_section::with`; the
//! byte writes between reserve and release deliberately do not.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::region::ExternalMemoryLayout;

/// Overflow latch: `Normal ⇄ Overflowing`.
///
/// Latched on the first refused reservation and sticky until the unread
/// span shrinks to half capacity. The hysteresis keeps one freed byte from
/// re-admitting a message that immediately re-fills the ring, so the
/// consumer gets one coherent run of output instead of many tiny gaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowState {
    Normal,
    Overflowing,
}

impl OverflowState {
    #[inline]
    pub fn is_overflowing(self) -> bool {
        matches!(self, OverflowState::Overflowing)
    }

    #[inline]
    pub fn latch(&mut self) {
        *self = OverflowState::Overflowing;
    }

    /// Recover once the unread span has drained to half of `capacity`.
    /// Returns true on the Overflowing → Normal transition.
    #[inline]
    pub fn try_recover(&mut self, unread_span: u32, capacity: u32) -> bool {
        if self.is_overflowing() && unread_span <= capacity / 2 {
            *self = OverflowState::Normal;
            return true;
        }
        false
    }
}

/// Allocator counters. Shared between task and interrupt context, so only
/// ever touched inside a critical section.
pub(crate) struct AllocatorState {
    /// Next unclaimed offset. Always >= the published head; the gap is
    /// space claimed by in-flight writers.
    pub(crate) allocation_head: u32,
    /// Writers that have reserved but not yet released.
    pub(crate) active_writers: u32,
    pub(crate) overflow: OverflowState,
    /// Identity of the open debug-channel line, if any.
    pub(crate) current_channel: Option<&'static str>,
}

impl AllocatorState {
    const fn new() -> Self {
        Self {
            allocation_head: 0,
            active_writers: 0,
            overflow: OverflowState::Normal,
            current_channel: None,
        }
    }
}

/// Byte-range allocator for one shared ring region.
pub struct RingAllocator<'r, const N: usize> {
    region: &'r ExternalMemoryLayout<N>,
    state: Mutex<RefCell<AllocatorState>>,
}

impl<'r, const N: usize> RingAllocator<'r, N> {
    pub const fn new(region: &'r ExternalMemoryLayout<N>) -> Self {
        Self {
            region,
            state: Mutex::new(RefCell::new(AllocatorState::new())),
        }
    }

    /// Run `f` on the allocator state inside a critical section.
    ///
    /// The closure must stay short and bounded; it runs with interrupts
    /// masked.
    #[inline]
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut AllocatorState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Claim `size` bytes without touching the writer count.
    ///
    /// Caller is already inside a critical section. Refusal either latches
    /// the overflow state (request cannot fit) or is the latch itself still
    /// holding reservations off.
    pub(crate) fn try_claim(state: &mut AllocatorState, tail: u32, size: u32) -> Option<u32> {
        let used = state.allocation_head.wrapping_sub(tail);
        let available = N as u32 - used;
        if size > available {
            state.overflow.latch();
            return None;
        }
        if state.overflow.is_overflowing() {
            return None;
        }
        let offset = state.allocation_head;
        state.allocation_head = offset.wrapping_add(size);
        Some(offset)
    }

    /// Reserve `size` bytes for a message writer.
    ///
    /// On success returns the claimed offset, counts the caller as an
    /// active writer, and invalidates any open debug-channel line (the
    /// channel's trailing terminator is no longer the last claimed byte).
    /// On refusal the message is the caller's to drop.
    pub fn reserve(&self, size: u32) -> Option<u32> {
        self.with_state(|state| {
            let tail = self.region.tail();
            let offset = Self::try_claim(state, tail, size)?;
            state.active_writers += 1;
            state.current_channel = None;
            Some(offset)
        })
    }

    /// Finish a reservation. The last writer out publishes the head.
    ///
    /// # Panics
    ///
    /// Panics when no reservation is outstanding; that is a caller bug, not
    /// an operational condition.
    pub fn release(&self) {
        let balanced = self.with_state(|state| {
            if state.active_writers == 0 {
                return false;
            }
            state.active_writers -= 1;
            if state.active_writers == 0 {
                self.region.publish(state.allocation_head);
            }
            true
        });
        assert!(balanced, "release without reservation");
    }

    /// Reseed from the region cursors at init time.
    pub(crate) fn seed(&self) {
        let head = self.region.head();
        self.with_state(|state| {
            state.allocation_head = head;
            state.active_writers = 0;
            state.overflow = OverflowState::Normal;
            state.current_channel = None;
        });
    }

    /// True while the overflow latch is refusing reservations.
    pub fn is_overflowed(&self) -> bool {
        self.with_state(|state| state.overflow.is_overflowing())
    }
}
