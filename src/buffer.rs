//! The log buffer: message writers, debug-channel writer, consumer fetch.
//!
//! ```text
//! task writer ──┐                       ┌──▶ debug-console drain (ISR)
//!               ├──▶ reserve ▶ write ▶ release ──▶ ring region
//! ISR writer  ──┘   [critical]          [critical] └──▶ upload task (fetch)
//! ```
//!
//! # Rules
//!
//! - Logging never blocks or fails its caller: a full ring silently drops
//!   the message and latches the overflow state.
//! - Task-context writers hold the platform task lock across the
//!   measure/reserve/write/release sequence; ISR writers skip it. Both rely
//!   on the short critical section inside the allocator for the counters.
//! - Before `init()` completes, messages bypass the ring and render straight
//!   to the debug port.

use core::fmt;
use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::Platform;
use crate::region::{ExternalMemoryLayout, LOG_BUFFER_SIZE};
use crate::ring::RingAllocator;
use crate::sink::{CountingSink, DebugPortSink, RingSink};

/// Printable ASCII range stored by the debug-channel writer.
const PRINTABLE: core::ops::RangeInclusive<u8> = 0x20..=0x7E;

/// Zone token used for this module's own log lines.
const ZONE: &str = "LOG_BUFFER";

/// Shared-ring log core over one external memory region.
///
/// One statically allocated instance per firmware image is the normal
/// arrangement, but nothing here assumes singleton access; every operation
/// goes through this explicit context.
pub struct LogBuffer<'r, P: Platform, const N: usize = LOG_BUFFER_SIZE> {
    region: &'r ExternalMemoryLayout<N>,
    platform: P,
    ring: RingAllocator<'r, N>,
    initialized: AtomicBool,
}

impl<'r, P: Platform, const N: usize> LogBuffer<'r, P, N> {
    pub const fn new(region: &'r ExternalMemoryLayout<N>, platform: P) -> Self {
        Self {
            region,
            platform,
            ring: RingAllocator::new(region),
            initialized: AtomicBool::new(false),
        }
    }

    /// Validate or heal the persisted region, seed the allocator from the
    /// published head, and report a pending fault record exactly once.
    ///
    /// The fault report runs before the initialized flag flips, so it goes
    /// out on the debug port rather than into the ring being validated.
    ///
    /// # Panics
    ///
    /// Panics when already initialized.
    pub fn init(&self) {
        assert!(!self.is_init(), "log buffer already initialized");

        self.region.validate_or_reset();
        self.ring.seed();

        if let Some(fault) = self.region.take_fault_record() {
            self.write_log_message(
                "FATAL",
                ZONE,
                format_args!(
                    "Forced Restart: '{}' COMM: {}",
                    fault.cause, fault.communication_thread_state
                ),
            );
        }

        self.initialized.store(true, Ordering::Release);
    }

    /// # Panics
    ///
    /// Panics when not initialized.
    pub fn deinit(&self) {
        assert!(self.is_init(), "log buffer not initialized");
        self.initialized.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_init(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// The shared region this buffer writes into.
    #[inline]
    pub fn region(&self) -> &'r ExternalMemoryLayout<N> {
        self.region
    }

    /// True while the overflow latch is refusing reservations.
    #[inline]
    pub fn is_overflowed(&self) -> bool {
        self.ring.is_overflowed()
    }

    /// Append a full log line: `"L <ticks> <level> <zone> <body>\n"`.
    ///
    /// Callable from task and interrupt context alike. Dropped whole when
    /// the ring cannot take it.
    pub fn write_log_message(&self, level: &str, zone: &str, args: fmt::Arguments<'_>) {
        if !self.is_init() {
            // Messages cannot be stored yet; send them to the debug port.
            let mut sink = DebugPortSink::new(&self.platform);
            let _ = write!(sink, "L 0 {} {} ", level, zone);
            let _ = sink.write_fmt(args);
            self.platform.debug_put(b'\n');
            return;
        }

        // ISR callers skip the task lock; interrupts are already serialized
        // against each other and against task context.
        if self.platform.is_interrupt() {
            self.store_log_line(self.platform.tick_count_from_isr(), level, zone, args);
        } else {
            self.platform.with_task_lock(|| {
                self.store_log_line(self.platform.tick_count(), level, zone, args)
            });
        }
    }

    fn store_log_line(&self, ticks: u32, level: &str, zone: &str, args: fmt::Arguments<'_>) {
        let mut measure = CountingSink::new();
        let _ = write!(measure, "L {} {} {} ", ticks, level, zone);
        let _ = measure.write_fmt(args);
        let total = measure.count() as u32 + 1;

        self.store_message(total, |sink| {
            let _ = write!(sink, "L {} {} {} ", ticks, level, zone);
            let _ = sink.write_fmt(args);
        });
    }

    /// Append a raw line: `"<body>\n"`. Same discipline as
    /// [`write_log_message`], minus the header.
    ///
    /// [`write_log_message`]: LogBuffer::write_log_message
    pub fn write_raw_message(&self, args: fmt::Arguments<'_>) {
        if !self.is_init() {
            let mut sink = DebugPortSink::new(&self.platform);
            let _ = sink.write_fmt(args);
            self.platform.debug_put(b'\n');
            return;
        }

        if self.platform.is_interrupt() {
            self.store_raw_line(args);
        } else {
            self.platform.with_task_lock(|| self.store_raw_line(args));
        }
    }

    fn store_raw_line(&self, args: fmt::Arguments<'_>) {
        let mut measure = CountingSink::new();
        let _ = measure.write_fmt(args);
        let total = measure.count() as u32 + 1;

        self.store_message(total, |sink| {
            let _ = sink.write_fmt(args);
        });
    }

    /// Reserve, render, terminate, release. Reservation refusal drops the
    /// message with no partial write.
    fn store_message(&self, total: u32, render: impl FnOnce(&mut RingSink<'r, N>)) {
        if let Some(offset) = self.ring.reserve(total) {
            let mut sink = RingSink::new(self.region, offset);
            render(&mut sink);
            sink.put(b'\n');
            self.ring.release();
        }
    }

    /// Append one character to the rolling line of `channel`.
    ///
    /// Characters on the same channel coalesce into one
    /// `"D <channel> <chars...>\n"` line by overwriting the line's trailing
    /// terminator; a `'\n'`/`'\r'` closes the line and a different channel
    /// starts a new one. Non-printable characters are stored as `'?'`.
    ///
    /// Channel bytes do not count as an active writer: a grown line is
    /// published when it closes, when the channel switches, or alongside an
    /// unrelated writer's release — always terminator-delimited either way.
    pub fn debug_char(&self, channel: &'static str, c: u8) {
        if !self.is_init() {
            self.platform.debug_put(c);
            return;
        }

        self.ring.with_state(|state| {
            if c == b'\n' || c == b'\r' {
                // Close the line; make it visible now unless a message
                // writer is mid-reservation (its release will publish).
                if state.active_writers == 0 {
                    self.region.publish(state.allocation_head);
                }
                state.current_channel = None;
                return;
            }

            let c = if PRINTABLE.contains(&c) { c } else { b'?' };
            let tail = self.region.tail();

            if state.current_channel != Some(channel) {
                // Publish the previous line before opening a new one, so it
                // cannot be silently extended later.
                if state.active_writers == 0 {
                    self.region.publish(state.allocation_head);
                }

                let size = channel.len() as u32 + 5;
                match RingAllocator::<N>::try_claim(state, tail, size) {
                    Some(offset) => {
                        let mut sink = RingSink::new(self.region, offset);
                        let _ = write!(sink, "D {} ", channel);
                        sink.put(c);
                        sink.put(b'\n');
                        state.current_channel = Some(channel);
                    }
                    None => state.current_channel = None,
                }
            } else {
                // Grow the open line: the byte before the allocation head is
                // our own terminator (nothing may reserve in between without
                // clearing the channel marker), overwrite it and re-terminate.
                match RingAllocator::<N>::try_claim(state, tail, 1) {
                    Some(_) => {
                        self.region.write_byte(state.allocation_head.wrapping_sub(2), c);
                        self.region.write_byte(state.allocation_head.wrapping_sub(1), b'\n');
                    }
                    None => state.current_channel = None,
                }
            }
        });
    }

    /// Largest line-aligned prefix of unread data, capped at `max_size`.
    ///
    /// Returns the end offset of the block `[tail, end)`; advancing the
    /// tail stays the caller's job. When the unread span has drained to half
    /// capacity this also clears the overflow latch and injects an
    /// `"Overflow"` notice marking the dropped lines.
    ///
    /// The returned offset never splits a line; only when the candidate
    /// span contains no terminator at all is the unaligned target returned.
    pub fn fetch_block(&self, max_size: u32) -> u32 {
        let announce = self.ring.with_state(|state| {
            let span = self.region.head().wrapping_sub(self.region.tail());
            state.overflow.try_recover(span, N as u32)
        });
        if announce {
            self.write_raw_message(format_args!("Overflow"));
        }

        let tail = self.region.tail();
        let span = self.region.head().wrapping_sub(tail);
        let target = tail.wrapping_add(span.min(max_size));

        let mut end = target;
        while end != tail {
            if self.region.byte_at(end.wrapping_sub(1)) == b'\n' {
                return end;
            }
            end = end.wrapping_sub(1);
        }
        target
    }
}

/// Append a formatted log line with level and zone tokens.
///
/// # Example
///
/// ```ignore
/// log_message!(LOG, "INFO", "COMM", "link up after {} ms", elapsed);
/// ```
#[macro_export]
macro_rules! log_message {
    ($buffer:expr, $level:expr, $zone:expr, $($arg:tt)*) => {
        $buffer.write_log_message($level, $zone, format_args!($($arg)*))
    };
}

/// Append a formatted raw line (no header).
#[macro_export]
macro_rules! raw_message {
    ($buffer:expr, $($arg:tt)*) => {
        $buffer.write_raw_message(format_args!($($arg)*))
    };
}
