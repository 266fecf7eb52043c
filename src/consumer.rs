//! Consumers of the shared ring.
//!
//! Two independent readers exist:
//! - [`BlockConsumer`]: the upload task's view — fetches line-aligned
//!   blocks, copies them out, and owns tail advancement.
//! - [`DebugConsoleDrain`]: a timer-ISR byte pump to the debug console with
//!   its own cursor, which trails the ring without ever advancing the tail.

use crate::buffer::LogBuffer;
use crate::platform::Platform;
use crate::region::ExternalMemoryLayout;

/// Line-aligned block reader for the upload task.
///
/// # Example
///
/// ```ignore
/// let consumer = BlockConsumer::new(&LOG);
/// let end = consumer.fetch(chunk.len() as u32);
/// let len = consumer.read_into(end, &mut chunk);
/// upload(&chunk[..len])?;
/// consumer.commit(end); // only after the bytes are durable
/// ```
pub struct BlockConsumer<'b, 'r, P: Platform, const N: usize> {
    buffer: &'b LogBuffer<'r, P, N>,
}

impl<'b, 'r, P: Platform, const N: usize> BlockConsumer<'b, 'r, P, N> {
    pub fn new(buffer: &'b LogBuffer<'r, P, N>) -> Self {
        Self { buffer }
    }

    /// Unread bytes currently in the ring.
    #[inline]
    pub fn pending(&self) -> u32 {
        let region = self.buffer.region();
        region.head().wrapping_sub(region.tail())
    }

    /// End offset of the next block, at most `max_size` bytes past the
    /// tail and never splitting a line. See [`LogBuffer::fetch_block`].
    #[inline]
    pub fn fetch(&self, max_size: u32) -> u32 {
        self.buffer.fetch_block(max_size)
    }

    /// Copy the fetched block `[tail, end)` into `dst`; returns the length.
    pub fn read_into(&self, end: u32, dst: &mut [u8]) -> usize {
        let region = self.buffer.region();
        region.copy_range(region.tail(), end, dst)
    }

    /// Mark everything up to `end` as durably consumed, freeing ring
    /// capacity for producers.
    #[inline]
    pub fn commit(&self, end: u32) {
        self.buffer.region().set_tail(end);
    }
}

/// Character pump from the ring to the physical debug console.
///
/// Driven from a periodic timer interrupt. Keeps a private cursor seeded
/// from the tail; when the upload task overtakes it the cursor resyncs to
/// the tail and the skipped bytes are simply never echoed.
pub struct DebugConsoleDrain<'r, const N: usize> {
    region: &'r ExternalMemoryLayout<N>,
    cursor: u32,
}

impl<'r, const N: usize> DebugConsoleDrain<'r, N> {
    pub fn new(region: &'r ExternalMemoryLayout<N>) -> Self {
        Self {
            region,
            cursor: region.tail(),
        }
    }

    /// Send at most one character. Call from the timer ISR.
    pub fn tick<P: Platform>(&mut self, platform: &P) {
        // Make sure the cursor is still a valid reference.
        let tail = self.region.tail();
        if self.cursor.wrapping_sub(tail) > N as u32 {
            self.cursor = tail;
        }
        if self.region.head().wrapping_sub(self.cursor) > 0 {
            let c = self.region.byte_at(self.cursor);
            if platform.try_debug_put_from_isr(c) {
                self.cursor = self.cursor.wrapping_add(1);
            }
        }
    }

    /// Offset of the next character to echo.
    #[inline]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::LOG_MAGIC;
    use crate::sim::SimPlatform;

    const BASE: u32 = 0x12345678;

    fn seeded_region(unread: u32) -> ExternalMemoryLayout<64> {
        let region = ExternalMemoryLayout::<64>::new();
        region.set_magic(LOG_MAGIC);
        region.set_tail(BASE);
        region.set_head(BASE.wrapping_add(unread));
        region
    }

    #[test]
    fn test_drain_sends_nothing_when_empty() {
        let region = seeded_region(0);
        let platform = SimPlatform::new();
        let mut drain = DebugConsoleDrain::new(&region);

        platform.do_interrupt(|| drain.tick(&platform));

        assert!(platform.take_debug_output().is_empty());
    }

    #[test]
    fn test_drain_sends_one_byte_per_tick() {
        let region = seeded_region(1);
        region.write_byte(BASE, b'a');
        let platform = SimPlatform::new();
        let mut drain = DebugConsoleDrain::new(&region);

        platform.do_interrupt(|| drain.tick(&platform));
        platform.do_interrupt(|| drain.tick(&platform));

        assert_eq!(&platform.take_debug_output()[..], b"a");
    }

    #[test]
    fn test_drain_resyncs_after_consumer_overtakes() {
        let region = seeded_region(2);
        region.write_byte(BASE, b'a');
        region.write_byte(BASE + 1, b'b');
        let platform = SimPlatform::new();
        let mut drain = DebugConsoleDrain::new(&region);

        // Consumer advances past the drain cursor before the first tick.
        region.set_tail(BASE + 1);
        platform.do_interrupt(|| drain.tick(&platform));
        platform.do_interrupt(|| drain.tick(&platform));

        assert_eq!(&platform.take_debug_output()[..], b"b");
    }

    #[test]
    fn test_drain_retries_while_port_busy() {
        let region = seeded_region(1);
        region.write_byte(BASE, b'a');
        let platform = SimPlatform::new();
        let mut drain = DebugConsoleDrain::new(&region);

        platform.set_debug_port_ready(false);
        platform.do_interrupt(|| drain.tick(&platform));
        assert_eq!(drain.cursor(), BASE);

        platform.set_debug_port_ready(true);
        platform.do_interrupt(|| drain.tick(&platform));
        assert_eq!(drain.cursor(), BASE + 1);
        assert_eq!(&platform.take_debug_output()[..], b"a");
    }

    #[test]
    fn test_block_consumer_roundtrip() {
        let region = ExternalMemoryLayout::<64>::new();
        let buffer = LogBuffer::new(&region, SimPlatform::new());
        buffer.init();

        buffer.write_raw_message(format_args!("first"));
        buffer.write_raw_message(format_args!("second"));

        let consumer = BlockConsumer::new(&buffer);
        assert_eq!(consumer.pending(), 13);

        let end = consumer.fetch(64);
        assert_eq!(end, 13);

        let mut out = [0u8; 64];
        let len = consumer.read_into(end, &mut out);
        assert_eq!(&out[..len], b"first\nsecond\n");

        consumer.commit(end);
        assert_eq!(consumer.pending(), 0);
    }
}
