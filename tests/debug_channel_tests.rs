//! Debug-channel coalescing tests

use rust_log_ring::{ExternalMemoryLayout, LogBuffer, SimPlatform};

fn contents<const N: usize>(region: &ExternalMemoryLayout<N>, start: u32, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| region.byte_at(start.wrapping_add(i as u32)))
        .collect()
}

#[test]
fn test_same_channel_extends_one_line() {
    let region = ExternalMemoryLayout::<64>::new();
    let platform = SimPlatform::new();
    let buffer = LogBuffer::new(&region, &platform);
    buffer.init();

    buffer.debug_char("tone", b'a');
    buffer.debug_char("tone", b'b');

    assert_eq!(contents(&region, 0, 10), b"D tone ab\n");
    // Still open: nothing published until the line closes.
    assert_eq!(region.head(), 0);
}

#[test]
fn test_terminator_closes_and_publishes() {
    let region = ExternalMemoryLayout::<64>::new();
    let platform = SimPlatform::new();
    let buffer = LogBuffer::new(&region, &platform);
    buffer.init();

    buffer.debug_char("tone", b'a');
    buffer.debug_char("tone", b'\n');

    assert_eq!(region.head(), 9);
    assert_eq!(contents(&region, 0, 9), b"D tone a\n");

    // Closing again is a no-op: no further bytes, no head movement.
    buffer.debug_char("tone", b'\n');
    assert_eq!(region.head(), 9);
}

#[test]
fn test_carriage_return_also_closes() {
    let region = ExternalMemoryLayout::<64>::new();
    let platform = SimPlatform::new();
    let buffer = LogBuffer::new(&region, &platform);
    buffer.init();

    buffer.debug_char("tone", b'a');
    buffer.debug_char("tone", b'\r');

    assert_eq!(region.head(), 9);
    // The stored terminator stays a line feed.
    assert_eq!(region.byte_at(8), b'\n');
}

#[test]
fn test_channel_switch_starts_new_header_line() {
    let region = ExternalMemoryLayout::<64>::new();
    let platform = SimPlatform::new();
    let buffer = LogBuffer::new(&region, &platform);
    buffer.init();

    buffer.debug_char("alpha", b'a');
    buffer.debug_char("beta", b'c');

    // Opening beta published alpha's line first.
    assert_eq!(region.head(), 10);
    assert_eq!(contents(&region, 0, 19), b"D alpha a\nD beta c\n");

    buffer.debug_char("beta", b'\n');
    assert_eq!(region.head(), 19);
}

#[test]
fn test_non_printable_stored_as_question_mark() {
    let region = ExternalMemoryLayout::<64>::new();
    let platform = SimPlatform::new();
    let buffer = LogBuffer::new(&region, &platform);
    buffer.init();

    buffer.debug_char("tone", 0x07);
    buffer.debug_char("tone", 0x7F);

    assert_eq!(contents(&region, 0, 10), b"D tone ??\n");
}

#[test]
fn test_channel_refusal_latches_and_resets_marker() {
    let region = ExternalMemoryLayout::<64>::new();
    let platform = SimPlatform::new();
    let buffer = LogBuffer::new(&region, &platform);
    buffer.init();

    // Header is 9 bytes; 55 more characters fill the ring exactly.
    buffer.debug_char("tone", b'a');
    for _ in 0..55 {
        buffer.debug_char("tone", b'x');
    }
    assert!(!buffer.is_overflowed());

    // One more cannot fit: latch, drop, forget the open line.
    buffer.debug_char("tone", b'y');
    assert!(buffer.is_overflowed());

    buffer.debug_char("tone", b'\n');
    assert_eq!(region.head(), 64);
    assert_eq!(region.byte_at(63), b'\n');

    // While latched a fresh header is refused as well.
    buffer.debug_char("other", b'z');
    assert_eq!(region.head(), 64);
}

#[test]
fn test_debug_char_before_init_goes_to_debug_port() {
    let region = ExternalMemoryLayout::<64>::new();
    let platform = SimPlatform::new();
    let buffer = LogBuffer::new(&region, &platform);

    buffer.debug_char("tone", b'a');

    assert_eq!(&platform.take_debug_output()[..], b"a");
    assert_eq!(region.head(), 0);
}
