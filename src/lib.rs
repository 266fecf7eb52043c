//! # RustLogRing
//!
//! Warm-reset-safe shared log ring for embedded firmware.
//!
//! ## Architecture
//!
//! ```text
//! task writers ──┐                        ┌──▶ DebugConsoleDrain ──▶ UART
//!                ├──▶ LogBuffer ──▶ ring ─┤    (timer ISR)
//! ISR writers  ──┘    reserve/commit      └──▶ BlockConsumer ──▶ upload
//! ```
//!
//! All producers share one circular byte buffer in externally allocated
//! memory that survives warm resets. Reservations are granted in call
//! order inside a critical section; writes happen unlocked in each
//! producer's disjoint range; the head is published when the last
//! outstanding writer releases. A full ring drops messages silently and
//! announces itself with an "Overflow" notice once the consumer catches up.
//!
//! See ARCHITECTURE.md for the shared-region contract.

#![cfg_attr(not(test), no_std)]

pub mod buffer;
pub mod consumer;
pub mod platform;
pub mod region;
pub mod ring;
pub mod sim;
pub mod sink;

pub use buffer::LogBuffer;
pub use consumer::{BlockConsumer, DebugConsoleDrain};
pub use platform::Platform;
#[cfg(feature = "esp32")]
pub use platform::EspPlatform;
pub use region::{ExternalMemoryLayout, FaultRecord, LOG_BUFFER_SIZE};
pub use ring::{OverflowState, RingAllocator};
pub use sim::SimPlatform;
