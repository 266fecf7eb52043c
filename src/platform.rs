//! RTOS and debug-port services consumed by the log ring.
//!
//! Two execution contexts call into this crate: preemptible tasks and
//! non-preemptible interrupt handlers. The [`Platform`] trait is how the
//! core asks which one it is running in, reads the tick clock with the
//! context-appropriate accessor, pushes raw characters to the debug port,
//! and serializes task-context writers against each other.
//!
//! The short interrupt-masking section that guards the allocator counters is
//! deliberately NOT part of this trait: it is the composable
//! `critical_section::with` primitive, usable from both contexts and
//! provided by esp-idf-sys on target (`critical-section/std` on the host).
//! The task lock here only serializes the longer measure/format sequence
//! among tasks; it offers no protection against ISR callers.

/// Host-RTOS services, injected into [`LogBuffer`].
///
/// [`LogBuffer`]: crate::buffer::LogBuffer
pub trait Platform {
    /// True when the caller is running in interrupt context.
    fn is_interrupt(&self) -> bool;

    /// Monotonic tick count. Task context only.
    fn tick_count(&self) -> u32;

    /// Monotonic tick count, safe to read from an ISR.
    fn tick_count_from_isr(&self) -> u32;

    /// Emit one character on the raw debug port, blocking as needed.
    fn debug_put(&self, byte: u8);

    /// Offer one character to the debug port from interrupt context.
    /// Returns false when the port is busy; the caller retries later.
    fn try_debug_put_from_isr(&self, byte: u8) -> bool;

    /// Run `f` holding the process-wide writer lock. Task context only;
    /// interrupt-context callers skip the lock entirely.
    fn with_task_lock<R>(&self, f: impl FnOnce() -> R) -> R;
}

impl<P: Platform> Platform for &P {
    #[inline]
    fn is_interrupt(&self) -> bool {
        (**self).is_interrupt()
    }

    #[inline]
    fn tick_count(&self) -> u32 {
        (**self).tick_count()
    }

    #[inline]
    fn tick_count_from_isr(&self) -> u32 {
        (**self).tick_count_from_isr()
    }

    #[inline]
    fn debug_put(&self, byte: u8) {
        (**self).debug_put(byte)
    }

    #[inline]
    fn try_debug_put_from_isr(&self, byte: u8) -> bool {
        (**self).try_debug_put_from_isr(byte)
    }

    #[inline]
    fn with_task_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        (**self).with_task_lock(f)
    }
}

#[cfg(feature = "esp32")]
pub use esp::EspPlatform;

#[cfg(feature = "esp32")]
mod esp {
    use super::Platform;
    use esp_idf_svc::sys;

    /// FreeRTOS-backed platform for the ESP32 targets.
    pub struct EspPlatform {
        mutex: sys::SemaphoreHandle_t,
    }

    // SAFETY: The handle is only passed to FreeRTOS calls, which perform
    // their own cross-core synchronization.
    unsafe impl Send for EspPlatform {}
    unsafe impl Sync for EspPlatform {}

    impl EspPlatform {
        pub fn new() -> Self {
            // xSemaphoreCreateMutex is a C macro; this is its expansion.
            let mutex = unsafe { sys::xQueueCreateMutex(sys::queueQUEUE_TYPE_MUTEX as u8) };
            assert!(!mutex.is_null(), "mutex allocation failed");
            Self { mutex }
        }
    }

    impl Default for EspPlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for EspPlatform {
        fn drop(&mut self) {
            unsafe { sys::vQueueDelete(self.mutex) };
        }
    }

    impl Platform for EspPlatform {
        #[inline]
        fn is_interrupt(&self) -> bool {
            unsafe { sys::xPortInIsrContext() != 0 }
        }

        #[inline]
        fn tick_count(&self) -> u32 {
            unsafe { sys::xTaskGetTickCount() }
        }

        #[inline]
        fn tick_count_from_isr(&self) -> u32 {
            unsafe { sys::xTaskGetTickCountFromISR() }
        }

        #[inline]
        fn debug_put(&self, byte: u8) {
            // ROM routine; spins on a full TX FIFO.
            unsafe {
                sys::esp_rom_uart_tx_one_char(byte);
            }
        }

        #[inline]
        fn try_debug_put_from_isr(&self, byte: u8) -> bool {
            unsafe { sys::esp_rom_uart_tx_one_char(byte) == 0 }
        }

        fn with_task_lock<R>(&self, f: impl FnOnce() -> R) -> R {
            unsafe {
                sys::xQueueSemaphoreTake(self.mutex, sys::portMAX_DELAY);
            }
            let result = f();
            unsafe {
                sys::xQueueGenericSend(
                    self.mutex,
                    core::ptr::null(),
                    0,
                    sys::queueSEND_TO_BACK as i32,
                );
            }
            result
        }
    }
}
