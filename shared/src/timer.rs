// Timer support for the driver layer
// Tick counter driven by the scheduler's tick interrupt, and the clock
// abstraction the network driver polls against

use core::sync::atomic::{AtomicU64, Ordering};

/// Global tick counter
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Tick frequency in Hz
static TICK_FREQUENCY: AtomicU64 = AtomicU64::new(1000); // Default to 1kHz

/// Source of elapsed time and delays
///
/// The driver never reads hardware timers directly; everything that has a
/// bounded wait (pool locks, link polling, the deferred task's timeout)
/// goes through this trait so the same code runs on the scheduler tick or on
/// a simulated clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary epoch (boot)
    fn now_ms(&self) -> u64;

    /// Delay the calling task for `ms` milliseconds
    fn sleep_ms(&self, ms: u64);

    /// Milliseconds elapsed since `start_ms`
    fn elapsed_since(&self, start_ms: u64) -> u64 {
        self.now_ms().wrapping_sub(start_ms)
    }
}

/// Set the tick frequency
///
/// # Safety
///
/// Must be called once during boot, before the first tick interrupt.
pub unsafe fn init_ticks(frequency_hz: u64) {
    TICK_FREQUENCY.store(frequency_hz.max(1), Ordering::Relaxed);
    TICKS.store(0, Ordering::Relaxed);
}

/// Get the current tick count
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Increment the tick counter
///
/// This is called by the tick interrupt handler.
pub fn increment_ticks() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Get the tick frequency in Hz
pub fn get_frequency() -> u64 {
    TICK_FREQUENCY.load(Ordering::Relaxed)
}

/// Convert milliseconds to ticks, rounding up so a non-zero delay never
/// becomes zero ticks
pub fn ms_to_ticks(ms: u64) -> u64 {
    let freq = get_frequency();
    (ms * freq + 999) / 1000
}

/// Convert ticks to milliseconds
pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks * 1000 / get_frequency()
}

/// Clock backed by the global tick counter
///
/// `sleep_ms` spins on the tick counter and never yields, so it is only fit
/// for boot code running before the scheduler starts. Once tasks run, hand
/// the driver a `Clock` whose `sleep_ms` is the scheduler's delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickClock;

impl Clock for TickClock {
    fn now_ms(&self) -> u64 {
        ticks_to_ms(get_ticks())
    }

    fn sleep_ms(&self, ms: u64) {
        let target = get_ticks() + ms_to_ticks(ms);
        while get_ticks() < target {
            core::hint::spin_loop();
        }
    }
}
