// Interrupt-context side of the driver
//
// The engine callback runs in hardware interrupt context. It only ORs event
// bits into the deferred task's notification value and, for transmit
// completions, bumps a lock-free counter. Everything else happens in the task.

extern crate alloc;

use super::{ErrInfo, IntStatus, IrqSink};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use shared::task::TaskNotifier;

/// Receive event
pub const XGMAC_IF_RX_EVENT: u32 = 1;
/// Transmit-complete event
pub const XGMAC_IF_TX_EVENT: u32 = 2;
/// DMA error event
pub const XGMAC_IF_ERR_EVENT: u32 = 4;
pub const XGMAC_IF_ALL_EVENT: u32 = XGMAC_IF_RX_EVENT | XGMAC_IF_TX_EVENT | XGMAC_IF_ERR_EVENT;

const ERR_TYPE_SHIFT: u32 = 24;
const ERR_CHANNEL_SHIFT: u32 = 16;

/// Notification value consumed by the deferred task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventBits(pub u32);

impl EventBits {
    pub const NONE: EventBits = EventBits(0);

    /// Error event carrying the engine's error type and DMA channel
    pub fn error(info: ErrInfo) -> Self {
        EventBits(
            ((info.err_type as u32) << ERR_TYPE_SHIFT)
                | ((info.channel as u32) << ERR_CHANNEL_SHIFT)
                | XGMAC_IF_ERR_EVENT,
        )
    }

    pub fn is_empty(self) -> bool {
        self.0 & XGMAC_IF_ALL_EVENT == 0
    }

    pub fn rx(self) -> bool {
        self.0 & XGMAC_IF_RX_EVENT != 0
    }

    pub fn tx(self) -> bool {
        self.0 & XGMAC_IF_TX_EVENT != 0
    }

    pub fn err(self) -> bool {
        self.0 & XGMAC_IF_ERR_EVENT != 0
    }

    pub fn err_type(self) -> u8 {
        (self.0 >> ERR_TYPE_SHIFT) as u8
    }

    pub fn err_channel(self) -> u8 {
        ((self.0 >> ERR_CHANNEL_SHIFT) & 0xFF) as u8
    }
}

/// Counting semaphore for transmit completions
///
/// Given once per transmit-complete interrupt, taken once per buffer
/// reclaimed by the task. Saturates at the transmit pool capacity.
#[derive(Debug)]
pub struct CompletionCounter {
    count: AtomicUsize,
    max: usize,
}

impl CompletionCounter {
    pub const fn new(max: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            max,
        }
    }

    /// Record one completion; safe from interrupt context
    ///
    /// Returns `false` if the counter was already at its maximum.
    pub fn give(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                if c < self.max {
                    Some(c + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Consume one completion without blocking
    pub fn take(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .is_ok()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// Notification channel from the engine interrupt to the deferred task
pub struct IrqNotifier {
    signal: Arc<dyn TaskNotifier>,
    /// Set once the deferred task exists; interrupts are ignored before
    armed: AtomicBool,
    tx_completions: CompletionCounter,
}

impl IrqNotifier {
    pub fn new(signal: Arc<dyn TaskNotifier>, max_tx_completions: usize) -> Self {
        Self {
            signal,
            armed: AtomicBool::new(false),
            tx_completions: CompletionCounter::new(max_tx_completions),
        }
    }

    /// Start forwarding interrupts to the task
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// OR `bits` into the task's notification value and wake it
    pub fn notify(&self, bits: EventBits) {
        self.signal.notify_from_isr(bits.0);
    }

    /// Current notification value without consuming it
    pub fn pending(&self) -> EventBits {
        EventBits(self.signal.pending())
    }

    /// Block until an event arrives or `timeout_ms` elapses
    ///
    /// The whole notification value is cleared when it is returned.
    pub fn wait(&self, timeout_ms: u64) -> EventBits {
        EventBits(self.signal.wait(timeout_ms))
    }

    pub fn tx_completions(&self) -> &CompletionCounter {
        &self.tx_completions
    }
}

impl IrqSink for IrqNotifier {
    fn on_interrupt(&self, status: IntStatus, info: ErrInfo) {
        if !self.is_armed() {
            return;
        }

        let bits = match status {
            IntStatus::Rx => EventBits(XGMAC_IF_RX_EVENT),
            IntStatus::TxDone => {
                self.tx_completions.give();
                EventBits(XGMAC_IF_TX_EVENT)
            }
            IntStatus::Error => EventBits::error(info),
        };

        self.notify(bits);
    }
}
