//! PHY link monitoring
//!
//! The last PHY status register value read over MDIO is latched here. The
//! initialisation path polls it synchronously with a bounded wait; the
//! deferred task re-reads it whenever its [`LinkPollTimer`] expires, with a
//! long interval while the link is up and a short one while it is down.

use crate::config::{DriverConfig, LINK_POLL_STEP_MS};
use crate::drivers::{PhyConfig, XgmacEngine, BMSR_LINK_STATUS, COPPER_STATUS_REG};
use core::sync::atomic::{AtomicU32, Ordering};
use log::{debug, info, warn};
use shared::timer::Clock;

/// Cached PHY status register
///
/// Written only by MDIO reads from the initialising thread or the deferred
/// task, never both at once: the task is created after link-up.
#[derive(Debug, Default)]
pub struct LinkMonitor {
    latch: AtomicU32,
}

impl LinkMonitor {
    pub const fn new() -> Self {
        Self {
            latch: AtomicU32::new(0),
        }
    }

    /// Latched status register value
    pub fn status(&self) -> u32 {
        self.latch.load(Ordering::Acquire)
    }

    /// Link bit of the latched status
    pub fn is_up(&self) -> bool {
        self.status() & BMSR_LINK_STATUS != 0
    }

    fn read_status<E: XgmacEngine + ?Sized>(engine: &E, phy_address: u8) -> u32 {
        engine.read_phy_reg(phy_address, COPPER_STATUS_REG)
    }

    /// Poll the PHY every [`LINK_POLL_STEP_MS`] until the link comes up or
    /// more than `max_wait_ms` has elapsed
    ///
    /// Every read is latched.
    pub fn check_link<E: XgmacEngine + ?Sized>(
        &self,
        engine: &E,
        phy_address: u8,
        clock: &dyn Clock,
        max_wait_ms: u64,
    ) -> bool {
        let start = clock.now_ms();

        loop {
            if clock.elapsed_since(start) > max_wait_ms {
                debug!("xgmac: link still down after {} ms", max_wait_ms);
                return false;
            }

            let status = Self::read_status(engine, phy_address);
            self.latch.store(status, Ordering::Release);

            if status & BMSR_LINK_STATUS != 0 {
                return true;
            }

            clock.sleep_ms(LINK_POLL_STEP_MS);
        }
    }

    /// Periodic re-check from the deferred task
    ///
    /// If the live link bit differs from the latch, the EMAC speed/duplex is
    /// reprogrammed and the PHY read again; the latch only follows if the
    /// change persists. Returns the new link state when it changed.
    pub fn recheck<E: XgmacEngine + ?Sized>(&self, engine: &E, phy: &PhyConfig) -> Option<bool> {
        let live = Self::read_status(engine, phy.phy_address);
        if (live ^ self.status()) & BMSR_LINK_STATUS == 0 {
            return None;
        }

        if let Err(status) = engine.update_speed_mode(phy) {
            warn!("xgmac: updating EMAC configuration failed: {}", status);
        }

        let live = Self::read_status(engine, phy.phy_address);
        if (live ^ self.status()) & BMSR_LINK_STATUS == 0 {
            return None;
        }

        self.latch.store(live, Ordering::Release);
        let up = live & BMSR_LINK_STATUS != 0;
        info!("xgmac: PHY link status now {}", if up { "up" } else { "down" });
        Some(up)
    }

    /// Next re-check interval for the latched state
    pub fn check_interval_ms(&self, config: &DriverConfig) -> u64 {
        if self.is_up() {
            config.link_high_check_ms
        } else {
            config.link_low_check_ms
        }
    }
}

/// One-shot timeout driving the periodic link re-check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPollTimer {
    start_ms: u64,
    interval_ms: u64,
}

impl LinkPollTimer {
    pub fn new(now_ms: u64, interval_ms: u64) -> Self {
        Self {
            start_ms: now_ms,
            interval_ms,
        }
    }

    /// Whether the interval has elapsed at `now_ms`
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms.wrapping_sub(self.start_ms) >= self.interval_ms
    }

    /// Start a new interval at `now_ms`
    pub fn reset(&mut self, now_ms: u64, interval_ms: u64) {
        self.start_ms = now_ms;
        self.interval_ms = interval_ms;
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}
