// Deferred interrupt task
//
// Runs at the highest priority once the link first comes up. Each pass waits
// for the interrupt notification, services receive, transmit-complete and
// error events in that order, then re-checks the PHY link if the poll timer
// has expired.

extern crate alloc;

use crate::config::TASK_BLOCK_TIME_MS;
use crate::drivers::{handle_error_event, EmacHal, EventBits};
use crate::interface::NetworkInterface;
use crate::link::LinkPollTimer;
use crate::stack::IpStack;
use alloc::sync::Arc;

impl<H, S> NetworkInterface<H, S>
where
    H: EmacHal + 'static,
    S: IpStack + 'static,
{
    /// Task body; never returns
    pub fn handler_task(self: Arc<Self>) -> ! {
        let mut timer = self.link_poll_timer();
        loop {
            self.service_events(&mut timer);
        }
    }

    /// Poll timer for a freshly started task
    pub fn link_poll_timer(&self) -> LinkPollTimer {
        LinkPollTimer::new(self.clock.now_ms(), self.config.link_low_check_ms)
    }

    /// One pass of the task loop
    ///
    /// Returns the events that were serviced.
    ///
    /// # Panics
    /// On an error event carrying an unknown DMA error code.
    pub fn service_events(&self, timer: &mut LinkPollTimer) -> EventBits {
        let events = self.notifier.wait(TASK_BLOCK_TIME_MS);

        if events.rx() {
            self.process_received_frames();
        }
        if events.tx() {
            self.reclaim_transmitted();
        }
        if events.err() {
            handle_error_event(events.err_type(), events.err_channel());
        }

        let now = self.clock.now_ms();
        if timer.expired(now) {
            if let Some(engine) = self.engine() {
                let phy = *self.phy.lock();
                self.link.recheck(&*engine, &phy);
            }
            timer.reset(now, self.link.check_interval_ms(&self.config));
        }

        events
    }
}
