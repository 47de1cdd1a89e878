// Transmit path: stack output and completion reclamation

use crate::config::{MAX_PACKET_SIZE, TX_BUFFER_SIZE};
use crate::drivers::{EmacHal, TxBuffer, XgmacEngine};
use crate::error::NetError;
use crate::interface::NetworkInterface;
use crate::stack::{IpStack, NetworkBuffer};
use core::ptr;
use log::{debug, error, warn};

impl<H, S> NetworkInterface<H, S>
where
    H: EmacHal + 'static,
    S: IpStack + 'static,
{
    /// Hand a frame to the engine
    ///
    /// With the link down the frame is dropped. In copy mode the frame is
    /// copied into a transmit pool slot and the descriptor stays with the
    /// caller; in zero-copy mode the payload itself is queued and ownership
    /// passes to the DMA until the completion is reclaimed. The descriptor is
    /// released here when `release_after_send` is set and ownership did not
    /// pass, or when the engine refused the frame.
    ///
    /// Only a missing engine or a null payload is reported as an error.
    ///
    /// # Panics
    /// In copy mode, when no transmit pool slot can be acquired.
    pub fn output(&self, buffer: &NetworkBuffer, release_after_send: bool) -> Result<(), NetError> {
        let engine = match self.engine() {
            Some(engine) => engine,
            None => {
                error!("xgmac: output on interface {} before init", self.emac.instance);
                return Err(NetError::EngineNotInitialized);
            }
        };
        let payload = buffer.payload().ok_or_else(|| {
            error!("xgmac: output with a null payload");
            NetError::NullPayload
        })?;

        let mut release = release_after_send;

        if self.link.is_up() {
            let length = buffer
                .data_length
                .min(MAX_PACKET_SIZE)
                .min(buffer.capacity());

            let (frame, pool_slot) = if self.config.zero_copy_tx {
                release = false;
                (payload, None)
            } else {
                let slot = match self.tx_pool.acquire(TX_BUFFER_SIZE, &*self.clock) {
                    Ok(slot) => slot,
                    Err(e) => panic!("xgmac: no Tx buffer available: {}", e),
                };
                // Both regions hold at least `length` bytes and never overlap
                unsafe { ptr::copy_nonoverlapping(payload.as_ptr(), slot.as_ptr(), length) };
                (slot, Some(slot))
            };

            let tx = TxBuffer {
                buf: frame,
                size: length,
                release_buf: true,
            };
            if let Err(status) = engine.dma_transmit(tx) {
                warn!("xgmac: DMA transmit failed: {}", status);
                release = true;
                if let Some(slot) = pool_slot {
                    if let Err(e) = self.tx_pool.release(slot, &*self.clock) {
                        warn!("xgmac: can not return Tx pool buffer: {}", e);
                    }
                }
            }
        } else {
            debug!("xgmac: link down, dropping {} byte frame", buffer.data_length);
        }

        if release {
            self.stack.release_network_buffer(buffer);
        }
        Ok(())
    }

    /// Reclaim buffers of completed transmissions
    ///
    /// Consumes one completion count per buffer. Returns the number of
    /// buffers reclaimed.
    pub fn reclaim_transmitted(&self) -> usize {
        let engine = match self.engine() {
            Some(engine) => engine,
            None => return 0,
        };

        let mut reclaimed = 0;
        while self.notifier.tx_completions().take() {
            let addr = match engine.dma_tx_done() {
                Ok(Some(addr)) => addr,
                Ok(None) => continue,
                Err(status) => {
                    warn!("xgmac: Tx completion failed: {}", status);
                    break;
                }
            };

            if self.config.zero_copy_tx {
                match self.stack.packet_buffer_to_network_buffer(addr) {
                    Some(buffer) => self.stack.release_network_buffer(&buffer),
                    None => {
                        warn!("xgmac: no network buffer owns {:#x}", addr.addr());
                        continue;
                    }
                }
            } else if let Err(e) = self.tx_pool.release(addr, &*self.clock) {
                warn!("xgmac: can not release Tx pool buffer: {}", e);
                continue;
            }
            reclaimed += 1;
        }
        reclaimed
    }
}
