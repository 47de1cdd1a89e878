// Receive path: drain completed descriptors into the stack

use crate::config::{ETHERNET_CRC_LEN, MAX_PACKET_SIZE, RX_BUFFER_SIZE, RX_EVENT_TIMEOUT_MS};
use crate::drivers::{DmaAddr, EmacHal, RxBuffer, XgmacEngine};
use crate::interface::NetworkInterface;
use crate::stack::{FrameDisposition, IpStack, NetworkBuffer, RxFrame, RxFrames};
use core::{mem, ptr};
use log::{error, warn};

/// Outcome of handling one completed descriptor
enum RxOutcome {
    /// Frame accepted; the descriptor gets `refill`
    Forward { frame: RxFrame, refill: DmaAddr },
    /// Frame dropped; the descriptor keeps its buffer
    Drop { refill: DmaAddr },
}

impl<H, S> NetworkInterface<H, S>
where
    H: EmacHal + 'static,
    S: IpStack + 'static,
{
    /// Drain every completed receive descriptor
    ///
    /// Every drained descriptor is re-armed before the next one is read,
    /// whether its frame was forwarded or dropped. Frames are delivered to
    /// the stack one per event, or batched into one event when linked
    /// messages are enabled. A refused refill stops the drain and its buffer
    /// goes back to the pool or the stack. Returns the number of frames the
    /// stack accepted.
    pub fn process_received_frames(&self) -> usize {
        let engine = match self.engine() {
            Some(engine) => engine,
            None => return 0,
        };

        let mut batch = RxFrames::new();
        let mut delivered = 0;

        while let Some(rx) = engine.dma_receive() {
            let buf = match rx.buf {
                Some(buf) => buf,
                None => {
                    warn!("xgmac: completed Rx descriptor without a buffer");
                    break;
                }
            };

            let refill = match self.receive_one(&rx, buf) {
                RxOutcome::Forward { frame, refill } => {
                    if self.config.linked_rx_messages {
                        if let Err(frame) = batch.push(frame) {
                            delivered += self.pass_to_stack(mem::take(&mut batch));
                            // Just emptied
                            let _ = batch.push(frame);
                        }
                    } else {
                        let mut single = RxFrames::new();
                        let _ = single.push(frame);
                        delivered += self.pass_to_stack(single);
                    }
                    refill
                }
                RxOutcome::Drop { refill } => refill,
            };

            if let Err(status) = engine.refill_rx_descriptor(refill) {
                error!("xgmac: Rx descriptor refill failed: {}", status);
                self.recycle_rx_buffer(refill);
                break;
            }
        }

        delivered + self.pass_to_stack(batch)
    }

    fn receive_one(&self, rx: &RxBuffer, buf: DmaAddr) -> RxOutcome {
        if rx.has_error() {
            warn!("xgmac: dropping errored frame, status {:#x}", rx.packet_status);
            return RxOutcome::Drop { refill: buf };
        }

        let length = rx.size.min(RX_BUFFER_SIZE);
        // The engine wrote `length` bytes at `buf`
        let bytes = unsafe { buf.as_slice(length) };

        if self.config.filter_frame_types
            && self.stack.consider_frame(bytes) == FrameDisposition::Release
        {
            return RxOutcome::Drop { refill: buf };
        }

        let replacement = match self.stack.get_network_buffer(MAX_PACKET_SIZE, 0) {
            Some(buffer) => buffer,
            None => {
                warn!("xgmac: no network buffer, dropping frame");
                return RxOutcome::Drop { refill: buf };
            }
        };
        let fresh = match replacement.payload() {
            Some(fresh) => fresh,
            None => {
                self.stack.release_network_buffer(&replacement);
                return RxOutcome::Drop { refill: buf };
            }
        };

        let (received, refill) = if self.config.zero_copy_rx {
            match self.stack.packet_buffer_to_network_buffer(buf) {
                Some(owner) => (owner, fresh),
                None => {
                    error!("xgmac: no network buffer owns {:#x}", buf.addr());
                    self.stack.release_network_buffer(&replacement);
                    return RxOutcome::Drop { refill: buf };
                }
            }
        } else {
            let copied = length.min(replacement.capacity());
            // Pool slot and network buffer are distinct allocations
            unsafe { ptr::copy_nonoverlapping(buf.as_ptr(), fresh.as_ptr(), copied) };
            (replacement, buf)
        };

        let frame_len = length.min(received.capacity());
        let received: NetworkBuffer =
            received.with_data_length(frame_len.saturating_sub(ETHERNET_CRC_LEN));
        let endpoint = self.stack.matching_endpoint(self.id, bytes);

        RxOutcome::Forward {
            frame: RxFrame {
                buffer: received,
                interface: self.id,
                endpoint,
            },
            refill,
        }
    }

    /// Hand a buffer the ring refused back to whoever owns it
    fn recycle_rx_buffer(&self, addr: DmaAddr) {
        if self.config.zero_copy_rx {
            match self.stack.packet_buffer_to_network_buffer(addr) {
                Some(buffer) => self.stack.release_network_buffer(&buffer),
                None => error!("xgmac: no network buffer owns {:#x}", addr.addr()),
            }
        } else if let Err(e) = self.rx_pool.release(addr, &*self.clock) {
            error!("xgmac: cannot return {:#x} to the Rx pool: {}", addr.addr(), e);
        }
    }

    /// Queue frames for the IP task; releases them if the queue is full
    fn pass_to_stack(&self, frames: RxFrames) -> usize {
        if frames.is_empty() {
            return 0;
        }

        let count = frames.len();
        match self.stack.send_rx_event(frames, RX_EVENT_TIMEOUT_MS) {
            Ok(()) => count,
            Err(frames) => {
                warn!("xgmac: IP task queue full, dropping {} frames", frames.len());
                for frame in frames.iter() {
                    self.stack.release_network_buffer(&frame.buffer);
                }
                0
            }
        }
    }
}
