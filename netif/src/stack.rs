// TCP/IP stack side of the driver boundary
// Network buffer descriptors, the stack operations the driver consumes, and
// the RAM-to-descriptor binding used for zero-copy buffer lookup

extern crate alloc;

use crate::config::{BUFFER_PADDING, DMA_ALIGNMENT, RX_BATCH_CAPACITY};
use crate::drivers::DmaAddr;
use crate::error::NetError;
use core::alloc::Layout;
use smoltcp::wire::{EthernetAddress, EthernetFrame, EthernetProtocol};
use spin::Mutex;

/// Interface a frame arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceId(pub u8);

/// Stack endpoint (IP configuration) a frame was matched to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointId(pub u16);

/// Reference to a stack network buffer descriptor
///
/// Copying the reference does not copy ownership: exactly one party (the
/// stack, the driver or the DMA) owns the descriptor at any time, and only
/// the owner may release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkBuffer {
    index: u16,
    payload: Option<DmaAddr>,
    capacity: usize,
    /// Bytes of valid frame data in the payload
    pub data_length: usize,
}

impl NetworkBuffer {
    pub const fn new(index: u16, payload: Option<DmaAddr>, capacity: usize) -> Self {
        Self {
            index,
            payload,
            capacity,
            data_length: 0,
        }
    }

    /// Descriptor index in the stack's table
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Start of the Ethernet frame
    pub fn payload(&self) -> Option<DmaAddr> {
        self.payload
    }

    /// Usable payload bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn with_data_length(mut self, len: usize) -> Self {
        self.data_length = len;
        self
    }
}

/// A received frame handed to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFrame {
    pub buffer: NetworkBuffer,
    pub interface: InterfaceId,
    pub endpoint: Option<EndpointId>,
}

/// Frames delivered in one stack event
pub type RxFrames = heapless::Vec<RxFrame, RX_BATCH_CAPACITY>;

/// What the stack wants done with a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Process,
    Release,
}

/// Stack operations used by the driver
pub trait IpStack: Send + Sync {
    /// Allocate a buffer descriptor, waiting at most `block_ms`
    fn get_network_buffer(&self, wanted_size: usize, block_ms: u32) -> Option<NetworkBuffer>;

    /// Return a descriptor to the stack's allocator
    fn release_network_buffer(&self, buffer: &NetworkBuffer);

    /// Queue received frames for the IP task
    ///
    /// On failure the frames are handed back so the driver can release them.
    fn send_rx_event(&self, frames: RxFrames, timeout_ms: u32) -> Result<(), RxFrames>;

    /// Endpoint that should handle `frame` on `interface`
    fn matching_endpoint(&self, interface: InterfaceId, frame: &[u8]) -> Option<EndpointId>;

    /// Descriptor owning the DMA buffer at `addr`
    fn packet_buffer_to_network_buffer(&self, addr: DmaAddr) -> Option<NetworkBuffer>;

    /// MAC address of the interface
    fn mac_address(&self) -> EthernetAddress;

    /// Frame-type filter
    fn consider_frame(&self, frame: &[u8]) -> FrameDisposition {
        consider_frame_for_processing(frame, self.mac_address())
    }
}

/// Default frame-type filter
///
/// Accepts ARP, IPv4 and IPv6 frames addressed to `mac`, to broadcast or to
/// a multicast group. Everything else is released.
pub fn consider_frame_for_processing(frame: &[u8], mac: EthernetAddress) -> FrameDisposition {
    let frame = match EthernetFrame::new_checked(frame) {
        Ok(frame) => frame,
        Err(_) => return FrameDisposition::Release,
    };

    let dst = frame.dst_addr();
    if dst != mac && !dst.is_broadcast() && !dst.is_multicast() {
        return FrameDisposition::Release;
    }

    match frame.ethertype() {
        EthernetProtocol::Arp | EthernetProtocol::Ipv4 | EthernetProtocol::Ipv6 => {
            FrameDisposition::Process
        }
        _ => FrameDisposition::Release,
    }
}

/// Where an arena's RAM came from
#[derive(Debug)]
enum Backing {
    /// Allocated by [`NetworkBufferArena::bind`], freed on drop
    Heap(Layout),
    /// Caller's region, never freed
    Static,
}

#[derive(Debug)]
struct ArenaState<const N: usize> {
    free: heapless::Vec<u16, N>,
    in_use: [bool; N],
}

/// Network buffer RAM bound to descriptors
///
/// One region of `N` slots backs the stack's `N` descriptors. A descriptor's
/// payload starts [`BUFFER_PADDING`] bytes into its slot, and any address
/// inside a slot resolves back to the owning descriptor, which is how
/// zero-copy mode turns a DMA buffer into a stack buffer.
#[derive(Debug)]
pub struct NetworkBufferArena<const N: usize> {
    base: DmaAddr,
    backing: Backing,
    slot_size: usize,
    state: Mutex<ArenaState<N>>,
}

impl<const N: usize> NetworkBufferArena<N> {
    /// Allocate the buffer RAM and bind every slot to a descriptor
    pub fn bind(slot_size: usize) -> Result<Self, NetError> {
        Self::check_geometry(slot_size)?;

        let layout = Layout::from_size_align(N * slot_size, DMA_ALIGNMENT)
            .map_err(|_| NetError::PoolAllocationFailed)?;
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        let base = DmaAddr::new(ptr).ok_or(NetError::PoolAllocationFailed)?;

        Ok(Self::with_backing(base, Backing::Heap(layout), slot_size))
    }

    /// Bind every slot of a region reserved at boot to a descriptor
    ///
    /// `region` must start on a [`DMA_ALIGNMENT`] boundary and hold `N`
    /// slots of `slot_size` bytes. The slots are zeroed; bytes past the last
    /// slot are left alone.
    pub fn bind_static(region: &'static mut [u8], slot_size: usize) -> Result<Self, NetError> {
        Self::check_geometry(slot_size)?;

        let needed = N
            .checked_mul(slot_size)
            .ok_or(NetError::PoolAllocationFailed)?;
        if region.len() < needed || region.as_ptr() as usize % DMA_ALIGNMENT != 0 {
            return Err(NetError::PoolAllocationFailed);
        }
        region[..needed].fill(0);
        let base = DmaAddr::new(region.as_mut_ptr()).ok_or(NetError::PoolAllocationFailed)?;

        Ok(Self::with_backing(base, Backing::Static, slot_size))
    }

    fn check_geometry(slot_size: usize) -> Result<(), NetError> {
        if slot_size <= BUFFER_PADDING || N == 0 || N > u16::MAX as usize {
            return Err(NetError::PoolAllocationFailed);
        }
        Ok(())
    }

    fn with_backing(base: DmaAddr, backing: Backing, slot_size: usize) -> Self {
        let mut free = heapless::Vec::new();
        for index in (0..N as u16).rev() {
            // Capacity is N, cannot overflow
            let _ = free.push(index);
        }

        Self {
            base,
            backing,
            slot_size,
            state: Mutex::new(ArenaState {
                free,
                in_use: [false; N],
            }),
        }
    }

    /// Descriptor `index` with an empty payload
    pub fn descriptor(&self, index: u16) -> Option<NetworkBuffer> {
        if index as usize >= N {
            return None;
        }
        // In bounds of the region for every index < N
        let payload = unsafe { self.base.add(index as usize * self.slot_size + BUFFER_PADDING) };
        Some(NetworkBuffer::new(
            index,
            Some(payload),
            self.slot_size - BUFFER_PADDING,
        ))
    }

    /// Descriptor whose slot contains `addr`
    pub fn lookup(&self, addr: DmaAddr) -> Option<NetworkBuffer> {
        let base = self.base.addr();
        let addr = addr.addr();
        if addr < base || addr >= base + N * self.slot_size {
            return None;
        }
        self.descriptor(((addr - base) / self.slot_size) as u16)
    }

    /// Allocate a free descriptor able to hold `wanted_size` bytes
    pub fn take(&self, wanted_size: usize) -> Option<NetworkBuffer> {
        if wanted_size > self.slot_size - BUFFER_PADDING {
            return None;
        }
        let mut state = self.state.lock();
        let index = state.free.pop()?;
        state.in_use[index as usize] = true;
        drop(state);
        self.descriptor(index)
    }

    /// Return a descriptor taken with [`NetworkBufferArena::take`]
    ///
    /// Returns `false` for a descriptor that is not in use.
    pub fn give(&self, buffer: &NetworkBuffer) -> bool {
        let index = buffer.index() as usize;
        if index >= N {
            return false;
        }
        let mut state = self.state.lock();
        if !state.in_use[index] {
            return false;
        }
        state.in_use[index] = false;
        state.free.push(buffer.index()).is_ok()
    }

    /// Free descriptors
    pub fn available(&self) -> usize {
        self.state.lock().free.len()
    }

    pub fn is_in_use(&self, index: u16) -> bool {
        (index as usize) < N && self.state.lock().in_use[index as usize]
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<const N: usize> Drop for NetworkBufferArena<N> {
    fn drop(&mut self) {
        if let Backing::Heap(layout) = self.backing {
            unsafe { alloc::alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }
}
