//! Fixed-capacity DMA buffer pools
//!
//! Used when zero-copy is disabled: frames are copied between stack buffers
//! and pool slots so the DMA never touches memory the stack owns. A pool is a
//! ring of slot addresses over one contiguous backing region. `acquire`
//! takes from the head, `release` returns to the tail, and every mutation
//! happens under the pool's own lock with a bounded wait.

use crate::config::{DMA_ALIGNMENT, POOL_LOCK_TIMEOUT_MS};
use crate::drivers::DmaAddr;
use crate::error::NetError;
use core::alloc::Layout;
use log::warn;
use shared::timer::Clock;
use spin::{Mutex, MutexGuard, Once};

/// Backing region of a pool
#[derive(Debug)]
struct Backing {
    base: DmaAddr,
    layout: Layout,
}

impl Backing {
    fn allocate(size: usize) -> Result<Self, NetError> {
        if size == 0 {
            return Err(NetError::PoolAllocationFailed);
        }

        let layout = Layout::from_size_align(size, DMA_ALIGNMENT)
            .map_err(|_| NetError::PoolAllocationFailed)?;

        // Zeroed so no slot ever exposes stale memory
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        let base = DmaAddr::new(ptr).ok_or(NetError::PoolAllocationFailed)?;

        Ok(Backing { base, layout })
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        unsafe { alloc::alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

/// Ring state guarded by the pool lock
#[derive(Debug)]
struct Ring<const N: usize> {
    slots: [Option<DmaAddr>; N],
    /// Next slot to hand out
    head: usize,
    /// Next free position for a released slot
    tail: usize,
    used: usize,
}

/// Pool of `N` DMA buffers of `slot_size` bytes each
#[derive(Debug)]
pub struct BufferPool<const N: usize> {
    name: &'static str,
    slot_size: usize,
    backing: Once<Backing>,
    ring: Mutex<Ring<N>>,
}

impl<const N: usize> BufferPool<N> {
    /// Describe a pool; no memory is allocated until [`BufferPool::create`]
    pub const fn new(name: &'static str, slot_size: usize) -> Self {
        Self {
            name,
            slot_size,
            backing: Once::new(),
            ring: Mutex::new(Ring {
                slots: [None; N],
                head: 0,
                tail: 0,
                used: 0,
            }),
        }
    }

    /// Allocate the backing region and fill the ring
    ///
    /// Does nothing if the pool already exists.
    pub fn create(&self) -> Result<(), NetError> {
        self.backing.try_call_once(|| {
            let backing = Backing::allocate(N * self.slot_size)?;

            let mut ring = self.ring.lock();
            for (i, slot) in ring.slots.iter_mut().enumerate() {
                // In bounds: i < N and the region is N * slot_size bytes
                *slot = Some(unsafe { backing.base.add(i * self.slot_size) });
            }
            ring.head = 0;
            ring.tail = 0;
            ring.used = 0;

            Ok(backing)
        })?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.backing.is_completed()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Buffers currently handed out
    pub fn used_count(&self) -> usize {
        self.ring.lock().used
    }

    /// Whether `addr` is the start of one of this pool's slots
    pub fn contains(&self, addr: DmaAddr) -> bool {
        let Some(backing) = self.backing.get() else {
            return false;
        };
        let base = backing.base.addr();
        let addr = addr.addr();
        addr >= base && addr < base + N * self.slot_size && (addr - base) % self.slot_size == 0
    }

    /// Take a buffer of at least `wanted_size` bytes
    pub fn acquire(&self, wanted_size: usize, clock: &dyn Clock) -> Result<DmaAddr, NetError> {
        if wanted_size > self.slot_size {
            warn!(
                "xgmac: {} buffer size {} more than the pool buffer size {}",
                self.name, wanted_size, self.slot_size
            );
            return Err(NetError::BufferTooLarge {
                wanted: wanted_size,
                max: self.slot_size,
            });
        }

        if !self.is_initialized() {
            return Err(NetError::PoolNotInitialized);
        }

        let mut ring = self.lock_ring(clock)?;

        if ring.used == N {
            warn!("xgmac: {} buffer pool fully used", self.name);
            return Err(NetError::PoolExhausted);
        }

        let index = ring.head;
        let addr = ring.slots[index]
            .take()
            .ok_or(NetError::PoolNotInitialized)?;
        ring.head = (index + 1) % N;
        ring.used += 1;

        Ok(addr)
    }

    /// Return a buffer previously taken with [`BufferPool::acquire`]
    ///
    /// The buffer is zero-filled before it becomes available again.
    pub fn release(&self, addr: DmaAddr, clock: &dyn Clock) -> Result<(), NetError> {
        let mut ring = self.lock_ring(clock)?;

        if ring.used == 0 {
            warn!("xgmac: {} buffer pool is already empty", self.name);
            return Err(NetError::PoolEmpty);
        }

        if !self.contains(addr) {
            warn!(
                "xgmac: {:#x} is not a {} pool buffer",
                addr.addr(),
                self.name
            );
            return Err(NetError::NotPoolMember);
        }

        // The slot belongs to this pool and its owner has given it back
        unsafe { core::ptr::write_bytes(addr.as_ptr(), 0, self.slot_size) };

        let index = ring.tail;
        ring.slots[index] = Some(addr);
        ring.tail = (index + 1) % N;
        ring.used -= 1;

        Ok(())
    }

    fn lock_ring(&self, clock: &dyn Clock) -> Result<MutexGuard<'_, Ring<N>>, NetError> {
        let start = clock.now_ms();
        loop {
            if let Some(guard) = self.ring.try_lock() {
                return Ok(guard);
            }
            if clock.elapsed_since(start) > POOL_LOCK_TIMEOUT_MS {
                warn!("xgmac: {} pool lock timeout", self.name);
                return Err(NetError::PoolLockTimeout);
            }
            clock.sleep_ms(1);
        }
    }
}
