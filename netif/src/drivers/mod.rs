// Transfer engine (XGMAC + DMA) interface consumed by the driver layer

pub mod dma_error;
pub mod interrupts;

use crate::error::EngineStatus;
use alloc::sync::Arc;
use core::ptr::NonNull;

pub use dma_error::{handle_error_event, DmaErrorKind};
pub use interrupts::{
    CompletionCounter, EventBits, IrqNotifier, XGMAC_IF_ALL_EVENT, XGMAC_IF_ERR_EVENT,
    XGMAC_IF_RX_EVENT, XGMAC_IF_TX_EVENT,
};

/// PHY status register (BMSR)
pub const COPPER_STATUS_REG: u8 = 1;

/// Link-status bit of the PHY status register
pub const BMSR_LINK_STATUS: u32 = 0x0004;

/// Receive write-back descriptor: last descriptor of the frame
pub const RDES3_NORM_WR_LD: u32 = 1 << 28;

/// Receive write-back descriptor: error summary
pub const RDES3_NORM_WR_ES: u32 = 1 << 15;

/// Status pattern of a frame received with errors
pub const XGMAC_RX_PACKET_ERROR: u32 = RDES3_NORM_WR_LD | RDES3_NORM_WR_ES;

/// Address of a DMA-capable buffer as seen by the engine
///
/// Memory is identity mapped, so the address is also the CPU pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DmaAddr(NonNull<u8>);

// A DmaAddr is a plain address; the ownership rules for the memory behind it
// are enforced by the pools and the stack, not by the handle.
unsafe impl Send for DmaAddr {}
unsafe impl Sync for DmaAddr {}

impl DmaAddr {
    /// Wrap a raw pointer, `None` if null
    pub fn new(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(DmaAddr)
    }

    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Address `offset` bytes further on
    ///
    /// # Safety
    /// The result must stay inside the allocation `self` points into.
    pub unsafe fn add(self, offset: usize) -> Self {
        DmaAddr(NonNull::new_unchecked(self.0.as_ptr().add(offset)))
    }

    /// View `len` bytes at this address
    ///
    /// # Safety
    /// `len` bytes at this address must be initialized, owned by the caller
    /// for the lifetime `'a`, and not written by the DMA meanwhile.
    pub unsafe fn as_slice<'a>(self, len: usize) -> &'a [u8] {
        core::slice::from_raw_parts(self.0.as_ptr(), len)
    }

    /// Mutable view of `len` bytes at this address
    ///
    /// # Safety
    /// As [`DmaAddr::as_slice`], and no other reference may alias the range.
    pub unsafe fn as_mut_slice<'a>(self, len: usize) -> &'a mut [u8] {
        core::slice::from_raw_parts_mut(self.0.as_ptr(), len)
    }
}

/// PHY interface type between MAC and PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyInterface {
    Rgmii,
    Sgmii,
    Usxgmii,
}

/// Link speed in Mb/s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSpeed {
    Mbps10,
    Mbps100,
    Mbps1000,
    Mbps2500,
    Mbps10000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    Half,
    Full,
}

/// Advertise every speed/duplex combination
pub const ADVERTISE_ALL: u32 = 0x01E0 | 0x0300;

/// PHY record filled by discovery and negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyConfig {
    pub phy_address: u8,
    pub phy_identifier: u32,
    pub phy_interface: PhyInterface,
    pub enable_autonegotiation: bool,
    pub speed: LinkSpeed,
    pub duplex: Duplex,
    pub advertise: u32,
    pub link_status: u32,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            phy_address: 0,
            phy_identifier: 0,
            phy_interface: PhyInterface::Rgmii,
            enable_autonegotiation: true,
            speed: LinkSpeed::Mbps1000,
            duplex: Duplex::Full,
            advertise: ADVERTISE_ALL,
            link_status: 0,
        }
    }
}

/// Per-instance configuration handed to the engine at init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmacConfig {
    pub instance: u8,
    pub phy_type: PhyInterface,
}

/// Interrupt source reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntStatus {
    Rx,
    TxDone,
    Error,
}

/// Error details the engine fills before raising an error interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrInfo {
    pub err_type: u8,
    pub channel: u8,
}

/// Receiver of engine interrupts
///
/// Called in interrupt context: implementations must not block.
pub trait IrqSink: Send + Sync {
    fn on_interrupt(&self, status: IntStatus, info: ErrInfo);
}

/// Frame submitted for transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxBuffer {
    pub buf: DmaAddr,
    pub size: usize,
    /// Ask the engine to hand the buffer back through `dma_tx_done`
    pub release_buf: bool,
}

/// Completed receive descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxBuffer {
    pub buf: Option<DmaAddr>,
    pub size: usize,
    pub packet_status: u32,
}

impl RxBuffer {
    /// Frame was received with errors
    pub fn has_error(&self) -> bool {
        (self.packet_status & (RDES3_NORM_WR_LD | RDES3_NORM_WR_ES)) == XGMAC_RX_PACKET_ERROR
    }
}

/// Opens an EMAC instance
pub trait EmacHal: Send + Sync {
    type Engine: XgmacEngine;

    /// Initialize the EMAC for `config.instance`, `None` on failure
    fn emac_init(&self, config: &EmacConfig) -> Option<Self::Engine>;
}

/// An initialized EMAC and its DMA channels
///
/// Methods take `&self`: the engine is used concurrently by the caller's
/// thread (transmit) and the deferred interrupt task (receive, completion)
/// and does its own descriptor-ring locking.
pub trait XgmacEngine: Send + Sync {
    /// Register the interrupt callback
    fn set_callback(&self, sink: Arc<dyn IrqSink>) -> Result<(), EngineStatus>;

    fn phy_discover(&self, phy: &mut PhyConfig) -> Result<(), EngineStatus>;

    fn phy_initialize(&self, phy: &mut PhyConfig) -> Result<(), EngineStatus>;

    /// Set up descriptor rings and enable DMA interrupts
    fn dma_initialize(&self) -> Result<(), EngineStatus>;

    /// Give the next free receive descriptor a buffer
    fn refill_rx_descriptor(&self, buf: DmaAddr) -> Result<(), EngineStatus>;

    /// Program speed/duplex from the negotiated PHY state
    fn cfg_speed_mode(&self, phy: &PhyConfig) -> Result<(), EngineStatus>;

    /// Reprogram speed/duplex after a link change
    fn update_speed_mode(&self, phy: &PhyConfig) -> Result<(), EngineStatus>;

    fn emac_start(&self) -> Result<(), EngineStatus>;

    fn dma_transmit(&self, tx: TxBuffer) -> Result<(), EngineStatus>;

    /// Next completed receive descriptor, `None` when the ring is drained
    fn dma_receive(&self) -> Option<RxBuffer>;

    /// Buffer of the oldest completed transmission
    fn dma_tx_done(&self) -> Result<Option<DmaAddr>, EngineStatus>;

    /// Read a PHY register over MDIO
    fn read_phy_reg(&self, phy_address: u8, reg: u8) -> u32;

    /// Size of the receive descriptor ring
    fn num_rx_descriptors(&self) -> usize {
        crate::config::NUM_RX_DESC
    }
}
