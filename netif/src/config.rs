//! Build-time configuration of the network interface driver
//!
//! Buffer ownership mode, receive delivery mode and the deferred task's
//! scheduling parameters are selected with cargo features and captured in a
//! [`DriverConfig`] when the interface is created. Nothing here changes at
//! runtime.

use shared::task::{TaskPriority, MINIMAL_STACK_SIZE};

/// Number of EMAC instances on the SoC
pub const EMAC_MAX_INSTANCE: u8 = 3;

/// Largest frame the EMAC transmits or receives, including CRC
pub const MAX_PACKET_SIZE: usize = 1536;

/// Transmit buffer pool capacity (copy mode)
pub const TX_BUFFER_COUNT: usize = 512;

/// Transmit pool slot size
pub const TX_BUFFER_SIZE: usize = MAX_PACKET_SIZE;

/// Receive buffer pool capacity (copy mode)
pub const RX_BUFFER_COUNT: usize = 512;

/// Receive pool slot size
pub const RX_BUFFER_SIZE: usize = MAX_PACKET_SIZE;

/// Receive descriptors in the DMA ring
pub const NUM_RX_DESC: usize = 256;

/// Network buffer descriptors owned by the IP stack
pub const NUM_NETWORK_BUFFERS: usize = 256;

/// Bytes reserved in front of each stack payload
pub const BUFFER_PADDING: usize = 10;

/// Hardware appends the Ethernet FCS to every received frame
pub const ETHERNET_CRC_LEN: usize = 4;

/// Frames accumulated per drain cycle in linked-message mode
pub const RX_BATCH_CAPACITY: usize = 64;

/// Alignment of DMA backing regions
pub const DMA_ALIGNMENT: usize = 64;

/// Bounded wait on a pool lock
pub const POOL_LOCK_TIMEOUT_MS: u64 = 1000;

/// Cadence of MDIO polling while waiting for link
pub const LINK_POLL_STEP_MS: u64 = 20;

/// How long one initialisation call waits for link
pub const INIT_LINK_WAIT_MS: u64 = 1000;

/// Re-check interval while the link is up
pub const PHY_LS_HIGH_CHECK_TIME_MS: u64 = 15_000;

/// Re-check interval while the link is down
pub const PHY_LS_LOW_CHECK_TIME_MS: u64 = 1000;

/// Longest the deferred task blocks waiting for an interrupt
pub const TASK_BLOCK_TIME_MS: u64 = 100;

/// Timeout when handing received frames to the stack
pub const RX_EVENT_TIMEOUT_MS: u32 = 1000;

/// Per-descriptor wait for a stack buffer during zero-copy pre-fill
pub const ZERO_COPY_PREFILL_WAIT_MS: u32 = 100;

/// Name of the deferred interrupt task
pub const EMAC_TASK_NAME: &str = "EMAC";

/// Driver configuration fixed at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Hand stack buffers to the DMA directly on transmit
    pub zero_copy_tx: bool,
    /// Let the DMA receive straight into stack buffers
    pub zero_copy_rx: bool,
    /// Deliver each drain cycle's frames to the stack as one chain
    pub linked_rx_messages: bool,
    /// Run the frame-type classifier before handing frames up
    pub filter_frame_types: bool,
    pub task_priority: TaskPriority,
    /// Deferred task stack depth in words
    pub task_stack_size: usize,
    pub link_high_check_ms: u64,
    pub link_low_check_ms: u64,
    pub init_link_wait_ms: u64,
}

impl DriverConfig {
    /// Configuration selected by the crate's cargo features
    pub const DEFAULT: DriverConfig = DriverConfig {
        zero_copy_tx: cfg!(feature = "zero-copy-tx"),
        zero_copy_rx: cfg!(feature = "zero-copy-rx"),
        linked_rx_messages: cfg!(feature = "linked-rx-messages"),
        filter_frame_types: cfg!(feature = "filter-frame-types"),
        task_priority: TaskPriority(TaskPriority::MAX_PRIORITIES - 1),
        task_stack_size: 4 * MINIMAL_STACK_SIZE,
        link_high_check_ms: PHY_LS_HIGH_CHECK_TIME_MS,
        link_low_check_ms: PHY_LS_LOW_CHECK_TIME_MS,
        init_link_wait_ms: INIT_LINK_WAIT_MS,
    };

    /// Copy mode on both paths
    pub const fn copy_mode() -> Self {
        DriverConfig {
            zero_copy_tx: false,
            zero_copy_rx: false,
            ..Self::DEFAULT
        }
    }

    /// Zero-copy on both paths
    pub const fn zero_copy() -> Self {
        DriverConfig {
            zero_copy_tx: true,
            zero_copy_rx: true,
            ..Self::DEFAULT
        }
    }

    pub const fn with_linked_rx_messages(mut self, linked: bool) -> Self {
        self.linked_rx_messages = linked;
        self
    }

    pub const fn with_frame_filter(mut self, filter: bool) -> Self {
        self.filter_frame_types = filter;
        self
    }

    /// Whether any buffer pool is needed
    pub const fn uses_pools(&self) -> bool {
        !self.zero_copy_tx || !self.zero_copy_rx
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
