#![no_std]

// SoCFPGA XGMAC network interface driver
// Bridges the XGMAC transfer engine to the TCP/IP stack: buffer pools,
// interface bring-up, transmit and receive paths and the deferred interrupt
// task

#[macro_use]
extern crate alloc;

pub mod config;
pub mod drivers;
pub mod error;
pub mod init;
pub mod interface;
pub mod link;
pub mod pool;
mod rx;
pub mod stack;
mod task;
mod tx;

// Re-export commonly used types
pub use config::DriverConfig;
pub use drivers::{
    DmaAddr, EmacConfig, EmacHal, ErrInfo, EventBits, IntStatus, IrqNotifier, IrqSink,
    PhyConfig, PhyInterface, RxBuffer, TxBuffer, XgmacEngine,
};
pub use error::{EngineStatus, NetError};
pub use init::{InitStage, StageOutcome};
pub use interface::{NetworkInterface, INTERFACE_NAME};
pub use link::{LinkMonitor, LinkPollTimer};
pub use pool::BufferPool;
pub use stack::{
    consider_frame_for_processing, EndpointId, FrameDisposition, InterfaceId, IpStack,
    NetworkBuffer, NetworkBufferArena, RxFrame, RxFrames,
};
