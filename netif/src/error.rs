// Error types for the network interface driver

use crate::init::InitStage;
use thiserror::Error;

/// Raw status code returned by a failing transfer-engine operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus(pub i32);

impl core::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// Network driver errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("Buffer pool not initialized")]
    PoolNotInitialized,

    #[error("Buffer pool allocation failed")]
    PoolAllocationFailed,

    #[error("Buffer pool fully used")]
    PoolExhausted,

    #[error("Buffer pool is already empty")]
    PoolEmpty,

    #[error("Timed out waiting for buffer pool lock")]
    PoolLockTimeout,

    #[error("Requested buffer size {wanted} exceeds pool buffer size {max}")]
    BufferTooLarge { wanted: usize, max: usize },

    #[error("Address is not a buffer of this pool")]
    NotPoolMember,

    #[error("EMAC not initialized")]
    EngineNotInitialized,

    #[error("Engine operation {op} failed: {status}")]
    Engine {
        op: &'static str,
        status: EngineStatus,
    },

    #[error("Ethernet buffer is null")]
    NullPayload,

    #[error("Invalid EMAC instance {0}")]
    InvalidInstance(u8),

    #[error("Deferred interrupt task creation failed")]
    TaskCreationFailed,

    #[error("Interface initialisation failed in stage {0}")]
    InitFailed(InitStage),

    #[error("Link is down")]
    LinkDown,

    #[error("No network buffer available")]
    NoNetworkBuffer,
}

impl NetError {
    /// Build an engine error for operation `op`
    pub fn engine(op: &'static str, status: EngineStatus) -> Self {
        NetError::Engine { op, status }
    }
}
