// Classification of DMA error events reported by the engine

use log::error;

/// DMA error categories the engine reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaErrorKind {
    FatalBus,
    TxStopped,
    RxStopped,
    TxBufUnavailable,
    RxBufUnavailable,
    ContextDescriptor,
    DescriptorDefinition,
    Unhandled,
}

impl DmaErrorKind {
    /// Decode the engine's error code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DmaErrorKind::FatalBus),
            1 => Some(DmaErrorKind::TxStopped),
            2 => Some(DmaErrorKind::RxStopped),
            3 => Some(DmaErrorKind::TxBufUnavailable),
            4 => Some(DmaErrorKind::RxBufUnavailable),
            5 => Some(DmaErrorKind::ContextDescriptor),
            6 => Some(DmaErrorKind::DescriptorDefinition),
            7 => Some(DmaErrorKind::Unhandled),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl core::fmt::Display for DmaErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DmaErrorKind::FatalBus => write!(f, "Fatal Bus Error"),
            DmaErrorKind::TxStopped => write!(f, "Transmit Stopped"),
            DmaErrorKind::RxStopped => write!(f, "Receive Stopped"),
            DmaErrorKind::TxBufUnavailable => write!(f, "Transmit Buffer Unavailable Error"),
            DmaErrorKind::RxBufUnavailable => write!(f, "Receive Buffer Unavailable Error"),
            DmaErrorKind::ContextDescriptor => write!(f, "Context Descriptor Error"),
            DmaErrorKind::DescriptorDefinition => write!(f, "Descriptor Definition Error"),
            DmaErrorKind::Unhandled => write!(f, "Unhandled Error"),
        }
    }
}

/// Log a DMA error event
///
/// No recovery is attempted. Every known code is only logged; an unknown
/// code means the engine and driver disagree on the error encoding.
///
/// # Panics
/// On an error code outside [`DmaErrorKind`].
pub fn handle_error_event(code: u8, channel: u8) -> DmaErrorKind {
    match DmaErrorKind::from_code(code) {
        Some(kind) => {
            match kind {
                DmaErrorKind::TxStopped | DmaErrorKind::RxStopped => {
                    error!(
                        "xgmac: {} on DMA channel {}, re-init network interface",
                        kind, channel
                    );
                }
                _ => error!("xgmac: {} on DMA channel {}", kind, channel),
            }
            kind
        }
        None => panic!(
            "xgmac: unknown DMA error code {} on channel {}",
            code, channel
        ),
    }
}
