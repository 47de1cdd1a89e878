//! Interface bring-up state machine
//!
//! Initialisation is re-entrant: the stack calls it until it reports success.
//! Each call resumes at the stored stage and falls through the following
//! stages for as long as they complete. The transitions are pure functions
//! of the current stage and the outcome of running it, so the sequencing can
//! be checked without hardware.

/// Bring-up stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Open the EMAC and register its interrupt callback
    EngineInit,
    /// Discover and initialize the PHY
    LinkPartnerInit,
    /// Create buffer pools, initialize DMA, pre-fill receive descriptors
    TransferInit,
    /// Program speed/duplex and start the EMAC
    EngineStart,
    /// Wait for link, then create the deferred interrupt task
    LinkWait,
    Ready,
    Failed,
}

/// Result of running one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Stage completed, fall through to the next one
    Done,
    /// Stage cannot complete yet, stay here until the next call
    Pending,
    Failed,
}

impl InitStage {
    /// Stage a new initialisation call starts from
    ///
    /// A failed bring-up starts over from the beginning.
    pub fn entry(self) -> InitStage {
        match self {
            InitStage::Failed => InitStage::EngineInit,
            stage => stage,
        }
    }

    /// Stage after running `self` with `outcome`
    pub fn next(self, outcome: StageOutcome) -> InitStage {
        match (self, outcome) {
            (InitStage::Ready, _) => InitStage::Ready,
            (InitStage::Failed, _) => InitStage::Failed,
            (_, StageOutcome::Failed) => InitStage::Failed,
            (stage, StageOutcome::Pending) => stage,
            (InitStage::EngineInit, StageOutcome::Done) => InitStage::LinkPartnerInit,
            (InitStage::LinkPartnerInit, StageOutcome::Done) => InitStage::TransferInit,
            (InitStage::TransferInit, StageOutcome::Done) => InitStage::EngineStart,
            (InitStage::EngineStart, StageOutcome::Done) => InitStage::LinkWait,
            (InitStage::LinkWait, StageOutcome::Done) => InitStage::Ready,
        }
    }

    /// `Ready` or `Failed`
    pub fn is_terminal(self) -> bool {
        matches!(self, InitStage::Ready | InitStage::Failed)
    }
}

impl core::fmt::Display for InitStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InitStage::EngineInit => write!(f, "EngineInit"),
            InitStage::LinkPartnerInit => write!(f, "LinkPartnerInit"),
            InitStage::TransferInit => write!(f, "TransferInit"),
            InitStage::EngineStart => write!(f, "EngineStart"),
            InitStage::LinkWait => write!(f, "LinkWait"),
            InitStage::Ready => write!(f, "Ready"),
            InitStage::Failed => write!(f, "Failed"),
        }
    }
}
