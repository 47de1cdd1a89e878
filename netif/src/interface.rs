//! Network interface context
//!
//! One [`NetworkInterface`] drives one EMAC instance. It owns everything the
//! driver needs: the instance record, the PHY record, the bring-up stage, the
//! link latch, both buffer pools and the interrupt notifier. The context is
//! shared as an `Arc` between the stack's thread (initialisation, output) and
//! the deferred interrupt task.
//!
//! The transmit, receive and deferred-task paths live in `tx.rs`, `rx.rs`
//! and `task.rs`.

extern crate alloc;

use crate::config::{
    DriverConfig, EMAC_MAX_INSTANCE, EMAC_TASK_NAME, MAX_PACKET_SIZE, RX_BUFFER_COUNT,
    RX_BUFFER_SIZE, TX_BUFFER_COUNT, TX_BUFFER_SIZE, ZERO_COPY_PREFILL_WAIT_MS,
};
use crate::drivers::{EmacConfig, EmacHal, IrqNotifier, IrqSink, PhyConfig, PhyInterface, XgmacEngine};
use crate::error::NetError;
use crate::init::{InitStage, StageOutcome};
use crate::link::LinkMonitor;
use crate::pool::BufferPool;
use crate::stack::{InterfaceId, IpStack};
use alloc::boxed::Box;
use alloc::sync::Arc;
use log::{error, info, warn};
use shared::task::{TaskHandle, TaskNotifier, TaskSpawner, TaskSpec};
use shared::timer::Clock;
use spin::{Mutex, Once, RwLock};

/// Name every instance registers under
pub const INTERFACE_NAME: &str = "socfpga";

/// Driver context of one EMAC instance
pub struct NetworkInterface<H: EmacHal, S: IpStack> {
    pub(crate) id: InterfaceId,
    pub(crate) emac: EmacConfig,
    pub(crate) config: DriverConfig,
    pub(crate) hal: H,
    pub(crate) stack: S,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) spawner: Arc<dyn TaskSpawner>,
    /// Opened engine; `None` until the first successful `EngineInit`
    pub(crate) engine: RwLock<Option<Arc<H::Engine>>>,
    pub(crate) phy: Mutex<PhyConfig>,
    pub(crate) stage: Mutex<InitStage>,
    pub(crate) link: LinkMonitor,
    pub(crate) tx_pool: BufferPool<TX_BUFFER_COUNT>,
    pub(crate) rx_pool: BufferPool<RX_BUFFER_COUNT>,
    pub(crate) notifier: Arc<IrqNotifier>,
    pub(crate) task: Once<TaskHandle>,
}

impl<H, S> NetworkInterface<H, S>
where
    H: EmacHal + 'static,
    S: IpStack + 'static,
{
    /// Register EMAC instance `index` with the driver
    ///
    /// Nothing touches the hardware until [`NetworkInterface::initialise`].
    /// `signal` is the notification the deferred task blocks on; it must be
    /// bound to the task `spawner` creates.
    pub fn new(
        index: u8,
        hal: H,
        stack: S,
        clock: Arc<dyn Clock>,
        spawner: Arc<dyn TaskSpawner>,
        signal: Arc<dyn TaskNotifier>,
        config: DriverConfig,
    ) -> Result<Arc<Self>, NetError> {
        if index >= EMAC_MAX_INSTANCE {
            return Err(NetError::InvalidInstance(index));
        }

        Ok(Arc::new(Self {
            id: InterfaceId(index),
            emac: EmacConfig {
                instance: index,
                phy_type: PhyInterface::Rgmii,
            },
            config,
            hal,
            stack,
            clock,
            spawner,
            engine: RwLock::new(None),
            phy: Mutex::new(PhyConfig::default()),
            stage: Mutex::new(InitStage::EngineInit),
            link: LinkMonitor::new(),
            tx_pool: BufferPool::new("Tx", TX_BUFFER_SIZE),
            rx_pool: BufferPool::new("Rx", RX_BUFFER_SIZE),
            notifier: Arc::new(IrqNotifier::new(signal, TX_BUFFER_COUNT)),
            task: Once::new(),
        }))
    }

    pub fn name(&self) -> &'static str {
        INTERFACE_NAME
    }

    pub fn id(&self) -> InterfaceId {
        self.id
    }

    pub fn emac_config(&self) -> EmacConfig {
        self.emac
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// Current bring-up stage
    pub fn init_stage(&self) -> InitStage {
        *self.stage.lock()
    }

    /// Link status as last read from the PHY
    pub fn phy_link_status(&self) -> bool {
        self.link.is_up()
    }

    pub fn phy_config(&self) -> PhyConfig {
        *self.phy.lock()
    }

    pub fn tx_pool(&self) -> &BufferPool<TX_BUFFER_COUNT> {
        &self.tx_pool
    }

    pub fn rx_pool(&self) -> &BufferPool<RX_BUFFER_COUNT> {
        &self.rx_pool
    }

    pub fn notifier(&self) -> &Arc<IrqNotifier> {
        &self.notifier
    }

    /// Handle of the deferred interrupt task, once created
    pub fn task_handle(&self) -> Option<TaskHandle> {
        self.task.get().copied()
    }

    pub(crate) fn engine(&self) -> Option<Arc<H::Engine>> {
        self.engine.read().clone()
    }

    /// Bring the interface up
    ///
    /// Called repeatedly by the stack until it returns `Ok`. Each call
    /// resumes where the previous one stopped; once `Ready` every call
    /// succeeds without side effects. While the link is down the call
    /// returns `Err(NetError::LinkDown)` and stays in `LinkWait`.
    pub fn initialise(self: &Arc<Self>) -> Result<(), NetError> {
        let mut stage = self.stage.lock();
        let mut current = stage.entry();

        while !current.is_terminal() {
            let outcome = match self.run_stage(current) {
                Ok(true) => StageOutcome::Done,
                Ok(false) => StageOutcome::Pending,
                Err(e) => {
                    error!("xgmac: {} failed: {}", current, e);
                    *stage = InitStage::Failed;
                    return Err(NetError::InitFailed(current));
                }
            };

            let next = current.next(outcome);
            if next == current {
                break;
            }
            if next == InitStage::Ready {
                info!("xgmac: interface {} ready", self.emac.instance);
            }
            current = next;
        }

        *stage = current;
        match current {
            InitStage::Ready => Ok(()),
            InitStage::Failed => Err(NetError::InitFailed(InitStage::Failed)),
            _ => Err(NetError::LinkDown),
        }
    }

    /// Run one stage; `Ok(false)` means it cannot complete yet
    fn run_stage(self: &Arc<Self>, stage: InitStage) -> Result<bool, NetError> {
        match stage {
            InitStage::EngineInit => self.engine_init().map(|_| true),
            InitStage::LinkPartnerInit => self.link_partner_init().map(|_| true),
            InitStage::TransferInit => self.transfer_init().map(|_| true),
            InitStage::EngineStart => self.engine_start().map(|_| true),
            InitStage::LinkWait => self.link_wait(),
            InitStage::Ready | InitStage::Failed => Ok(true),
        }
    }

    fn require_engine(&self) -> Result<Arc<H::Engine>, NetError> {
        self.engine().ok_or(NetError::EngineNotInitialized)
    }

    fn engine_init(&self) -> Result<(), NetError> {
        let engine = self
            .hal
            .emac_init(&self.emac)
            .map(Arc::new)
            .ok_or(NetError::EngineNotInitialized)?;
        *self.engine.write() = Some(engine.clone());

        let sink: Arc<dyn IrqSink> = self.notifier.clone();
        engine
            .set_callback(sink)
            .map_err(|status| NetError::engine("set_callback", status))
    }

    fn link_partner_init(&self) -> Result<(), NetError> {
        let engine = self.require_engine()?;
        let mut phy = self.phy.lock();

        engine
            .phy_discover(&mut phy)
            .map_err(|status| NetError::engine("phy_discover", status))?;
        engine
            .phy_initialize(&mut phy)
            .map_err(|status| NetError::engine("phy_initialize", status))?;

        info!(
            "xgmac: PHY {:#x} at address {}",
            phy.phy_identifier, phy.phy_address
        );
        Ok(())
    }

    fn transfer_init(&self) -> Result<(), NetError> {
        let engine = self.require_engine()?;

        if !self.config.zero_copy_tx && !self.tx_pool.is_initialized() {
            self.tx_pool.create()?;
        }
        if !self.config.zero_copy_rx && !self.rx_pool.is_initialized() {
            self.rx_pool.create()?;
        }

        engine
            .dma_initialize()
            .map_err(|status| NetError::engine("dma_initialize", status))?;

        self.prefill_rx_descriptors(&*engine)
    }

    /// Give every receive descriptor a buffer
    fn prefill_rx_descriptors(&self, engine: &H::Engine) -> Result<(), NetError> {
        for _ in 0..engine.num_rx_descriptors() {
            let addr = if self.config.zero_copy_rx {
                self.stack
                    .get_network_buffer(MAX_PACKET_SIZE, ZERO_COPY_PREFILL_WAIT_MS)
                    .and_then(|buffer| buffer.payload())
                    .ok_or(NetError::NoNetworkBuffer)?
            } else {
                self.rx_pool.acquire(RX_BUFFER_SIZE, &*self.clock)?
            };

            engine
                .refill_rx_descriptor(addr)
                .map_err(|status| NetError::engine("refill_rx_descriptor", status))?;
        }
        Ok(())
    }

    fn engine_start(&self) -> Result<(), NetError> {
        let engine = self.require_engine()?;
        let phy = *self.phy.lock();

        engine
            .cfg_speed_mode(&phy)
            .map_err(|status| NetError::engine("cfg_speed_mode", status))?;
        engine
            .emac_start()
            .map_err(|status| NetError::engine("emac_start", status))
    }

    fn link_wait(self: &Arc<Self>) -> Result<bool, NetError> {
        let engine = self.require_engine()?;
        let phy_address = self.phy.lock().phy_address;

        if !self.link.check_link(
            &*engine,
            phy_address,
            &*self.clock,
            self.config.init_link_wait_ms,
        ) {
            warn!("xgmac: waiting for link on interface {}", self.emac.instance);
            return Ok(false);
        }

        self.start_handler_task()?;
        Ok(true)
    }

    /// Create the deferred interrupt task unless it already exists
    fn start_handler_task(self: &Arc<Self>) -> Result<(), NetError> {
        if self.task.is_completed() {
            return Ok(());
        }

        let spec = TaskSpec {
            name: EMAC_TASK_NAME,
            stack_size: self.config.task_stack_size,
            priority: self.config.task_priority,
        };
        let this = Arc::clone(self);
        let handle = self
            .spawner
            .spawn(spec, Box::new(move || this.handler_task()))
            .ok_or(NetError::TaskCreationFailed)?;

        self.task.call_once(|| handle);
        self.notifier.arm();
        Ok(())
    }
}
