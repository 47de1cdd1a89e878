//! Test doubles shared by the integration tests
//!
//! `MockEngine` models the descriptor ring: refilled buffers are posted in
//! order and consumed in order when a frame "arrives". `MockStack` hands out
//! network buffers from a real `NetworkBufferArena`, so zero-copy lookups go
//! through the same RAM-to-descriptor binding the driver uses on hardware.

#![allow(dead_code)]

use netif::config::{BUFFER_PADDING, MAX_PACKET_SIZE};
use netif::{
    DmaAddr, DriverConfig, EmacConfig, EmacHal, EngineStatus, ErrInfo, EndpointId, InterfaceId,
    IntStatus, IpStack, IrqSink, NetworkBuffer, NetworkBufferArena, NetworkInterface, PhyConfig,
    RxBuffer, RxFrame, RxFrames, TxBuffer, XgmacEngine,
};
use log::{Level, LevelFilter, Log, Metadata, Record};
use shared::task::{TaskEntry, TaskHandle, TaskNotifier, TaskSpawner, TaskSpec};
use shared::timer::Clock;
use smoltcp::wire::EthernetAddress;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const OUR_MAC: EthernetAddress = EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

/// Link-up PHY status value
pub const LINK_UP: u32 = 0x796D;
/// Link-down PHY status value
pub const LINK_DOWN: u32 = 0x7949;

/// Receive descriptors the mock engine reports
pub const MOCK_RX_DESCRIPTORS: usize = 4;

/// Network buffers the mock stack owns; more than one linked batch
pub const MOCK_NETWORK_BUFFERS: usize = 128;

/// Status the mock engine returns for injected failures
pub const INJECTED_FAILURE: EngineStatus = EngineStatus(-1);

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Simulated clock; sleeping advances time
#[derive(Default)]
pub struct SimClock {
    now: AtomicU64,
    sleeps: AtomicUsize,
}

impl SimClock {
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(ms);
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Keeps every driver log record for inspection
struct CaptureLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};

/// Route driver logs to the capture logger; later calls are no-ops
pub fn capture_logs() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Trace);
}

/// Whether a record at `level` containing `text` was logged
///
/// Tests in one binary share the logger, so only look for messages unique
/// to the test asking.
pub fn logged(level: Level, text: &str) -> bool {
    LOGGER
        .records
        .lock()
        .unwrap()
        .iter()
        .any(|(l, message)| *l == level && message.contains(text))
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Records task creation without running the task
#[derive(Default)]
pub struct RecordingSpawner {
    pub specs: Mutex<Vec<TaskSpec>>,
    pub refuse: AtomicBool,
}

impl RecordingSpawner {
    pub fn spawned(&self) -> usize {
        self.specs.lock().unwrap().len()
    }
}

impl TaskSpawner for RecordingSpawner {
    fn spawn(&self, spec: TaskSpec, _entry: TaskEntry) -> Option<TaskHandle> {
        if self.refuse.load(Ordering::SeqCst) {
            return None;
        }
        let mut specs = self.specs.lock().unwrap();
        specs.push(spec);
        Some(TaskHandle(specs.len() as u32))
    }
}

/// Task notification on the simulated clock
///
/// An idle wait blocks once, jumping the clock by the whole timeout.
pub struct SimNotifier {
    clock: Arc<SimClock>,
    value: AtomicU32,
    blocks: AtomicUsize,
}

impl SimNotifier {
    pub fn new(clock: Arc<SimClock>) -> Self {
        Self {
            clock,
            value: AtomicU32::new(0),
            blocks: AtomicUsize::new(0),
        }
    }

    pub fn blocks(&self) -> usize {
        self.blocks.load(Ordering::SeqCst)
    }
}

impl TaskNotifier for SimNotifier {
    fn notify_from_isr(&self, bits: u32) {
        self.value.fetch_or(bits, Ordering::SeqCst);
    }

    fn wait(&self, timeout_ms: u64) -> u32 {
        let value = self.value.swap(0, Ordering::SeqCst);
        if value != 0 {
            return value;
        }
        self.blocks.fetch_add(1, Ordering::SeqCst);
        self.clock.advance(timeout_ms);
        self.value.swap(0, Ordering::SeqCst)
    }

    fn pending(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A frame handed to `dma_transmit`, with its bytes at submission time
#[derive(Debug, Clone)]
pub struct Transmitted {
    pub tx: TxBuffer,
    pub bytes: Vec<u8>,
}

/// State shared by the mock HAL and every engine it opens
pub struct EngineState {
    pub refuse_init: AtomicBool,
    pub init_calls: AtomicUsize,
    /// Operation name that fails with [`INJECTED_FAILURE`]
    pub fail_op: Mutex<Option<&'static str>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub sink: Mutex<Option<Arc<dyn IrqSink>>>,
    pub phy_status: AtomicU32,
    pub phy_reads: AtomicUsize,
    /// Buffers posted to receive descriptors, oldest first
    pub posted: Mutex<VecDeque<DmaAddr>>,
    pub refills: Mutex<Vec<DmaAddr>>,
    pub rx_queue: Mutex<VecDeque<RxBuffer>>,
    pub transmitted: Mutex<Vec<Transmitted>>,
    pub tx_done: Mutex<VecDeque<Result<Option<DmaAddr>, EngineStatus>>>,
    pub tx_completed: AtomicUsize,
    pub rx_descriptors: usize,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            refuse_init: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            fail_op: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            phy_status: AtomicU32::new(LINK_UP),
            phy_reads: AtomicUsize::new(0),
            posted: Mutex::new(VecDeque::new()),
            refills: Mutex::new(Vec::new()),
            rx_queue: Mutex::new(VecDeque::new()),
            transmitted: Mutex::new(Vec::new()),
            tx_done: Mutex::new(VecDeque::new()),
            tx_completed: AtomicUsize::new(0),
            rx_descriptors: MOCK_RX_DESCRIPTORS,
        }
    }
}

impl EngineState {
    fn call(&self, op: &'static str) -> Result<(), EngineStatus> {
        self.calls.lock().unwrap().push(op);
        if *self.fail_op.lock().unwrap() == Some(op) {
            Err(INJECTED_FAILURE)
        } else {
            Ok(())
        }
    }

    pub fn fail(&self, op: &'static str) {
        *self.fail_op.lock().unwrap() = Some(op);
    }

    pub fn heal(&self) {
        *self.fail_op.lock().unwrap() = None;
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn set_link(&self, up: bool) {
        let status = if up { LINK_UP } else { LINK_DOWN };
        self.phy_status.store(status, Ordering::SeqCst);
    }

    pub fn posted_count(&self) -> usize {
        self.posted.lock().unwrap().len()
    }

    /// DMA `frame` into the oldest posted buffer and complete its descriptor
    pub fn complete_rx(&self, frame: &[u8], packet_status: u32) -> DmaAddr {
        let buf = self
            .posted
            .lock()
            .unwrap()
            .pop_front()
            .expect("no posted Rx buffer");
        let dst = unsafe { buf.as_mut_slice(frame.len()) };
        dst.copy_from_slice(frame);
        self.rx_queue.lock().unwrap().push_back(RxBuffer {
            buf: Some(buf),
            size: frame.len(),
            packet_status,
        });
        buf
    }

    /// Complete the oldest outstanding transmission and raise its interrupt
    pub fn complete_tx(&self) -> DmaAddr {
        let next = self.tx_completed.fetch_add(1, Ordering::SeqCst);
        let addr = self.transmitted.lock().unwrap()[next].tx.buf;
        self.tx_done.lock().unwrap().push_back(Ok(Some(addr)));
        self.interrupt(IntStatus::TxDone, ErrInfo::default());
        addr
    }

    pub fn interrupt(&self, status: IntStatus, info: ErrInfo) {
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.on_interrupt(status, info);
        }
    }
}

pub struct MockEngine {
    pub state: Arc<EngineState>,
}

impl XgmacEngine for MockEngine {
    fn set_callback(&self, sink: Arc<dyn IrqSink>) -> Result<(), EngineStatus> {
        self.state.call("set_callback")?;
        *self.state.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn phy_discover(&self, phy: &mut PhyConfig) -> Result<(), EngineStatus> {
        self.state.call("phy_discover")?;
        phy.phy_address = 4;
        phy.phy_identifier = 0x0141_0DD0;
        Ok(())
    }

    fn phy_initialize(&self, _phy: &mut PhyConfig) -> Result<(), EngineStatus> {
        self.state.call("phy_initialize")
    }

    fn dma_initialize(&self) -> Result<(), EngineStatus> {
        self.state.call("dma_initialize")
    }

    fn refill_rx_descriptor(&self, buf: DmaAddr) -> Result<(), EngineStatus> {
        self.state.call("refill_rx_descriptor")?;
        self.state.refills.lock().unwrap().push(buf);
        self.state.posted.lock().unwrap().push_back(buf);
        Ok(())
    }

    fn cfg_speed_mode(&self, _phy: &PhyConfig) -> Result<(), EngineStatus> {
        self.state.call("cfg_speed_mode")
    }

    fn update_speed_mode(&self, _phy: &PhyConfig) -> Result<(), EngineStatus> {
        self.state.call("update_speed_mode")
    }

    fn emac_start(&self) -> Result<(), EngineStatus> {
        self.state.call("emac_start")
    }

    fn dma_transmit(&self, tx: TxBuffer) -> Result<(), EngineStatus> {
        self.state.call("dma_transmit")?;
        let bytes = unsafe { tx.buf.as_slice(tx.size) }.to_vec();
        self.state
            .transmitted
            .lock()
            .unwrap()
            .push(Transmitted { tx, bytes });
        Ok(())
    }

    fn dma_receive(&self) -> Option<RxBuffer> {
        self.state.rx_queue.lock().unwrap().pop_front()
    }

    fn dma_tx_done(&self) -> Result<Option<DmaAddr>, EngineStatus> {
        self.state.calls.lock().unwrap().push("dma_tx_done");
        self.state.tx_done.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    fn read_phy_reg(&self, _phy_address: u8, _reg: u8) -> u32 {
        self.state.phy_reads.fetch_add(1, Ordering::SeqCst);
        self.state.phy_status.load(Ordering::SeqCst)
    }

    fn num_rx_descriptors(&self) -> usize {
        self.state.rx_descriptors
    }
}

pub struct MockHal {
    pub state: Arc<EngineState>,
}

impl EmacHal for MockHal {
    type Engine = MockEngine;

    fn emac_init(&self, _config: &EmacConfig) -> Option<MockEngine> {
        self.state.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.refuse_init.load(Ordering::SeqCst) {
            return None;
        }
        Some(MockEngine {
            state: self.state.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

pub struct MockStack {
    pub arena: NetworkBufferArena<MOCK_NETWORK_BUFFERS>,
    pub released: Mutex<Vec<u16>>,
    pub events: Mutex<Vec<Vec<RxFrame>>>,
    pub queue_full: AtomicBool,
    pub exhausted: AtomicBool,
}

impl MockStack {
    pub fn new() -> Self {
        Self {
            arena: NetworkBufferArena::bind(MAX_PACKET_SIZE + BUFFER_PADDING)
                .expect("arena allocation"),
            released: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            queue_full: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Take a buffer holding `frame` as the stack would before output
    pub fn buffer_with(&self, frame: &[u8]) -> NetworkBuffer {
        let buffer = self.arena.take(frame.len()).expect("free network buffer");
        let payload = buffer.payload().expect("bound payload");
        unsafe { payload.as_mut_slice(frame.len()) }.copy_from_slice(frame);
        buffer.with_data_length(frame.len())
    }

    pub fn released_count(&self) -> usize {
        self.released.lock().unwrap().len()
    }

    pub fn delivered(&self) -> Vec<RxFrame> {
        self.events.lock().unwrap().iter().flatten().copied().collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl IpStack for MockStack {
    fn get_network_buffer(&self, wanted_size: usize, _block_ms: u32) -> Option<NetworkBuffer> {
        if self.exhausted.load(Ordering::SeqCst) {
            return None;
        }
        self.arena.take(wanted_size)
    }

    fn release_network_buffer(&self, buffer: &NetworkBuffer) {
        self.released.lock().unwrap().push(buffer.index());
        self.arena.give(buffer);
    }

    fn send_rx_event(&self, frames: RxFrames, _timeout_ms: u32) -> Result<(), RxFrames> {
        if self.queue_full.load(Ordering::SeqCst) {
            return Err(frames);
        }
        self.events.lock().unwrap().push(frames.iter().copied().collect());
        Ok(())
    }

    fn matching_endpoint(&self, _interface: InterfaceId, _frame: &[u8]) -> Option<EndpointId> {
        Some(EndpointId(1))
    }

    fn packet_buffer_to_network_buffer(&self, addr: DmaAddr) -> Option<NetworkBuffer> {
        self.arena.lookup(addr)
    }

    fn mac_address(&self) -> EthernetAddress {
        OUR_MAC
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub type TestInterface = NetworkInterface<MockHal, MockStack>;

pub struct Fixture {
    pub iface: Arc<TestInterface>,
    pub engine: Arc<EngineState>,
    pub clock: Arc<SimClock>,
    pub spawner: Arc<RecordingSpawner>,
    pub signal: Arc<SimNotifier>,
}

impl Fixture {
    pub fn new(config: DriverConfig) -> Self {
        Self::with_engine(config, EngineState::default())
    }

    pub fn with_engine(config: DriverConfig, engine: EngineState) -> Self {
        let engine = Arc::new(engine);
        let clock = Arc::new(SimClock::default());
        let spawner = Arc::new(RecordingSpawner::default());
        let signal = Arc::new(SimNotifier::new(clock.clone()));

        let iface = NetworkInterface::new(
            0,
            MockHal {
                state: engine.clone(),
            },
            MockStack::new(),
            clock.clone(),
            spawner.clone(),
            signal.clone(),
            config,
        )
        .expect("instance 0 is valid");

        Self {
            iface,
            engine,
            clock,
            spawner,
            signal,
        }
    }

    /// Interface brought up with the link already up
    pub fn ready(config: DriverConfig) -> Self {
        Self::ready_with_engine(config, EngineState::default())
    }

    pub fn ready_with_engine(config: DriverConfig, engine: EngineState) -> Self {
        let fixture = Self::with_engine(config, engine);
        fixture.iface.initialise().expect("bring-up");
        fixture
    }

    pub fn stack(&self) -> &MockStack {
        self.iface.stack()
    }
}

/// IPv4 frame addressed to [`OUR_MAC`], `len` bytes long including a
/// trailing CRC
pub fn ipv4_frame(len: usize) -> Vec<u8> {
    frame_with(OUR_MAC.0, 0x0800, len)
}

pub fn frame_with(dst: [u8; 6], ethertype: u16, len: usize) -> Vec<u8> {
    let mut frame = vec![0u8; len];
    frame[0..6].copy_from_slice(&dst);
    frame[6..12].copy_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x99]);
    frame[12..14].copy_from_slice(&ethertype.to_be_bytes());
    for (i, byte) in frame.iter_mut().enumerate().skip(14) {
        *byte = i as u8;
    }
    frame
}
