//! Intel 82540EM ("E1000") gigabit Ethernet driver.
//!
//! One device instance, legacy line-based interrupts, legacy 16-byte
//! descriptors. The TX and RX rings live in DMA pages leaked out of the
//! page allocator for the lifetime of the device; descriptor ownership
//! follows the DD status bit (TX: software owns until submitted, hardware
//! until writeback; RX: hardware owns until DD, software until the status
//! byte is cleared and the tail advances past it).
//!
//! Missing hardware is not an error: `e1000_init` logs and returns, and the
//! public API degrades to error/empty results.

use core::ffi::{c_char, c_int, c_void};
use core::ptr;
use core::sync::atomic::{AtomicU64, Ordering, fence};

use vexos_core::irq;
use vexos_lib::{InitFlag, InterruptFrame, IrqMutex, klog_debug, klog_info, klog_warn};
use vexos_mm::addr::PhysAddr;
use vexos_mm::mmio::MmioRegion;
use vexos_mm::page_alloc::OwnedPageFrame;

use crate::e1000_defs::*;
use crate::pci::{
    PCI_DEVICE_ID_82540EM, PCI_VENDOR_ID_INTEL, PciDeviceInfo, PciDriver, pci_enable_bus_mastering,
    pci_find_device, pci_register_driver,
};

/// Iteration budget for the post-reset CTRL poll.
const RESET_TIMEOUT_ITERS: u32 = 100_000;

pub const E1000_TX_OK: c_int = 0;
pub const E1000_TX_ERROR: c_int = -1;
pub const E1000_TX_BUSY: c_int = -2;

// =============================================================================
// Device state
// =============================================================================

/// Addresses are stored as plain integers; the raw pointers are rebuilt at
/// the point of use so the state stays `Send` for the `IrqMutex`.
#[derive(Clone, Copy)]
struct TxRing {
    desc_phys: u64,
    desc_virt: u64,
    buf_phys: [u64; N_TX_DESC],
    buf_virt: [u64; N_TX_DESC],
    /// Next descriptor `transmit` fills; mirrors the TDT register.
    tail: usize,
    /// Oldest in-flight descriptor, reaped on DD writeback.
    head: usize,
    in_flight: usize,
}

impl TxRing {
    const fn new() -> Self {
        Self {
            desc_phys: 0,
            desc_virt: 0,
            buf_phys: [0; N_TX_DESC],
            buf_virt: [0; N_TX_DESC],
            tail: 0,
            head: 0,
            in_flight: 0,
        }
    }

    #[inline]
    fn desc_ptr(&self, idx: usize) -> *mut E1000TxDesc {
        (self.desc_virt as *mut E1000TxDesc).wrapping_add(idx)
    }
}

#[derive(Clone, Copy)]
struct RxRing {
    desc_phys: u64,
    desc_virt: u64,
    buf_phys: [u64; N_RX_DESC],
    buf_virt: [u64; N_RX_DESC],
    /// Next descriptor software inspects for a completed frame.
    head: usize,
}

impl RxRing {
    const fn new() -> Self {
        Self {
            desc_phys: 0,
            desc_virt: 0,
            buf_phys: [0; N_RX_DESC],
            buf_virt: [0; N_RX_DESC],
            head: 0,
        }
    }

    #[inline]
    fn desc_ptr(&self, idx: usize) -> *mut E1000RxDesc {
        (self.desc_virt as *mut E1000RxDesc).wrapping_add(idx)
    }
}

struct E1000State {
    regs: MmioRegion,
    mac: [u8; 6],
    irq_line: u8,
    tx: TxRing,
    rx: RxRing,
    ready: bool,
}

impl E1000State {
    const fn new() -> Self {
        Self {
            regs: MmioRegion::empty(),
            mac: [0; 6],
            irq_line: 0,
            tx: TxRing::new(),
            rx: RxRing::new(),
            ready: false,
        }
    }
}

static DEVICE_CLAIMED: InitFlag = InitFlag::new();
static E1000_STATE: IrqMutex<E1000State> = IrqMutex::new(E1000State::new());

static IRQ_COUNT: AtomicU64 = AtomicU64::new(0);
static RX_EVENTS: AtomicU64 = AtomicU64::new(0);
static RX_OVERRUNS: AtomicU64 = AtomicU64::new(0);
static TX_WRITEBACKS: AtomicU64 = AtomicU64::new(0);
static LINK_CHANGES: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Register helpers
// =============================================================================

/// Assemble the station MAC from the RAL0/RAH0 register pair.
///
/// RAL holds bytes 0..3 of the address little-endian; the low word of RAH
/// holds bytes 4..5.
pub(crate) fn mac_from_ral_rah(ral: u32, rah: u32) -> [u8; 6] {
    [
        ral as u8,
        (ral >> 8) as u8,
        (ral >> 16) as u8,
        (ral >> 24) as u8,
        rah as u8,
        (rah >> 8) as u8,
    ]
}

pub(crate) fn e1000_read_station_mac(regs: &MmioRegion) -> [u8; 6] {
    mac_from_ral_rah(regs.read_u32(REG_RAL0), regs.read_u32(REG_RAH0))
}

/// Mask all interrupt sources and drain any latched causes.
fn e1000_disable_interrupts(regs: &MmioRegion) {
    regs.write_u32(REG_IMC, IMC_ALL);
    let _ = regs.read_u32(REG_ICR);
}

/// Issue a global reset and poll CTRL until the reset bit self-clears.
///
/// Returns non-zero if the bit never clears within the iteration budget, in
/// which case the device must not be used.
pub(crate) fn e1000_reset(regs: &MmioRegion) -> c_int {
    e1000_disable_interrupts(regs);

    let ctrl = regs.read_u32(REG_CTRL);
    regs.write_u32(REG_CTRL, ctrl | CTRL_RST);

    let mut iterations = 0u32;
    while regs.read_u32(REG_CTRL) & CTRL_RST != 0 {
        iterations += 1;
        if iterations >= RESET_TIMEOUT_ITERS {
            return -1;
        }
        core::hint::spin_loop();
    }

    // Reset restores the power-on interrupt state; mask again.
    e1000_disable_interrupts(regs);
    0
}

pub(crate) fn e1000_program_tx_ring(regs: &MmioRegion, ring_phys: u64) {
    regs.write_u32(REG_TDBAL, ring_phys as u32);
    regs.write_u32(REG_TDBAH, (ring_phys >> 32) as u32);
    regs.write_u32(REG_TDLEN, (N_TX_DESC * DESC_SIZE) as u32);
    regs.write_u32(REG_TDH, 0);
    regs.write_u32(REG_TDT, 0);

    regs.write_u32(REG_TCTL, TCTL_EN | TCTL_PSP | TCTL_CT | TCTL_COLD);
    regs.write_u32(REG_TIPG, TIPG_DEFAULT);
}

pub(crate) fn e1000_program_rx_ring(regs: &MmioRegion, ring_phys: u64) {
    regs.write_u32(REG_RDBAL, ring_phys as u32);
    regs.write_u32(REG_RDBAH, (ring_phys >> 32) as u32);
    regs.write_u32(REG_RDLEN, (N_RX_DESC * DESC_SIZE) as u32);
    regs.write_u32(REG_RDH, 0);
    // Every descriptor except the one before head belongs to hardware.
    regs.write_u32(REG_RDT, (N_RX_DESC - 1) as u32);

    regs.write_u32(
        REG_RCTL,
        RCTL_EN
            | RCTL_SBP
            | RCTL_UPE
            | RCTL_MPE
            | RCTL_LBM_NONE
            | RCTL_RDMTS_HALF
            | RCTL_BAM
            | RCTL_BSIZE_2048
            | RCTL_SECRC,
    );
}

// =============================================================================
// Ring construction
// =============================================================================

/// Allocate a descriptor ring page plus one DMA buffer page per descriptor.
///
/// Pages are leaked out of the allocator on purpose: the NIC holds their
/// physical addresses until shutdown, which this kernel does not do.
fn alloc_ring_memory(
    count: usize,
    buf_phys: &mut [u64],
    buf_virt: &mut [u64],
) -> Option<(u64, u64)> {
    let desc_page = OwnedPageFrame::alloc_dma()?;
    let desc_virt = desc_page.as_mut_ptr::<u8>() as u64;
    let desc_phys = desc_page.into_phys().as_u64();

    for i in 0..count {
        let page = OwnedPageFrame::alloc_dma()?;
        buf_virt[i] = page.as_mut_ptr::<u8>() as u64;
        buf_phys[i] = page.into_phys().as_u64();
    }

    Some((desc_phys, desc_virt))
}

fn build_tx_ring() -> Option<TxRing> {
    let mut ring = TxRing::new();
    let (desc_phys, desc_virt) =
        alloc_ring_memory(N_TX_DESC, &mut ring.buf_phys, &mut ring.buf_virt)?;
    ring.desc_phys = desc_phys;
    ring.desc_virt = desc_virt;

    for i in 0..N_TX_DESC {
        let desc = E1000TxDesc {
            buffer_addr: ring.buf_phys[i],
            length: 0,
            cso: 0,
            cmd: TX_CMD_EOP | TX_CMD_IFCS | TX_CMD_RS,
            status: 0,
            css: 0,
            special: 0,
        };
        unsafe { ptr::write_volatile(ring.desc_ptr(i), desc) };
    }

    Some(ring)
}

fn build_rx_ring() -> Option<RxRing> {
    let mut ring = RxRing::new();
    let (desc_phys, desc_virt) =
        alloc_ring_memory(N_RX_DESC, &mut ring.buf_phys, &mut ring.buf_virt)?;
    ring.desc_phys = desc_phys;
    ring.desc_virt = desc_virt;

    for i in 0..N_RX_DESC {
        let desc = E1000RxDesc {
            buffer_addr: ring.buf_phys[i],
            length: 0,
            checksum: 0,
            status: 0,
            errors: 0,
            special: 0,
        };
        unsafe { ptr::write_volatile(ring.desc_ptr(i), desc) };
    }

    Some(ring)
}

// =============================================================================
// Interrupt handler
// =============================================================================

/// Line interrupt handler. Reading ICR acknowledges the device; claiming
/// the line is decided by whether any cause bit was latched, which keeps
/// shared-line semantics honest.
extern "C" fn e1000_irq_handler(_irq: u8, _frame: *mut InterruptFrame, _ctx: *mut c_void) -> bool {
    let state = E1000_STATE.lock();
    if !state.ready {
        return false;
    }

    let icr = E1000Intr::from_bits_truncate(state.regs.read_u32(REG_ICR));
    drop(state);

    if icr.is_empty() {
        return false;
    }

    IRQ_COUNT.fetch_add(1, Ordering::Relaxed);
    if icr.contains(E1000Intr::RXT0) {
        RX_EVENTS.fetch_add(1, Ordering::Relaxed);
    }
    if icr.contains(E1000Intr::RXO) {
        RX_OVERRUNS.fetch_add(1, Ordering::Relaxed);
    }
    if icr.contains(E1000Intr::TXDW) {
        TX_WRITEBACKS.fetch_add(1, Ordering::Relaxed);
    }
    if icr.contains(E1000Intr::LSC) {
        LINK_CHANGES.fetch_add(1, Ordering::Relaxed);
    }

    // Frames are drained from task context via e1000_receive; the handler
    // only acknowledges and counts.
    true
}

// =============================================================================
// PCI probe
// =============================================================================

fn e1000_match(info: *const PciDeviceInfo, _context: *mut c_void) -> bool {
    if info.is_null() {
        return false;
    }
    let info = unsafe { &*info };
    info.vendor_id == PCI_VENDOR_ID_INTEL && info.device_id == PCI_DEVICE_ID_82540EM
}

fn e1000_probe(info: *const PciDeviceInfo, _context: *mut c_void) -> c_int {
    if !DEVICE_CLAIMED.claim() {
        klog_debug!("e1000: already claimed");
        return -1;
    }

    let info = unsafe { &*info };
    klog_info!(
        "e1000: probing {:04x}:{:04x} at {:02x}:{:02x}.{}",
        info.vendor_id,
        info.device_id,
        info.bus,
        info.device,
        info.function
    );

    pci_enable_bus_mastering(info);

    let bar0 = info.bars[0];
    if !bar0.is_present() || bar0.is_io {
        klog_warn!("e1000: BAR0 is not an MMIO window");
        DEVICE_CLAIMED.reset();
        return -1;
    }

    let window = (bar0.size as usize).min(E1000_MMIO_WINDOW_SIZE);
    let Some(regs) = MmioRegion::map(PhysAddr::new(bar0.base), window) else {
        klog_warn!("e1000: BAR0 MMIO mapping failed");
        DEVICE_CLAIMED.reset();
        return -1;
    };

    if e1000_reset(&regs) != 0 {
        klog_warn!("e1000: reset did not complete, device unusable");
        DEVICE_CLAIMED.reset();
        return -1;
    }

    // Force the MAC/PHY link up; the 82540EM needs SLU even with auto-speed
    // detection.
    let ctrl = regs.read_u32(REG_CTRL);
    regs.write_u32(REG_CTRL, ctrl | CTRL_SLU | CTRL_ASDE);

    let mac = e1000_read_station_mac(&regs);

    let Some(tx) = build_tx_ring() else {
        klog_warn!("e1000: TX ring allocation failed");
        DEVICE_CLAIMED.reset();
        return -1;
    };
    let Some(rx) = build_rx_ring() else {
        klog_warn!("e1000: RX ring allocation failed");
        DEVICE_CLAIMED.reset();
        return -1;
    };

    // Descriptor contents must be globally visible before the base/tail
    // registers hand them to the NIC.
    fence(Ordering::Release);

    e1000_program_tx_ring(&regs, tx.desc_phys);
    e1000_program_rx_ring(&regs, rx.desc_phys);

    {
        let mut state = E1000_STATE.lock();
        state.regs = regs;
        state.mac = mac;
        state.irq_line = info.irq_line;
        state.tx = tx;
        state.rx = rx;
        state.ready = true;
    }

    if info.irq_line < irq::IRQ_LINES as u8 {
        let rc = irq::register_handler(
            info.irq_line,
            Some(e1000_irq_handler),
            ptr::null_mut(),
            b"e1000\0".as_ptr() as *const c_char,
        );
        if rc != 0 {
            klog_warn!("e1000: IRQ {} registration failed ({})", info.irq_line, rc);
        }
    } else {
        klog_warn!("e1000: bogus IRQ line {}, running polled", info.irq_line);
    }

    // Unmask the causes the driver cares about only after the handler is in
    // place.
    let state = E1000_STATE.lock();
    state.regs.write_u32(REG_IMS, E1000Intr::DRIVER_MASK.bits());
    drop(state);

    klog_info!(
        "e1000: ready, mac={:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x} irq={} tx={} rx={}",
        mac[0],
        mac[1],
        mac[2],
        mac[3],
        mac[4],
        mac[5],
        info.irq_line,
        N_TX_DESC,
        N_RX_DESC
    );

    0
}

static E1000_DRIVER: PciDriver = PciDriver {
    name: b"e1000\0".as_ptr(),
    match_fn: Some(e1000_match),
    probe: Some(e1000_probe),
    context: ptr::null_mut(),
};

pub fn e1000_register_driver() {
    if pci_register_driver(&E1000_DRIVER) != 0 {
        klog_warn!("e1000: driver registration failed");
    }
}

/// Locate and bring up the NIC. Absence is informational, not an error for
/// the caller: the rest of the API degrades gracefully.
pub fn e1000_init() -> c_int {
    if e1000_is_ready() {
        return 0;
    }

    e1000_register_driver();

    let Some(info) = pci_find_device(PCI_VENDOR_ID_INTEL, PCI_DEVICE_ID_82540EM) else {
        klog_info!("e1000: no 82540EM on the bus, subsystem disabled");
        return -1;
    };

    e1000_probe(&info, ptr::null_mut())
}

// =============================================================================
// Public API
// =============================================================================

pub fn e1000_is_ready() -> bool {
    E1000_STATE.lock().ready
}

pub fn e1000_mac() -> Option<[u8; 6]> {
    let state = E1000_STATE.lock();
    if state.ready { Some(state.mac) } else { None }
}

/// Copy the station MAC into a caller buffer of at least 6 bytes.
pub fn e1000_read_mac(out: *mut u8) -> c_int {
    if out.is_null() {
        return -1;
    }
    let state = E1000_STATE.lock();
    if !state.ready {
        return -1;
    }
    unsafe { ptr::copy_nonoverlapping(state.mac.as_ptr(), out, 6) };
    0
}

/// Link state straight from the STATUS register.
pub fn e1000_link_up() -> bool {
    let state = E1000_STATE.lock();
    state.ready && (state.regs.read_u32(REG_STATUS) & STATUS_LU) != 0
}

/// Release TX descriptors the hardware has written back.
fn reap_tx_completions(tx: &mut TxRing) {
    while tx.in_flight > 0 {
        let status = unsafe { ptr::read_volatile(&raw const (*tx.desc_ptr(tx.head)).status) };
        if status & DESC_STATUS_DD == 0 {
            break;
        }
        fence(Ordering::Acquire);
        tx.head = (tx.head + 1) % N_TX_DESC;
        tx.in_flight -= 1;
    }
}

/// Queue one frame for transmission.
///
/// Returns [`E1000_TX_OK`] once the frame is copied and the tail register
/// bumped; the caller's buffer is not referenced afterwards.
/// [`E1000_TX_BUSY`] means all descriptors are in flight; the caller may
/// retry or drop. Never blocks.
pub fn e1000_transmit(data: *const u8, len: usize) -> c_int {
    if data.is_null() || len == 0 || len > MAX_FRAME_SIZE {
        return E1000_TX_ERROR;
    }

    let mut state = E1000_STATE.lock();
    if !state.ready {
        return E1000_TX_ERROR;
    }

    reap_tx_completions(&mut state.tx);
    if state.tx.in_flight == N_TX_DESC {
        return E1000_TX_BUSY;
    }

    let idx = state.tx.tail;
    unsafe { ptr::copy_nonoverlapping(data, state.tx.buf_virt[idx] as *mut u8, len) };

    let desc = E1000TxDesc {
        buffer_addr: state.tx.buf_phys[idx],
        length: len as u16,
        cso: 0,
        cmd: TX_CMD_EOP | TX_CMD_IFCS | TX_CMD_RS,
        status: 0,
        css: 0,
        special: 0,
    };
    unsafe { ptr::write_volatile(state.tx.desc_ptr(idx), desc) };

    // The descriptor write must be visible before the doorbell.
    fence(Ordering::Release);

    state.tx.tail = (idx + 1) % N_TX_DESC;
    state.tx.in_flight += 1;
    let tail = state.tx.tail as u32;
    state.regs.write_u32(REG_TDT, tail);

    E1000_TX_OK
}

/// Copy the next completed RX frame into `out` (which must hold at least
/// [`PACKET_BUFFER_SIZE`] bytes). Returns the frame length, or 0 when no
/// frame is pending.
pub fn e1000_receive(out: *mut u8) -> c_int {
    if out.is_null() {
        return 0;
    }

    let mut state = E1000_STATE.lock();
    if !state.ready {
        return 0;
    }

    let idx = state.rx.head;
    let desc_ptr = state.rx.desc_ptr(idx);

    let status = unsafe { ptr::read_volatile(&raw const (*desc_ptr).status) };
    if status & DESC_STATUS_DD == 0 {
        return 0;
    }
    // The length and payload writes precede the DD writeback.
    fence(Ordering::Acquire);

    let length = unsafe { ptr::read_volatile(&raw const (*desc_ptr).length) } as usize;
    let length = length.min(PACKET_BUFFER_SIZE);

    unsafe {
        ptr::copy_nonoverlapping(state.rx.buf_virt[idx] as *const u8, out, length);
        ptr::write_volatile(&raw mut (*desc_ptr).status, 0);
    }
    fence(Ordering::Release);

    // Return the slot to hardware: the new RDT is exactly the slot just
    // drained, one behind the new software head.
    state.rx.head = (idx + 1) % N_RX_DESC;
    state.regs.write_u32(REG_RDT, idx as u32);

    length as c_int
}

/// Interrupt and event counters: (irqs, rx, rx_overruns, tx_writebacks,
/// link_changes).
pub fn e1000_irq_stats() -> (u64, u64, u64, u64, u64) {
    (
        IRQ_COUNT.load(Ordering::Relaxed),
        RX_EVENTS.load(Ordering::Relaxed),
        RX_OVERRUNS.load(Ordering::Relaxed),
        TX_WRITEBACKS.load(Ordering::Relaxed),
        LINK_CHANGES.load(Ordering::Relaxed),
    )
}

// =============================================================================
// Test support
// =============================================================================

/// Stand the driver up over a caller-supplied register window.
///
/// Rings come through the normal page hooks (a fixture arena in suites), so
/// transmit/receive run the real ring code against plain memory. The caller
/// must tear down with [`e1000_fixture_remove`] before other suites observe
/// the device, and must not call this when real hardware has been probed.
pub(crate) fn e1000_fixture_install(regs: MmioRegion) -> c_int {
    let Some(tx) = build_tx_ring() else {
        return -1;
    };
    let Some(rx) = build_rx_ring() else {
        return -1;
    };

    fence(Ordering::Release);
    e1000_program_tx_ring(&regs, tx.desc_phys);
    e1000_program_rx_ring(&regs, rx.desc_phys);

    let mac = e1000_read_station_mac(&regs);

    let mut state = E1000_STATE.lock();
    state.regs = regs;
    state.mac = mac;
    state.irq_line = 0;
    state.tx = tx;
    state.rx = rx;
    state.ready = true;
    0
}

/// Drop the fixture device. Ring pages stay with the arena; a kernel that
/// never shuts its NIC down leaks them the same way.
pub(crate) fn e1000_fixture_remove() {
    let mut state = E1000_STATE.lock();
    *state = E1000State::new();
}

/// Volatile snapshot of one TX descriptor.
pub(crate) fn e1000_tx_desc_snapshot(idx: usize) -> Option<E1000TxDesc> {
    let state = E1000_STATE.lock();
    if !state.ready || idx >= N_TX_DESC {
        return None;
    }
    Some(unsafe { ptr::read_volatile(state.tx.desc_ptr(idx)) })
}

/// Complete one RX frame the way hardware does: payload into the head
/// slot's buffer, then length and DD|EOP published behind a release fence.
pub(crate) fn e1000_rx_inject_frame(data: &[u8]) -> c_int {
    if data.is_empty() || data.len() > PACKET_BUFFER_SIZE {
        return -1;
    }
    let state = E1000_STATE.lock();
    if !state.ready {
        return -1;
    }

    let idx = state.rx.head;
    let desc_ptr = state.rx.desc_ptr(idx);
    unsafe {
        ptr::copy_nonoverlapping(data.as_ptr(), state.rx.buf_virt[idx] as *mut u8, data.len());
        ptr::write_volatile(&raw mut (*desc_ptr).length, data.len() as u16);
        ptr::write_volatile(&raw mut (*desc_ptr).errors, 0);
    }
    fence(Ordering::Release);
    unsafe {
        ptr::write_volatile(&raw mut (*desc_ptr).status, DESC_STATUS_DD | RX_STATUS_EOP);
    }
    0
}
