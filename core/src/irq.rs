//! IRQ dispatch framework.
//!
//! This module owns the per-line handler chains and the dispatch logic.
//! Hardware-specific handlers live in `drivers`, but the framework lives here
//! in `core` to maintain the one-way dependency: drivers -> core.
//!
//! Platform-specific operations (EOI, masking, spurious detection) are called
//! via the platform service table registered at boot time.
//!
//! Lines can be shared: up to [`IRQ_MAX_SHARED`] handlers per line, invoked
//! in registration order until one returns `true` to claim the interrupt.

use core::cell::UnsafeCell;
use core::ffi::{c_char, c_void};
use core::sync::atomic::{AtomicU64, Ordering};

use vexos_lib::arch::idt::IRQ_BASE_VECTOR;
use vexos_lib::string::cstr_to_str;
use vexos_lib::{InitFlag, IrqMutex};
use vexos_lib::{InterruptFrame, kdiag_dump_interrupt_frame, klog_debug, klog_info, tsc};

use crate::platform;

/// Maximum number of IRQ lines supported.
pub const IRQ_LINES: usize = 16;

/// Maximum handlers sharing one line.
pub const IRQ_MAX_SHARED: usize = 8;

/// Legacy IRQ numbers.
pub const LEGACY_IRQ_TIMER: u8 = 0;
pub const LEGACY_IRQ_CASCADE: u8 = 2;
pub const LEGACY_IRQ_COM1: u8 = 4;
pub const LEGACY_IRQ_SPURIOUS_MASTER: u8 = 7;
pub const LEGACY_IRQ_SPURIOUS_SLAVE: u8 = 15;

/// IRQ handler function signature.
///
/// Returns `true` if the handler claimed the interrupt; on a shared line the
/// chain stops at the first claimant.
pub type IrqHandler = extern "C" fn(u8, *mut InterruptFrame, *mut c_void) -> bool;

/// One registered handler on a line.
#[derive(Clone, Copy)]
struct IrqAction {
    handler: Option<IrqHandler>,
    context: *mut c_void,
    name: *const c_char,
}

impl IrqAction {
    const fn empty() -> Self {
        Self {
            handler: None,
            context: core::ptr::null_mut(),
            name: core::ptr::null(),
        }
    }
}

/// Entry in the IRQ table.
#[derive(Clone, Copy)]
pub struct IrqEntry {
    actions: [IrqAction; IRQ_MAX_SHARED],
    count: u64,
    unclaimed: u64,
    last_timestamp: u64,
    masked: bool,
    reported_unhandled: bool,
}

impl IrqEntry {
    pub const fn new() -> Self {
        Self {
            actions: [IrqAction::empty(); IRQ_MAX_SHARED],
            count: 0,
            unclaimed: 0,
            last_timestamp: 0,
            masked: true,
            reported_unhandled: false,
        }
    }

    fn handler_count(&self) -> usize {
        self.actions.iter().filter(|a| a.handler.is_some()).count()
    }
}

struct IrqTable {
    entries: UnsafeCell<[IrqEntry; IRQ_LINES]>,
}

unsafe impl Sync for IrqTable {}

impl IrqTable {
    const fn new() -> Self {
        Self {
            entries: UnsafeCell::new([IrqEntry::new(); IRQ_LINES]),
        }
    }

    fn entries_mut(&self) -> *mut [IrqEntry; IRQ_LINES] {
        self.entries.get()
    }
}

static IRQ_TABLE: IrqTable = IrqTable::new();
static IRQ_SYSTEM_INIT: InitFlag = InitFlag::new();
static IRQ_TABLE_LOCK: IrqMutex<()> = IrqMutex::new(());

/// Global timer tick counter. Incremented atomically by the timer IRQ handler.
/// Uses Relaxed ordering since we only need eventual consistency.
static TIMER_TICK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Spurious interrupts swallowed without dispatch (PIC IRQ 7/15 ghosts).
static SPURIOUS_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Access the IRQ table under lock.
#[inline]
fn with_irq_table<R>(f: impl FnOnce(&mut [IrqEntry; IRQ_LINES]) -> R) -> R {
    let _guard = IRQ_TABLE_LOCK.lock();
    unsafe { f(&mut *IRQ_TABLE.entries_mut()) }
}

/// Send EOI to acknowledge interrupt.
#[inline]
fn acknowledge_irq(irq: u8) {
    platform::irq_send_eoi(irq);
}

/// Mask an IRQ line at the interrupt controller.
pub fn mask_irq_line(irq: u8) {
    if irq as usize >= IRQ_LINES {
        return;
    }
    let should_mask = with_irq_table(|table| {
        if table[irq as usize].masked {
            return false;
        }
        table[irq as usize].masked = true;
        true
    });
    if should_mask {
        platform::irq_mask_line(irq);
    }
}

/// Unmask an IRQ line at the interrupt controller.
pub fn unmask_irq_line(irq: u8) {
    if irq as usize >= IRQ_LINES {
        return;
    }
    let should_unmask = with_irq_table(|table| {
        if !table[irq as usize].masked {
            return false;
        }
        table[irq as usize].masked = false;
        true
    });
    if should_unmask {
        platform::irq_unmask_line(irq);
    }
}

/// Log an unhandled IRQ (only once per line).
fn log_unhandled_irq(irq: u8, vector: u8) {
    if irq as usize >= IRQ_LINES {
        klog_info!("IRQ: Stray vector {} received", vector);
        return;
    }

    let already_reported = with_irq_table(|table| {
        let entry = &mut table[irq as usize];
        entry.unclaimed = entry.unclaimed.wrapping_add(1);
        if entry.reported_unhandled {
            true
        } else {
            entry.reported_unhandled = true;
            false
        }
    });
    if already_reported {
        return;
    }
    klog_info!(
        "IRQ: Unhandled IRQ {} (vector {}) - masking line",
        irq,
        vector
    );
}

#[inline]
pub fn get_timer_ticks() -> u64 {
    TIMER_TICK_COUNTER.load(Ordering::Relaxed)
}

#[inline]
pub fn increment_timer_ticks() {
    TIMER_TICK_COUNTER.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn get_spurious_count() -> u64 {
    SPURIOUS_COUNTER.load(Ordering::Relaxed)
}

/// Initialize the IRQ framework (call early, before handler registration).
pub fn init() {
    with_irq_table(|table| {
        for entry in table.iter_mut() {
            *entry = IrqEntry::new();
        }
    });
    TIMER_TICK_COUNTER.store(0, Ordering::Relaxed);
    SPURIOUS_COUNTER.store(0, Ordering::Relaxed);
    IRQ_SYSTEM_INIT.mark_set();
    klog_debug!("IRQ: Framework initialized");
}

/// Check if IRQ system is initialized.
pub fn is_initialized() -> bool {
    IRQ_SYSTEM_INIT.is_set_relaxed()
}

/// Check if an IRQ line is masked.
pub fn is_masked(irq: u8) -> bool {
    if irq as usize >= IRQ_LINES {
        return true;
    }
    with_irq_table(|table| table[irq as usize].masked)
}

/// Register an IRQ handler, appending to the line's chain.
///
/// The line is unmasked once it has at least one handler. Returns `-1` for an
/// invalid line or null handler, `-2` if the chain is full.
pub fn register_handler(
    irq: u8,
    handler: Option<IrqHandler>,
    context: *mut c_void,
    name: *const c_char,
) -> i32 {
    if irq as usize >= IRQ_LINES {
        klog_info!("IRQ: Attempted to register handler for invalid line");
        return -1;
    }
    if handler.is_none() {
        klog_info!("IRQ: Refusing null handler for line {}", irq);
        return -1;
    }

    let slot = with_irq_table(|table| {
        let entry = &mut table[irq as usize];
        let Some(slot) = entry.actions.iter().position(|a| a.handler.is_none()) else {
            return None;
        };
        entry.actions[slot] = IrqAction {
            handler,
            context,
            name,
        };
        entry.reported_unhandled = false;
        Some(slot)
    });

    let Some(slot) = slot else {
        klog_info!(
            "IRQ: Handler chain full on line {} ({} max)",
            irq,
            IRQ_MAX_SHARED
        );
        return -2;
    };

    if !name.is_null() {
        klog_debug!(
            "IRQ: Registered handler for line {} slot {} ({})",
            irq,
            slot,
            unsafe { cstr_to_str(name) }
        );
    } else {
        klog_debug!("IRQ: Registered handler for line {} slot {}", irq, slot);
    }

    unmask_irq_line(irq);
    0
}

/// Unregister a handler from a line's chain by callback identity.
///
/// Only the first entry whose handler fn-pointer matches is removed;
/// a handler registered twice needs two unregister calls. The line is
/// masked again when its chain empties.
pub fn unregister_handler(irq: u8, handler: IrqHandler) {
    if irq as usize >= IRQ_LINES {
        return;
    }
    let remaining = with_irq_table(|table| {
        let entry = &mut table[irq as usize];
        let found = entry.actions.iter_mut().find(|action| {
            matches!(action.handler, Some(h) if core::ptr::fn_addr_eq(h, handler))
        });
        if let Some(action) = found {
            *action = IrqAction::empty();
        }
        entry.reported_unhandled = false;
        entry.handler_count()
    });
    if remaining == 0 {
        mask_irq_line(irq);
    }
    klog_debug!(
        "IRQ: Unregistered handler for line {} ({} remain)",
        irq,
        remaining
    );
}

/// Enable an IRQ line.
pub fn enable_line(irq: u8) {
    if irq as usize >= IRQ_LINES {
        return;
    }
    with_irq_table(|table| {
        table[irq as usize].reported_unhandled = false;
    });
    unmask_irq_line(irq);
}

/// Disable an IRQ line.
pub fn disable_line(irq: u8) {
    if irq as usize >= IRQ_LINES {
        return;
    }
    mask_irq_line(irq);
}

/// Main IRQ dispatch function - called from the IDT handler.
pub fn irq_dispatch(frame: *mut InterruptFrame) {
    if frame.is_null() {
        klog_info!("IRQ: Received null frame");
        return;
    }

    let frame_ref = unsafe { &mut *frame };
    let vector = (frame_ref.vector & 0xFF) as u8;
    let expected_cs = frame_ref.cs;
    let expected_rip = frame_ref.rip;

    if !IRQ_SYSTEM_INIT.is_set_relaxed() {
        klog_info!("IRQ: Dispatch received before initialization");
        if vector >= IRQ_BASE_VECTOR {
            acknowledge_irq(vector - IRQ_BASE_VECTOR);
        }
        return;
    }

    if vector < IRQ_BASE_VECTOR {
        klog_info!("IRQ: Received non-IRQ vector {}", vector);
        return;
    }

    let irq = vector - IRQ_BASE_VECTOR;
    if irq as usize >= IRQ_LINES {
        log_unhandled_irq(0xFF, vector);
        acknowledge_irq(irq);
        return;
    }

    // Ghost interrupts on the spurious lines never reach handlers and must
    // not get the normal EOI; the interrupt controller driver applies its
    // own acknowledgement rules inside irq_is_spurious.
    if (irq == LEGACY_IRQ_SPURIOUS_MASTER || irq == LEGACY_IRQ_SPURIOUS_SLAVE)
        && platform::irq_is_spurious(irq)
    {
        SPURIOUS_COUNTER.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let actions = with_irq_table(|table| {
        let entry = &mut table[irq as usize];
        entry.count = entry.count.wrapping_add(1);
        entry.last_timestamp = tsc::rdtsc();
        entry.actions
    });

    let mut any_handler = false;
    let mut claimed = false;
    for action in actions.iter() {
        let Some(handler) = action.handler else {
            continue;
        };
        any_handler = true;
        if handler(irq, frame, action.context) {
            claimed = true;
            break;
        }
    }

    if frame_ref.cs != expected_cs || frame_ref.rip != expected_rip {
        klog_info!("IRQ: Frame corruption detected on IRQ {} - aborting", irq);
        kdiag_dump_interrupt_frame(frame);
        panic!("IRQ: frame corrupted");
    }

    if !any_handler {
        log_unhandled_irq(irq, vector);
        mask_irq_line(irq);
    } else if !claimed {
        with_irq_table(|table| {
            table[irq as usize].unclaimed = table[irq as usize].unclaimed.wrapping_add(1);
        });
    }

    acknowledge_irq(irq);
}

/// IRQ statistics structure.
#[repr(C)]
pub struct IrqStats {
    pub count: u64,
    pub unclaimed: u64,
    pub last_timestamp: u64,
    pub handlers: u32,
}

/// Get IRQ statistics for a line.
pub fn get_stats(irq: u8, out_stats: *mut IrqStats) -> i32 {
    if irq as usize >= IRQ_LINES || out_stats.is_null() {
        return -1;
    }
    with_irq_table(|table| unsafe {
        let entry = &table[irq as usize];
        (*out_stats).count = entry.count;
        (*out_stats).unclaimed = entry.unclaimed;
        (*out_stats).last_timestamp = entry.last_timestamp;
        (*out_stats).handlers = entry.handler_count() as u32;
    });
    0
}
