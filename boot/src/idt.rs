//! IDT construction and exception dispatch.
//!
//! The gate table, the assembly entry stubs, and the common Rust dispatcher
//! all live here. Hardware IRQ vectors (32..48) are funnelled straight into
//! the `core` dispatch framework; CPU exceptions either reach a registered
//! handler or dump the frame and halt.

use core::arch::{asm, global_asm};
use core::cell::UnsafeCell;
use core::mem::size_of;
use core::sync::atomic::{AtomicUsize, Ordering};

use vexos_core::irq::irq_dispatch;
use vexos_lib::arch::idt::{
    EXCEPTION_BREAKPOINT, EXCEPTION_DOUBLE_FAULT, EXCEPTION_OVERFLOW, IDT_ENTRIES,
    IDT_GATE_INTERRUPT, IDT_GATE_TRAP, IRQ_BASE_VECTOR, IdtEntry, KERNEL_CODE_SELECTOR,
};
use vexos_lib::kdiag::exception_name;
use vexos_lib::{
    InitFlag, InterruptFrame, cpu, kdiag_dump_interrupt_frame, klog_debug, klog_info, klog_warn,
};

global_asm!(include_str!("../idt_stubs.s"));

/// IST slot used by the double-fault gate. The TSS owner populates the
/// stack behind this index before interrupts are enabled.
pub const DOUBLE_FAULT_IST_INDEX: u8 = 1;

#[repr(C, packed)]
struct IdtPtr {
    limit: u16,
    base: u64,
}

struct IdtTable(UnsafeCell<[IdtEntry; IDT_ENTRIES]>);

// SAFETY: gates are written during single-CPU bring-up and by the test
// suite, which the harness runs sequentially; the CPU only reads.
unsafe impl Sync for IdtTable {}

static IDT: IdtTable = IdtTable(UnsafeCell::new([IdtEntry::zero(); IDT_ENTRIES]));
static IDT_INIT: InitFlag = InitFlag::new();

/// Per-exception handler slots. A slot holds the handler `fn` as a plain
/// word so installs and reads stay atomic; 0 means unhandled.
static EXCEPTION_HANDLERS: [AtomicUsize; 32] = [const { AtomicUsize::new(0) }; 32];

/// Exception callback: receives the pushed error code and the faulting RIP.
pub type ExceptionHandler = fn(error_code: u64, rip: u64);

type Stub = unsafe extern "C" fn();

unsafe extern "C" {
    fn isr0();
    fn isr1();
    fn isr2();
    fn isr3();
    fn isr4();
    fn isr5();
    fn isr6();
    fn isr7();
    fn isr8();
    fn isr10();
    fn isr11();
    fn isr12();
    fn isr13();
    fn isr14();
    fn isr16();
    fn isr17();
    fn isr18();
    fn isr19();

    fn irq0();
    fn irq1();
    fn irq2();
    fn irq3();
    fn irq4();
    fn irq5();
    fn irq6();
    fn irq7();
    fn irq8();
    fn irq9();
    fn irq10();
    fn irq11();
    fn irq12();
    fn irq13();
    fn irq14();
    fn irq15();
}

/// Entry stubs per exception vector. `None` marks the vectors the CPU
/// reserves (9, 15, 20..=31); those gates stay not-present.
#[rustfmt::skip]
const EXCEPTION_STUBS: [Option<Stub>; 32] = [
    Some(isr0),  Some(isr1),  Some(isr2),  Some(isr3),
    Some(isr4),  Some(isr5),  Some(isr6),  Some(isr7),
    Some(isr8),  None,        Some(isr10), Some(isr11),
    Some(isr12), Some(isr13), Some(isr14), None,
    Some(isr16), Some(isr17), Some(isr18), Some(isr19),
    None, None, None, None, None, None, None, None,
    None, None, None, None,
];

#[rustfmt::skip]
const IRQ_STUBS: [Stub; 16] = [
    irq0, irq1, irq2,  irq3,  irq4,  irq5,  irq6,  irq7,
    irq8, irq9, irq10, irq11, irq12, irq13, irq14, irq15,
];

#[inline(always)]
fn handler_ptr(f: Stub) -> u64 {
    f as usize as u64
}

/// Install a gate. Public so later subsystems can claim vectors above the
/// legacy IRQ range.
pub fn idt_set_gate(vector: u8, handler: u64, selector: u16, type_attr: u8) {
    unsafe {
        (*IDT.0.get())[vector as usize] = IdtEntry::new(handler, selector, 0, type_attr);
    }
}

/// Point a gate at one of the seven IST stacks. Index 0 clears the
/// assignment.
pub fn idt_set_ist(vector: u8, ist_index: u8) {
    if ist_index > 7 {
        klog_warn!("IDT: invalid IST index {} for vector {}", ist_index, vector);
        return;
    }
    unsafe {
        (*IDT.0.get())[vector as usize].ist = ist_index;
    }
}

pub fn idt_get_gate(vector: u8) -> IdtEntry {
    unsafe { (*IDT.0.get())[vector as usize] }
}

/// The IDTR image that `idt_load` installs: (limit, base).
pub fn idt_pointer() -> (u16, u64) {
    (
        (size_of::<IdtEntry>() * IDT_ENTRIES - 1) as u16,
        IDT.0.get() as u64,
    )
}

/// Build the gate table. Idempotent: only the first caller does the work.
pub fn idt_init() {
    if !IDT_INIT.init_once() {
        klog_info!("IDT: already initialized");
        return;
    }

    unsafe {
        core::ptr::write_bytes(
            IDT.0.get() as *mut u8,
            0,
            size_of::<[IdtEntry; IDT_ENTRIES]>(),
        );
    }

    let mut installed = 0usize;
    for (vector, stub) in EXCEPTION_STUBS.iter().enumerate() {
        let Some(stub) = stub else {
            klog_warn!("IDT: no stub for exception vector {}, gate left absent", vector);
            continue;
        };
        let vector = vector as u8;
        // Breakpoint and overflow keep IF set so a debugger stays usable.
        let gate_type = if vector == EXCEPTION_BREAKPOINT || vector == EXCEPTION_OVERFLOW {
            IDT_GATE_TRAP
        } else {
            IDT_GATE_INTERRUPT
        };
        idt_set_gate(vector, handler_ptr(*stub), KERNEL_CODE_SELECTOR, gate_type);
        installed += 1;
    }

    // A double fault must not re-enter on a corrupted stack.
    idt_set_ist(EXCEPTION_DOUBLE_FAULT, DOUBLE_FAULT_IST_INDEX);

    for (line, stub) in IRQ_STUBS.iter().enumerate() {
        idt_set_gate(
            IRQ_BASE_VECTOR + line as u8,
            handler_ptr(*stub),
            KERNEL_CODE_SELECTOR,
            IDT_GATE_INTERRUPT,
        );
    }

    IDT_INIT.complete();
    klog_debug!(
        "IDT: {} exception gates and {} IRQ gates installed",
        installed,
        IRQ_STUBS.len()
    );
}

/// Load the IDTR. Split from `idt_init` so bring-up can build the table
/// before the CPU starts honouring it.
pub fn idt_load() {
    let (limit, base) = idt_pointer();
    let idtr = IdtPtr { limit, base };
    unsafe {
        asm!("lidt [{}]", in(reg) &idtr, options(nostack, preserves_flags));
    }
    klog_debug!("IDT: loaded base=0x{:x} limit=0x{:x}", base, limit);
}

/// Install an exception handler. One slot per vector; installing again
/// replaces the previous handler.
pub fn register_exception_handler(vector: u8, handler: ExceptionHandler) -> i32 {
    if vector as usize >= EXCEPTION_HANDLERS.len() {
        klog_info!(
            "IDT: refusing exception handler for non-exception vector {}",
            vector
        );
        return -1;
    }
    EXCEPTION_HANDLERS[vector as usize].store(handler as usize, Ordering::Release);
    0
}

/// Remove a vector's exception handler, restoring the dump-and-halt path.
pub fn clear_exception_handler(vector: u8) {
    if let Some(slot) = EXCEPTION_HANDLERS.get(vector as usize) {
        slot.store(0, Ordering::Release);
    }
}

pub fn exception_handler_registered(vector: u8) -> bool {
    EXCEPTION_HANDLERS
        .get(vector as usize)
        .is_some_and(|slot| slot.load(Ordering::Acquire) != 0)
}

fn exception_handler(vector: u8) -> Option<ExceptionHandler> {
    let raw = EXCEPTION_HANDLERS.get(vector as usize)?.load(Ordering::Acquire);
    if raw == 0 {
        return None;
    }
    // SAFETY: the slot only ever holds a value stored from an
    // `ExceptionHandler` by register_exception_handler.
    Some(unsafe { core::mem::transmute::<usize, ExceptionHandler>(raw) })
}

fn handle_exception(vector: u8, frame: *mut InterruptFrame) {
    let frame_ref = unsafe { &*frame };

    if let Some(handler) = exception_handler(vector) {
        handler(frame_ref.error_code, frame_ref.rip);
        return;
    }

    klog_info!(
        "EXCEPTION: vector {} ({}) err=0x{:x} rip=0x{:x}",
        vector,
        exception_name(vector),
        frame_ref.error_code,
        frame_ref.rip
    );
    kdiag_dump_interrupt_frame(frame);

    cpu::disable_interrupts();
    // No further device interrupts can be serviced once we commit to the
    // halt loop, so silence them at the controller as well.
    vexos_drivers::pic::pic_quiesce_disable();
    cpu::halt_loop();
}

/// Common landing point for every entry stub.
#[unsafe(no_mangle)]
extern "C" fn idt_common_dispatch(frame: *mut InterruptFrame) {
    if frame.is_null() {
        return;
    }
    let vector = (unsafe { &*frame }.vector & 0xFF) as u8;

    if vector >= IRQ_BASE_VECTOR {
        irq_dispatch(frame);
        return;
    }

    handle_exception(vector, frame);
}
