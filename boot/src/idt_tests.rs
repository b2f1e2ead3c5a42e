//! IDT tests: IDTR image, gate packing, init idempotence, handler registry.

use core::ffi::c_int;

use vexos_lib::arch::idt::{
    EXCEPTION_BREAKPOINT, EXCEPTION_DOUBLE_FAULT, IDT_GATE_INTERRUPT, IDT_GATE_TRAP,
    IRQ_BASE_VECTOR, IdtEntry, KERNEL_CODE_SELECTOR,
};
use vexos_lib::{cpu, klog_info};

use crate::idt::{
    DOUBLE_FAULT_IST_INDEX, clear_exception_handler, exception_handler_registered, idt_get_gate,
    idt_init, idt_pointer, register_exception_handler,
};

const GATE_PRESENT: u8 = 0x80;

pub fn test_idt_pointer_image() -> c_int {
    idt_init();

    let (limit, base) = idt_pointer();
    if limit != 4095 {
        klog_info!("IDT_TEST: limit is {}, expected 4095", limit);
        return -1;
    }
    if base == 0 {
        klog_info!("IDT_TEST: IDT base is null");
        return -1;
    }
    0
}

pub fn test_idt_double_init() -> c_int {
    idt_init();
    let before = idt_get_gate(IRQ_BASE_VECTOR).handler_addr();

    // Second call must log and leave the table untouched.
    idt_init();
    let after = idt_get_gate(IRQ_BASE_VECTOR).handler_addr();

    if before == 0 || before != after {
        klog_info!("IDT_TEST: double init disturbed gate 32");
        return -1;
    }
    0
}

pub fn test_idt_gate_packing() -> c_int {
    // Round-trip a synthetic address through the split offset fields.
    let entry = IdtEntry::new(0x1122_3344_5566_7788, KERNEL_CODE_SELECTOR, 0, IDT_GATE_INTERRUPT);
    let low = entry.offset_low;
    let mid = entry.offset_mid;
    let high = entry.offset_high;
    if low != 0x7788 || mid != 0x5566 || high != 0x1122_3344 {
        klog_info!("IDT_TEST: offset split wrong");
        return -1;
    }
    if entry.handler_addr() != 0x1122_3344_5566_7788 {
        klog_info!("IDT_TEST: offset reassembly wrong");
        return -1;
    }

    // The installed IRQ0 gate: kernel code selector, present interrupt gate.
    let gate = idt_get_gate(IRQ_BASE_VECTOR);
    let selector = gate.selector;
    let type_attr = gate.type_attr;
    if selector != KERNEL_CODE_SELECTOR || type_attr != IDT_GATE_INTERRUPT {
        klog_info!(
            "IDT_TEST: IRQ0 gate selector=0x{:x} type=0x{:x}",
            selector,
            type_attr
        );
        return -1;
    }
    if gate.handler_addr() == 0 {
        klog_info!("IDT_TEST: IRQ0 gate has no handler");
        return -1;
    }
    0
}

pub fn test_idt_double_fault_ist() -> c_int {
    let gate = idt_get_gate(EXCEPTION_DOUBLE_FAULT);
    let ist = gate.ist;
    if ist != DOUBLE_FAULT_IST_INDEX {
        klog_info!("IDT_TEST: double fault IST is {}", ist);
        return -1;
    }
    0
}

pub fn test_idt_reserved_vectors_absent() -> c_int {
    for vector in [9u8, 15].iter().copied().chain(20..=31) {
        let gate = idt_get_gate(vector);
        let type_attr = gate.type_attr;
        if type_attr & GATE_PRESENT != 0 {
            klog_info!("IDT_TEST: reserved vector {} has a present gate", vector);
            return -1;
        }
    }
    0
}

pub fn test_idt_breakpoint_trap_gate() -> c_int {
    let gate = idt_get_gate(EXCEPTION_BREAKPOINT);
    let type_attr = gate.type_attr;
    if type_attr != IDT_GATE_TRAP {
        klog_info!("IDT_TEST: breakpoint gate type is 0x{:x}", type_attr);
        return -1;
    }
    0
}

fn noop_exception_handler(_error_code: u64, _rip: u64) {}

pub fn test_exception_handler_registry() -> c_int {
    if register_exception_handler(32, noop_exception_handler) == 0 {
        klog_info!("IDT_TEST: registry accepted a non-exception vector");
        return -1;
    }

    if register_exception_handler(EXCEPTION_BREAKPOINT, noop_exception_handler) != 0 {
        klog_info!("IDT_TEST: breakpoint handler registration failed");
        return -1;
    }
    if !exception_handler_registered(EXCEPTION_BREAKPOINT) {
        klog_info!("IDT_TEST: handler not visible after registration");
        return -1;
    }

    clear_exception_handler(EXCEPTION_BREAKPOINT);
    if exception_handler_registered(EXCEPTION_BREAKPOINT) {
        klog_info!("IDT_TEST: handler still visible after clear");
        return -1;
    }
    0
}

pub fn test_interrupt_flag_roundtrip() -> c_int {
    let flags = cpu::save_flags_cli();
    if cpu::are_interrupts_enabled() {
        klog_info!("IDT_TEST: IF still set after cli");
        cpu::restore_flags(flags);
        return -1;
    }
    cpu::restore_flags(flags);

    let was_enabled = flags & (1 << 9) != 0;
    if cpu::are_interrupts_enabled() != was_enabled {
        klog_info!("IDT_TEST: IF not restored to its saved state");
        return -1;
    }
    0
}

vexos_lib::define_test_suite!(
    idt,
    [
        test_idt_pointer_image,
        test_idt_double_init,
        test_idt_gate_packing,
        test_idt_double_fault_ist,
        test_idt_reserved_vectors_absent,
        test_idt_breakpoint_trap_gate,
        test_exception_handler_registry,
        test_interrupt_flag_roundtrip,
    ]
);
