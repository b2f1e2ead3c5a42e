//! PIC mask-bookkeeping tests. Everything here is pure; the ICW sequence
//! and EOI paths are exercised live by the boot tick-liveness probe.

use core::ffi::c_int;

use vexos_lib::klog_info;

use crate::pic::{pic_line_bit, pic_spurious_counts};

pub fn test_pic_line_routing() -> c_int {
    // Master lines map straight to their IMR bit.
    for irq in 0..8u8 {
        let (slave, bit) = pic_line_bit(irq);
        if slave || bit != 1 << irq {
            klog_info!("PIC_TEST: master line {} routed to ({}, {:#04x})", irq, slave, bit);
            return -1;
        }
    }
    // Slave lines rebase to bit 0 of the slave IMR.
    for irq in 8..16u8 {
        let (slave, bit) = pic_line_bit(irq);
        if !slave || bit != 1 << (irq - 8) {
            klog_info!("PIC_TEST: slave line {} routed to ({}, {:#04x})", irq, slave, bit);
            return -1;
        }
    }
    0
}

pub fn test_pic_mask_bit_disjoint() -> c_int {
    // Each line owns exactly one bit in its controller's mask register.
    let mut master_bits: u8 = 0;
    let mut slave_bits: u8 = 0;
    for irq in 0..16u8 {
        let (slave, bit) = pic_line_bit(irq);
        let seen = if slave { &mut slave_bits } else { &mut master_bits };
        if *seen & bit != 0 {
            klog_info!("PIC_TEST: line {} shares a mask bit", irq);
            return -1;
        }
        *seen |= bit;
    }
    if master_bits != 0xFF || slave_bits != 0xFF {
        klog_info!("PIC_TEST: mask bits do not cover both IMRs");
        return -1;
    }
    0
}

pub fn test_pic_spurious_counts_monotonic() -> c_int {
    let (m1, s1) = pic_spurious_counts();
    let (m2, s2) = pic_spurious_counts();
    if m2 < m1 || s2 < s1 {
        klog_info!("PIC_TEST: spurious counters went backwards");
        return -1;
    }
    0
}

vexos_lib::define_test_suite!(
    pic,
    [
        test_pic_line_routing,
        test_pic_mask_bit_disjoint,
        test_pic_spurious_counts_monotonic,
    ]
);
