//! Legacy 8259A PIC pair (master/slave cascade).
//!
//! The IRQ framework in `vexos-core` talks to this driver only through the
//! platform service table, so the remap offsets and spurious-interrupt rules
//! stay contained here.
//!
//! Lines 0..7 live on the master (data port 0x21), 8..15 on the slave (data
//! port 0xA1) behind the IRQ2 cascade. Masking is a bit set in the data
//! port's Interrupt Mask Register; bit set = line suppressed.

use core::sync::atomic::{AtomicU64, Ordering};

use vexos_lib::arch::IRQ_BASE_VECTOR;
use vexos_lib::io::io_wait;
use vexos_lib::klog_debug;
use vexos_lib::ports::{PIC1_COMMAND, PIC1_DATA, PIC2_COMMAND, PIC2_DATA};

const PIC_EOI: u8 = 0x20;

/// ICW1: edge-triggered, cascade mode, ICW4 follows.
const ICW1_INIT: u8 = 0x11;
/// ICW3 (master): slave attached on IRQ2.
const ICW3_MASTER_CASCADE: u8 = 0x04;
/// ICW3 (slave): cascade identity 2.
const ICW3_SLAVE_IDENTITY: u8 = 0x02;
/// ICW4: 8086/88 mode.
const ICW4_8086: u8 = 0x01;

/// OCW3: next read of the command port returns the In-Service Register.
const OCW3_READ_ISR: u8 = 0x0B;

/// Cascade input on the master; must stay unmasked while any slave line is
/// in use.
const CASCADE_IRQ: u8 = 2;

pub const PIC_SPURIOUS_MASTER: u8 = 7;
pub const PIC_SPURIOUS_SLAVE: u8 = 15;

static SPURIOUS_MASTER_COUNT: AtomicU64 = AtomicU64::new(0);
static SPURIOUS_SLAVE_COUNT: AtomicU64 = AtomicU64::new(0);

/// Remap both controllers so IRQs 0..15 raise CPU vectors 32..47, then mask
/// every line.
///
/// The power-on mapping overlays CPU exception vectors 8..15; remapping must
/// happen before `sti`. Lines are unmasked individually as handlers register.
pub fn pic_init() {
    unsafe {
        PIC1_COMMAND.write(ICW1_INIT);
        io_wait();
        PIC2_COMMAND.write(ICW1_INIT);
        io_wait();

        PIC1_DATA.write(IRQ_BASE_VECTOR);
        io_wait();
        PIC2_DATA.write(IRQ_BASE_VECTOR + 8);
        io_wait();

        PIC1_DATA.write(ICW3_MASTER_CASCADE);
        io_wait();
        PIC2_DATA.write(ICW3_SLAVE_IDENTITY);
        io_wait();

        PIC1_DATA.write(ICW4_8086);
        io_wait();
        PIC2_DATA.write(ICW4_8086);
        io_wait();

        PIC1_DATA.write(0xFF);
        PIC2_DATA.write(0xFF);
    }

    klog_debug!(
        "PIC: remapped to vectors {}..{}, all lines masked",
        IRQ_BASE_VECTOR,
        IRQ_BASE_VECTOR + 15
    );
}

/// IMR routing for one line: which controller (true = slave) and which bit
/// of that controller's mask register.
pub(crate) fn pic_line_bit(irq: u8) -> (bool, u8) {
    if irq < 8 {
        (false, 1 << irq)
    } else {
        (true, 1 << (irq - 8))
    }
}

/// Set the mask bit for one line (suppress it).
pub fn pic_mask_line(irq: u8) -> i32 {
    if irq >= 16 {
        return -1;
    }
    let (slave, bit) = pic_line_bit(irq);
    unsafe {
        if slave {
            let mask = PIC2_DATA.read() | bit;
            PIC2_DATA.write(mask);
        } else {
            let mask = PIC1_DATA.read() | bit;
            PIC1_DATA.write(mask);
        }
    }
    0
}

/// Clear the mask bit for one line.
///
/// Unmasking a slave line also clears the master's cascade bit, otherwise
/// the slave's requests never reach the CPU.
pub fn pic_unmask_line(irq: u8) -> i32 {
    if irq >= 16 {
        return -1;
    }
    let (slave, bit) = pic_line_bit(irq);
    unsafe {
        if slave {
            let mask = PIC2_DATA.read() & !bit;
            PIC2_DATA.write(mask);
            let master = PIC1_DATA.read() & !(1 << CASCADE_IRQ);
            PIC1_DATA.write(master);
        } else {
            let mask = PIC1_DATA.read() & !bit;
            PIC1_DATA.write(mask);
        }
    }
    0
}

/// Acknowledge completion of one interrupt.
///
/// Slave lines need an EOI at both controllers; the slave's request travels
/// through the master's IRQ2.
pub fn pic_send_eoi(irq: u8) {
    unsafe {
        if irq >= 8 {
            PIC2_COMMAND.write(PIC_EOI);
        }
        PIC1_COMMAND.write(PIC_EOI);
    }
}

fn pic_read_isr_master() -> u8 {
    unsafe {
        PIC1_COMMAND.write(OCW3_READ_ISR);
        PIC1_COMMAND.read()
    }
}

fn pic_read_isr_slave() -> u8 {
    unsafe {
        PIC2_COMMAND.write(OCW3_READ_ISR);
        PIC2_COMMAND.read()
    }
}

/// Detect (and fully acknowledge) a spurious IRQ7/IRQ15.
///
/// An 8259 that loses its request line between raise and acknowledge
/// delivers its lowest-priority vector with nothing in the In-Service
/// Register. Such an interrupt must not receive the normal EOI sequence:
/// for a spurious IRQ7, no EOI at all; for a spurious IRQ15, only the
/// master is acknowledged because its cascade bit IS in service.
///
/// Returns `true` if the interrupt was spurious and has been dealt with
/// here; the caller must then skip dispatch and the usual EOI.
pub fn pic_is_spurious(irq: u8) -> bool {
    match irq {
        PIC_SPURIOUS_MASTER => {
            if pic_read_isr_master() & 0x80 != 0 {
                return false;
            }
            SPURIOUS_MASTER_COUNT.fetch_add(1, Ordering::Relaxed);
            true
        }
        PIC_SPURIOUS_SLAVE => {
            if pic_read_isr_slave() & 0x80 != 0 {
                return false;
            }
            SPURIOUS_SLAVE_COUNT.fetch_add(1, Ordering::Relaxed);
            unsafe { PIC1_COMMAND.write(PIC_EOI) };
            true
        }
        _ => false,
    }
}

/// Spurious interrupts observed since boot, (master, slave).
pub fn pic_spurious_counts() -> (u64, u64) {
    (
        SPURIOUS_MASTER_COUNT.load(Ordering::Relaxed),
        SPURIOUS_SLAVE_COUNT.load(Ordering::Relaxed),
    )
}

/// Mask everything and flush any in-service state. Used when handing the
/// machine to a panic path.
pub fn pic_quiesce_disable() {
    unsafe {
        PIC1_DATA.write(0xFF);
        PIC2_DATA.write(0xFF);
        PIC1_COMMAND.write(PIC_EOI);
        PIC2_COMMAND.write(PIC_EOI);
    }
}
