use crate::io::Port;

pub const COM1: Port<u8> = Port::new(0x3F8);
pub const COM2: Port<u8> = Port::new(0x2F8);
pub const COM3: Port<u8> = Port::new(0x3E8);
pub const COM4: Port<u8> = Port::new(0x2E8);

pub const PIT_CHANNEL0: Port<u8> = Port::new(0x40);
pub const PIT_CHANNEL1: Port<u8> = Port::new(0x41);
pub const PIT_CHANNEL2: Port<u8> = Port::new(0x42);
pub const PIT_COMMAND: Port<u8> = Port::new(0x43);

pub const PCI_CONFIG_ADDRESS: Port<u32> = Port::new(0xCF8);
pub const PCI_CONFIG_DATA: Port<u32> = Port::new(0xCFC);

pub const PIC1_COMMAND: Port<u8> = Port::new(0x20);
pub const PIC1_DATA: Port<u8> = Port::new(0x21);
pub const PIC2_COMMAND: Port<u8> = Port::new(0xA0);
pub const PIC2_DATA: Port<u8> = Port::new(0xA1);

pub const IO_DELAY: Port<u8> = Port::new(0x80);

pub const UART_REG_RBR: u16 = 0;
pub const UART_REG_THR: u16 = 0;
pub const UART_REG_IER: u16 = 1;
pub const UART_REG_IIR: u16 = 2;
pub const UART_REG_FCR: u16 = 2;
pub const UART_REG_LCR: u16 = 3;
pub const UART_REG_MCR: u16 = 4;
pub const UART_REG_LSR: u16 = 5;
pub const UART_REG_MSR: u16 = 6;
pub const UART_REG_SCR: u16 = 7;

pub const UART_LCR_DLAB: u8 = 0x80;
pub const UART_FCR_ENABLE_FIFO: u8 = 0x01;
pub const UART_FCR_CLEAR_RX: u8 = 0x02;
pub const UART_FCR_CLEAR_TX: u8 = 0x04;
pub const UART_FCR_14_BYTE_THRESHOLD: u8 = 0xC0;
pub const UART_LSR_DATA_READY: u8 = 0x01;
pub const UART_LSR_TX_EMPTY: u8 = 0x20;
pub const UART_MCR_DTR: u8 = 0x01;
pub const UART_MCR_RTS: u8 = 0x02;
pub const UART_MCR_AUX2: u8 = 0x08;

pub const PIT_BASE_FREQUENCY_HZ: u32 = 1_193_182;
pub const PIT_DEFAULT_FREQUENCY_HZ: u32 = 1_000;
pub const PIT_COMMAND_CHANNEL0: u8 = 0x00;
pub const PIT_COMMAND_ACCESS_LOHI: u8 = 0x30;
pub const PIT_COMMAND_MODE_SQUARE: u8 = 0x06;
pub const PIT_COMMAND_BINARY: u8 = 0x00;
pub const PIT_IRQ_LINE: u8 = 0;

// ---------------------------------------------------------------------------
// Low-level serial I/O primitives
// ---------------------------------------------------------------------------
//
// These are the **single source of truth** for putting bytes on a UART.
// Every path that writes to a serial port (early-boot klog, the runtime
// klog backend, the `SerialPort` driver) must funnel through here.
//
// The functions are intentionally lock-free: callers are responsible for
// serialisation (cli/sti, spinlock, IrqMutex, … whatever suits the context).

/// Write one byte to a UART, polling the Line Status Register until the
/// transmit holding register is empty.
///
/// # Safety
///
/// Port I/O.  Caller must ensure `base` refers to a valid, initialised
/// 8250/16550-compatible UART and that concurrent access is serialised.
#[inline(always)]
pub unsafe fn serial_putc(base: Port<u8>, byte: u8) {
    let lsr = base.offset(UART_REG_LSR);
    let thr = base.offset(UART_REG_THR);
    unsafe {
        while (lsr.read() & UART_LSR_TX_EMPTY) == 0 {
            core::hint::spin_loop();
        }
        thr.write(byte);
    }
}

/// Write a byte slice to a UART, converting lone `\n` into `\r\n`.
///
/// # Safety
///
/// Same requirements as [`serial_putc`].
#[inline]
pub unsafe fn serial_write_bytes(base: Port<u8>, bytes: &[u8]) {
    for &b in bytes {
        if b == b'\n' {
            unsafe { serial_putc(base, b'\r') };
        }
        unsafe { serial_putc(base, b) };
    }
}
