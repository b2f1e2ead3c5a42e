//! COM1 serial console.
//!
//! Owns the 16550 UART once boot is far enough along to take locks; before
//! that, klog writes raw bytes to COM1 itself. `init` flips klog over to
//! the locked path here.

use core::fmt::{self, Write};

use uart_16550::SerialPort;
use vexos_lib::IrqMutex;
use vexos_lib::klog::klog_register_backend;
use vexos_lib::ports::COM1;

static SERIAL: IrqMutex<SerialPort> = IrqMutex::new(unsafe { SerialPort::new(0x3F8) });

/// Initialise the UART (baud, FIFO, modem lines) and take over klog output.
pub fn init() {
    debug_assert_eq!(COM1.addr(), 0x3F8);

    let mut port = SERIAL.lock();
    port.init();
    drop(port);

    klog_register_backend(serial_klog_backend);
}

fn serial_klog_backend(args: fmt::Arguments<'_>) {
    let mut port = SERIAL.lock();
    let _ = port.write_fmt(args);
    let _ = port.write_str("\n");
}

pub fn write_str(s: &str) {
    let _ = SERIAL.lock().write_str(s);
}

pub fn write_line(s: &str) {
    let mut guard = SERIAL.lock();
    let _ = guard.write_str(s);
    let _ = guard.write_str("\n");
}

pub fn print_args(args: fmt::Arguments<'_>) {
    let _ = SERIAL.lock().write_fmt(args);
}
