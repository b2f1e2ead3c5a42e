//! Typed x86 port I/O.
//!
//! Device registers behind I/O ports are not memory: accesses must use the
//! `in`/`out` instruction family with the width the register documents.
//! [`Port<T>`] ties the access width to the value type so an 8-bit register
//! cannot accidentally be read with a 32-bit `in`.

use core::arch::asm;
use core::marker::PhantomData;

/// Values that can travel over an x86 I/O port.
///
/// Sealed by construction: only `u8`, `u16`, and `u32` have matching
/// instruction encodings.
pub trait PortValue: Copy {
    /// # Safety
    /// Port I/O; the caller must know the port is safe to read.
    unsafe fn port_read(port: u16) -> Self;

    /// # Safety
    /// Port I/O; the caller must know the port is safe to write.
    unsafe fn port_write(port: u16, value: Self);
}

impl PortValue for u8 {
    #[inline(always)]
    unsafe fn port_read(port: u16) -> u8 {
        let value: u8;
        asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        value
    }

    #[inline(always)]
    unsafe fn port_write(port: u16, value: u8) {
        asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
    }
}

impl PortValue for u16 {
    #[inline(always)]
    unsafe fn port_read(port: u16) -> u16 {
        let value: u16;
        asm!("in ax, dx", out("ax") value, in("dx") port, options(nomem, nostack, preserves_flags));
        value
    }

    #[inline(always)]
    unsafe fn port_write(port: u16, value: u16) {
        asm!("out dx, ax", in("dx") port, in("ax") value, options(nomem, nostack, preserves_flags));
    }
}

impl PortValue for u32 {
    #[inline(always)]
    unsafe fn port_read(port: u16) -> u32 {
        let value: u32;
        asm!("in eax, dx", out("eax") value, in("dx") port, options(nomem, nostack, preserves_flags));
        value
    }

    #[inline(always)]
    unsafe fn port_write(port: u16, value: u32) {
        asm!("out dx, eax", in("dx") port, in("eax") value, options(nomem, nostack, preserves_flags));
    }
}

/// A fixed-width I/O port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Port<T> {
    port: u16,
    _width: PhantomData<T>,
}

impl<T: PortValue> Port<T> {
    #[inline]
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            _width: PhantomData,
        }
    }

    /// Port at `self + off` (register banks addressed from a base port).
    #[inline]
    pub const fn offset(self, off: u16) -> Self {
        Self::new(self.port + off)
    }

    #[inline]
    pub const fn addr(self) -> u16 {
        self.port
    }

    /// # Safety
    /// Port I/O with device-defined side effects; caller serialises access.
    #[inline(always)]
    pub unsafe fn read(self) -> T {
        T::port_read(self.port)
    }

    /// # Safety
    /// Port I/O with device-defined side effects; caller serialises access.
    #[inline(always)]
    pub unsafe fn write(self, value: T) {
        T::port_write(self.port, value)
    }
}

/// One write to the POST diagnostic port, used as a short I/O delay between
/// PIC initialisation words on old hardware.
#[inline(always)]
pub fn io_wait() {
    unsafe { crate::ports::IO_DELAY.write(0u8) };
}
