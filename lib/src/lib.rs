#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod arch;
pub mod cpu;

pub mod io;
pub mod ports;

pub mod tsc {
    use core::arch::asm;

    #[inline(always)]
    pub fn rdtsc() -> u64 {
        let lo: u32;
        let hi: u32;
        unsafe {
            asm!(
                "rdtsc",
                out("eax") lo,
                out("edx") hi,
                options(nomem, nostack, preserves_flags)
            );
        }
        ((hi as u64) << 32) | (lo as u64)
    }
}

pub mod alignment;
pub mod init_flag;
pub mod service;
pub mod kdiag;
pub mod klog;
pub mod spinlock;
pub mod string;
pub mod testing;

#[doc(hidden)]
pub use paste;

pub use alignment::{align_down_u64, align_down_usize, align_up_u64, align_up_usize};
pub use kdiag::{InterruptFrame, kdiag_dump_interrupt_frame};
pub use klog::{KlogLevel, klog_get_level, klog_init, klog_register_backend, klog_set_level};
pub use ports::COM1;

pub use init_flag::InitFlag;
pub use spinlock::{IrqMutex, IrqMutexGuard};
