//! Intel 8254 programmable interval timer.
//!
//! Channel 0 is programmed as a rate generator on IRQ0 and drives the
//! kernel tick counter. The raw down-counter doubles as a polled delay
//! source for paths that cannot take interrupts (early boot, inside the
//! IRQ dispatcher).

use core::ffi::{c_char, c_void};
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};

use vexos_core::irq::{self, LEGACY_IRQ_TIMER};
use vexos_lib::ports::{
    PIT_BASE_FREQUENCY_HZ, PIT_CHANNEL0, PIT_COMMAND, PIT_COMMAND_ACCESS_LOHI,
    PIT_COMMAND_BINARY, PIT_COMMAND_CHANNEL0, PIT_COMMAND_MODE_SQUARE,
};
use vexos_lib::{InitFlag, InterruptFrame, klog_info};

/// Hardware reload value before any programming (counter wraps at 0x10000).
const DEFAULT_RELOAD: u32 = 0x10000;

static PIT_INIT: InitFlag = InitFlag::new();

/// Programmed tick frequency; zero until `pit_init` runs.
static TICK_FREQUENCY_HZ: AtomicU32 = AtomicU32::new(0);

/// Reload value currently programmed into channel 0.
static RELOAD_VALUE: AtomicU32 = AtomicU32::new(DEFAULT_RELOAD);

extern "C" fn pit_tick_handler(_irq: u8, _frame: *mut InterruptFrame, _ctx: *mut c_void) -> bool {
    irq::increment_timer_ticks();
    true
}

/// Compute the channel 0 reload value for a requested tick rate.
///
/// The result saturates to the 16-bit counter range; a reload of 1 is the
/// fastest the hardware can run (~1.19 MHz), 0x10000 the slowest (~18.2 Hz).
pub(crate) fn pit_reload_for_frequency(frequency_hz: u32) -> u32 {
    if frequency_hz == 0 {
        return DEFAULT_RELOAD;
    }
    (PIT_BASE_FREQUENCY_HZ / frequency_hz).clamp(1, DEFAULT_RELOAD)
}

/// Program channel 0 as a square-wave rate generator at `frequency_hz` and
/// hook the kernel tick counter onto IRQ0. Idempotent.
pub fn pit_init(frequency_hz: u32) {
    if !PIT_INIT.init_once() {
        return;
    }

    let reload = pit_reload_for_frequency(frequency_hz);
    // Writing 0 programs the full 0x10000 reload.
    let reload_lo = (reload & 0xFF) as u8;
    let reload_hi = ((reload >> 8) & 0xFF) as u8;

    unsafe {
        PIT_COMMAND.write(
            PIT_COMMAND_CHANNEL0
                | PIT_COMMAND_ACCESS_LOHI
                | PIT_COMMAND_MODE_SQUARE
                | PIT_COMMAND_BINARY,
        );
        PIT_CHANNEL0.write(reload_lo);
        PIT_CHANNEL0.write(reload_hi);
    }

    RELOAD_VALUE.store(reload, Ordering::Relaxed);
    TICK_FREQUENCY_HZ.store(frequency_hz, Ordering::Relaxed);

    let rc = irq::register_handler(
        LEGACY_IRQ_TIMER,
        Some(pit_tick_handler),
        ptr::null_mut(),
        b"pit\0".as_ptr() as *const c_char,
    );
    if rc != 0 {
        klog_info!("PIT: tick handler registration failed ({})", rc);
        return;
    }

    klog_info!(
        "PIT: channel 0 at {} Hz (reload {})",
        frequency_hz,
        reload
    );
}

/// Programmed tick frequency in Hz, zero before `pit_init`.
pub fn pit_frequency() -> u32 {
    TICK_FREQUENCY_HZ.load(Ordering::Relaxed)
}

/// Latch and read the channel 0 down-counter.
///
/// Interrupts are briefly disabled to prevent a stale two-byte read.
fn pit_read_count() -> u16 {
    let flags = vexos_lib::cpu::save_flags_cli();
    let count = unsafe {
        PIT_COMMAND.write(0x00); // latch channel 0
        let low = PIT_CHANNEL0.read();
        let high = PIT_CHANNEL0.read();
        ((high as u16) << 8) | (low as u16)
    };
    vexos_lib::cpu::restore_flags(flags);
    count
}

/// Polled spin-wait for `ms` milliseconds on the raw hardware counter.
///
/// Works whether or not IRQ0 is routed: the down-counter runs from
/// power-on, and wraparound is accounted for against the programmed reload
/// value. This is the delay of last resort when the tick counter cannot
/// advance (interrupts disabled).
pub fn pit_poll_delay_ms(ms: u32) {
    if ms == 0 {
        return;
    }

    let reload = RELOAD_VALUE.load(Ordering::Relaxed);
    let ticks_needed = ((ms as u64) * (PIT_BASE_FREQUENCY_HZ as u64) / 1000) as u32;
    let mut last = pit_read_count();
    let mut elapsed: u32 = 0;

    while elapsed < ticks_needed {
        core::hint::spin_loop();

        let current = pit_read_count();
        if current <= last {
            elapsed = elapsed.saturating_add((last - current) as u32);
        } else {
            elapsed = elapsed.saturating_add(last as u32 + reload.saturating_sub(current as u32));
        }
        last = current;
    }
}
