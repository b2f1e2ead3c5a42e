//! Tick-based kernel time.
//!
//! The timer driver bumps the tick counter from its IRQ handler; everything
//! here is derived arithmetic on that counter plus the platform-reported
//! tick frequency.

use vexos_lib::cpu;

use crate::irq::get_timer_ticks;
use crate::platform;

/// Wall-clock milliseconds since the timer started ticking.
#[inline]
pub fn get_uptime_ms() -> u64 {
    let freq = platform::timer_frequency();
    if freq == 0 {
        return 0;
    }
    (get_timer_ticks() * 1000) / freq as u64
}

/// Block for at least `ms` milliseconds.
///
/// Halts between ticks when interrupts are enabled. With interrupts off the
/// tick counter cannot advance, so this falls back to the platform's polled
/// delay (PIT channel readback).
pub fn sleep_ms(ms: u32) {
    let freq = platform::timer_frequency();
    if freq == 0 || !cpu::are_interrupts_enabled() {
        platform::timer_poll_delay_ms(ms);
        return;
    }

    let ticks_needed = ((ms as u64) * freq as u64).div_ceil(1000).max(1);
    let start = get_timer_ticks();
    while get_timer_ticks().wrapping_sub(start) < ticks_needed {
        cpu::hlt();
    }
}
