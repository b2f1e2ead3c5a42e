use vexos_lib::define_service;

define_service! {
    /// Platform hardware abstraction for the IRQ framework.
    ///
    /// Registered once during early boot by the `boot` crate, which can see
    /// both the interrupt-controller driver and the timer driver. `core`
    /// itself never links against `drivers`.
    platform => PlatformServices {
        // -- Interrupt controller -------------------------------------------
        irq_send_eoi(irq: u8);
        irq_mask_line(irq: u8) -> i32;
        irq_unmask_line(irq: u8) -> i32;
        irq_is_spurious(irq: u8) -> bool;

        // -- Timer ----------------------------------------------------------
        timer_frequency() -> u32;
        timer_poll_delay_ms(ms: u32);
    }
}
