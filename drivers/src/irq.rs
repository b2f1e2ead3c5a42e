//! IRQ subsystem bring-up.
//!
//! `core` owns the dispatch framework but never links against hardware
//! drivers; it reaches the interrupt controller and timer through the
//! platform service table. This module is the point where the two halves
//! meet: it registers the PIC/PIT implementations and walks the hardware
//! through its init sequence in dependency order.

use vexos_core::platform::{PlatformServices, register_platform_services};
use vexos_lib::klog_debug;
use vexos_lib::ports::PIT_DEFAULT_FREQUENCY_HZ;

use crate::pic;
use crate::pit;

static PLATFORM_SERVICES: PlatformServices = PlatformServices {
    irq_send_eoi: pic::pic_send_eoi,
    irq_mask_line: pic::pic_mask_line,
    irq_unmask_line: pic::pic_unmask_line,
    irq_is_spurious: pic::pic_is_spurious,
    timer_frequency: pit::pit_frequency,
    timer_poll_delay_ms: pit::pit_poll_delay_ms,
};

/// Initialise the interrupt path end to end.
///
/// Order matters: the dispatcher table must exist and the service hooks must
/// be installed before `pit_init` registers its handler (registration
/// unmasks the line through the hooks). The PIC comes up with every line
/// masked; lines open as handlers arrive.
pub fn init() {
    vexos_core::irq::init();
    register_platform_services(&PLATFORM_SERVICES);

    pic::pic_init();
    pit::pit_init(PIT_DEFAULT_FREQUENCY_HZ);

    klog_debug!("IRQ: Dispatcher and timer online");
}
