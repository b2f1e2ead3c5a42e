//! Subsystem bring-up orchestration.
//!
//! The platform entry shim calls [`kernel_init`] once the memory owner has
//! registered its page-allocation and mapping hooks. Steps run in strict
//! dependency order: console, IDT, interrupt path, PCI, network.

use core::mem::size_of;

use vexos_drivers::{e1000, irq, pci, pit, serial};
use vexos_lib::string::cstr_to_str;
use vexos_lib::testing::{HARNESS_MAX_SUITES, TestRunSummary, TestSuiteDesc, TestSuiteResult};
use vexos_lib::{cpu, klog_debug, klog_info, klog_init, klog_warn};
use vexos_mm::vmm;

use crate::idt;

// Section bounds for the suite registry; the kernel linker script wraps the
// .test_registry input sections with these symbols.
unsafe extern "C" {
    static __start_test_registry: TestSuiteDesc;
    static __stop_test_registry: TestSuiteDesc;
}

fn boot_step_console() {
    klog_init();
    serial::init();
    klog_debug!("BOOT: console online");
}

fn boot_step_idt() {
    idt::idt_init();
    idt::idt_load();
    klog_debug!("BOOT: IDT loaded");
}

fn boot_step_irq() {
    irq::init();
    cpu::enable_interrupts();

    // Quick liveness check: the timer line must tick once IF is set.
    let ticks_before = vexos_core::irq::get_timer_ticks();
    pit::pit_poll_delay_ms(100);
    let ticks_after = vexos_core::irq::get_timer_ticks();
    if ticks_after == ticks_before {
        klog_warn!("BOOT: no timer IRQs observed in 100ms window");
    } else {
        klog_debug!(
            "BOOT: PIT ticks after 100ms poll: {} -> {}",
            ticks_before,
            ticks_after
        );
    }
}

fn boot_step_pci() {
    if !vmm::map_physical_available() {
        klog_warn!("BOOT: no mapping hook registered, MMIO drivers will fail");
    }

    e1000::e1000_register_driver();
    pci::pci_init();
    pci::pci_probe_drivers();
    klog_debug!("BOOT: PCI subsystem initialized");
}

fn boot_step_net() {
    // Absence already logged by the driver; success is worth a line.
    if e1000::e1000_init() == 0 {
        let link = if e1000::e1000_link_up() { "up" } else { "down" };
        klog_info!("BOOT: network interface ready, link {}", link);
    }
}

/// Bring the interrupt and device-I/O core online.
pub fn kernel_init() {
    boot_step_console();
    boot_step_idt();
    boot_step_irq();
    boot_step_pci();
    boot_step_net();
    klog_info!("BOOT: bring-up complete");
}

/// Run every registered test suite and report the aggregate verdict.
///
/// Invoked explicitly (after [`kernel_init`]) when the kernel is booted in
/// self-test mode.
pub fn run_test_suites() -> TestRunSummary {
    let registry_start: *const TestSuiteDesc = unsafe { &__start_test_registry };
    let registry_end: *const TestSuiteDesc = unsafe { &__stop_test_registry };
    let count = (registry_end as usize - registry_start as usize) / size_of::<TestSuiteDesc>();

    let mut summary = TestRunSummary::default();
    if count > HARNESS_MAX_SUITES {
        klog_warn!(
            "TESTS: {} suites registered, running the first {}",
            count,
            HARNESS_MAX_SUITES
        );
    }

    for i in 0..count.min(HARNESS_MAX_SUITES) {
        let desc = unsafe { &*registry_start.add(i) };
        let Some(run) = desc.run else {
            continue;
        };

        klog_info!("TESTS: suite '{}'", unsafe { cstr_to_str(desc.name) });
        let mut result = TestSuiteResult::new(desc.name);
        run(core::ptr::null(), &mut result);

        summary.suites[summary.suite_count] = result;
        summary.suite_count += 1;
        summary.add_suite_result(&result);
    }

    klog_info!(
        "TESTS: {} suites, {} tests, {} passed, {} failed",
        summary.suite_count,
        summary.total_tests,
        summary.passed,
        summary.failed
    );
    summary
}
