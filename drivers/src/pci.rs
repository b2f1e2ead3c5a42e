//! PCI bus driver: mechanism-#1 configuration access and enumeration.
//!
//! Config space is reached through the legacy port pair 0xCF8/0xCFC. The
//! address port and data port form one global resource: every address/data
//! sequence, including the read-modify-write of the sub-dword accessors,
//! runs under the `CONFIG_PORTS` IrqMutex so an interrupt can never split
//! the pair.
//!
//! Enumeration is a flat walk of every bus/device/function triple. A
//! function exists iff its vendor ID reads back as something other than
//! 0xFFFF; functions 1..7 are only probed when function 0 advertises the
//! multifunction bit. Discovered functions land in a fixed-capacity table
//! that is immutable after `pci_init`.

use core::ffi::{c_char, c_int};
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use vexos_lib::ports::{PCI_CONFIG_ADDRESS, PCI_CONFIG_DATA};
use vexos_lib::string::cstr_to_str;
use vexos_lib::{InitFlag, IrqMutex, klog_info, klog_warn};

pub use crate::pci_defs::*;

#[repr(C)]
pub struct PciDriver {
    pub name: *const u8,
    pub match_fn: Option<fn(*const PciDeviceInfo, *mut core::ffi::c_void) -> bool>,
    pub probe: Option<fn(*const PciDeviceInfo, *mut core::ffi::c_void) -> c_int>,
    pub context: *mut core::ffi::c_void,
}

unsafe impl Sync for PciDriver {}

struct PciEnumState {
    devices: [PciDeviceInfo; PCI_MAX_DEVICES],
    device_count: usize,
}

impl PciEnumState {
    const fn new() -> Self {
        Self {
            devices: [PciDeviceInfo::zeroed(); PCI_MAX_DEVICES],
            device_count: 0,
        }
    }
}

struct PciDriverRegistry {
    drivers: [*const PciDriver; PCI_DRIVER_MAX],
    count: usize,
}

impl PciDriverRegistry {
    const fn new() -> Self {
        Self {
            drivers: [ptr::null(); PCI_DRIVER_MAX],
            count: 0,
        }
    }
}

// SAFETY: PciDriverRegistry only stores pointers to 'static PciDrivers
unsafe impl Send for PciDriverRegistry {}

static PCI_INIT: InitFlag = InitFlag::new();
/// Serialises the 0xCF8/0xCFC pair. Never held across calls back into PCI.
static CONFIG_PORTS: IrqMutex<()> = IrqMutex::new(());
static ENUM_STATE: IrqMutex<PciEnumState> = IrqMutex::new(PciEnumState::new());
static DRIVER_REGISTRY: IrqMutex<PciDriverRegistry> = IrqMutex::new(PciDriverRegistry::new());
static DEVICE_COUNT_CACHE: AtomicUsize = AtomicUsize::new(0);

fn cstr_or_placeholder(ptr: *const u8) -> &'static str {
    unsafe { cstr_to_str(ptr as *const c_char) }
}

// =============================================================================
// Mechanism #1 Configuration Access
// =============================================================================

/// Compute the 32-bit address for legacy PCI configuration port I/O.
#[inline(always)]
pub(crate) fn pci_config_addr(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    0x8000_0000
        | ((bus as u32) << 16)
        | ((device as u32) << 11)
        | ((function as u32) << 8)
        | ((offset as u32) & 0xFC)
}

/// Address-then-data read. Caller holds `CONFIG_PORTS`.
fn config_read32_raw(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    unsafe {
        PCI_CONFIG_ADDRESS.write(pci_config_addr(bus, device, function, offset));
        PCI_CONFIG_DATA.read()
    }
}

/// Address-then-data write. Caller holds `CONFIG_PORTS`.
fn config_write32_raw(bus: u8, device: u8, function: u8, offset: u8, value: u32) {
    unsafe {
        PCI_CONFIG_ADDRESS.write(pci_config_addr(bus, device, function, offset));
        PCI_CONFIG_DATA.write(value);
    }
}

/// Read a 32-bit value from PCI config space (0xCF8/0xCFC).
pub fn pci_config_read32(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    let _ports = CONFIG_PORTS.lock();
    config_read32_raw(bus, device, function, offset)
}

/// Read a 16-bit value from PCI config space.
pub fn pci_config_read16(bus: u8, device: u8, function: u8, offset: u8) -> u16 {
    let value = pci_config_read32(bus, device, function, offset);
    ((value >> ((offset & 0x2) * 8)) & 0xFFFF) as u16
}

/// Read an 8-bit value from PCI config space.
pub fn pci_config_read8(bus: u8, device: u8, function: u8, offset: u8) -> u8 {
    let value = pci_config_read32(bus, device, function, offset);
    ((value >> ((offset & 0x3) * 8)) & 0xFF) as u8
}

/// Write a 32-bit value to PCI config space.
pub fn pci_config_write32(bus: u8, device: u8, function: u8, offset: u8, value: u32) {
    let _ports = CONFIG_PORTS.lock();
    config_write32_raw(bus, device, function, offset, value);
}

/// Write a 16-bit value to PCI config space.
///
/// The enclosing dword is read, merged, and written back under one lock
/// acquisition so the read-modify-write is atomic against other config
/// accesses.
pub fn pci_config_write16(bus: u8, device: u8, function: u8, offset: u8, value: u16) {
    let _ports = CONFIG_PORTS.lock();
    let dword = config_read32_raw(bus, device, function, offset);
    let shift = (offset & 0x2) * 8;
    let mask = !(0xFFFF << shift);
    let new_dword = (dword & mask) | ((value as u32) << shift);
    config_write32_raw(bus, device, function, offset, new_dword);
}

/// Write an 8-bit value to PCI config space (read-modify-write, one lock
/// acquisition).
pub fn pci_config_write8(bus: u8, device: u8, function: u8, offset: u8, value: u8) {
    let _ports = CONFIG_PORTS.lock();
    let dword = config_read32_raw(bus, device, function, offset);
    let shift = (offset & 0x3) * 8;
    let mask = !(0xFF << shift);
    let new_dword = (dword & mask) | ((value as u32) << shift);
    config_write32_raw(bus, device, function, offset, new_dword);
}

// =============================================================================
// BAR Probing
// =============================================================================

/// Decode a BAR from its original value and the size mask read back after
/// the all-ones write. Pure so it can be exercised without hardware.
///
/// `base_high` is the contents of the next BAR slot, consulted only for
/// 64-bit memory BARs.
pub(crate) fn pci_decode_bar(original: u32, size_mask: u32, base_high: u32) -> PciBarInfo {
    if size_mask == 0 || size_mask == 0xFFFF_FFFF {
        return PciBarInfo::zeroed();
    }

    // The address bits that read back writable encode the size; the flag
    // bits are masked off and the unprobed high dword is treated as fixed.
    let bar_size = |flag_mask: u32| -> u64 {
        let bits = ((size_mask & !flag_mask) as u64) | 0xFFFF_FFFF_0000_0000;
        (!bits).wrapping_add(1)
    };

    let is_io = (original & 1) != 0;
    if is_io {
        PciBarInfo {
            base: (original & !0x3) as u64,
            size: bar_size(0x3),
            is_io: true,
            is_64bit: false,
            prefetchable: false,
        }
    } else {
        let is_64bit = ((original >> 1) & 0x3) == 2;
        let prefetchable = ((original >> 3) & 1) != 0;
        let base_low = (original & !0xF) as u64;
        let base = if is_64bit {
            base_low | ((base_high as u64) << 32)
        } else {
            base_low
        };
        PciBarInfo {
            base,
            size: bar_size(0xF),
            is_io: false,
            is_64bit,
            prefetchable,
        }
    }
}

/// Size a BAR with the standard write-ones / read-back / restore protocol.
fn pci_probe_bar(bus: u8, device: u8, function: u8, bar_idx: u8) -> PciBarInfo {
    let bar_offset = PCI_BAR0_OFFSET + bar_idx * 4;
    let original = pci_config_read32(bus, device, function, bar_offset);

    pci_config_write32(bus, device, function, bar_offset, 0xFFFF_FFFF);
    let size_mask = pci_config_read32(bus, device, function, bar_offset);
    pci_config_write32(bus, device, function, bar_offset, original);

    let base_high = if bar_idx < 5 {
        pci_config_read32(bus, device, function, bar_offset + 4)
    } else {
        0
    };

    pci_decode_bar(original, size_mask, base_high)
}

// =============================================================================
// Enumeration
// =============================================================================

fn pci_read_vendor_id(bus: u8, device: u8, function: u8) -> u16 {
    pci_config_read16(bus, device, function, PCI_VENDOR_ID_OFFSET)
}

fn pci_read_header_type(bus: u8, device: u8, function: u8) -> u8 {
    pci_config_read8(bus, device, function, PCI_HEADER_TYPE_OFFSET)
}

fn pci_is_multifunction(bus: u8, device: u8) -> bool {
    (pci_read_header_type(bus, device, 0) & PCI_HEADER_TYPE_MULTIFUNCTION) != 0
}

fn pci_record_function(state: &mut PciEnumState, bus: u8, device: u8, function: u8) {
    let vendor = pci_read_vendor_id(bus, device, function);
    if vendor == PCI_VENDOR_ID_INVALID {
        return;
    }

    let device_id = pci_config_read16(bus, device, function, PCI_DEVICE_ID_OFFSET);
    let class_code = pci_config_read8(bus, device, function, PCI_CLASS_CODE_OFFSET);
    let subclass = pci_config_read8(bus, device, function, PCI_SUBCLASS_OFFSET);
    let prog_if = pci_config_read8(bus, device, function, PCI_PROG_IF_OFFSET);
    let revision = pci_config_read8(bus, device, function, PCI_REVISION_ID_OFFSET);
    let header_type = pci_read_header_type(bus, device, function) & 0x7F;
    let irq_line = pci_config_read8(bus, device, function, PCI_INTERRUPT_LINE_OFFSET);
    let irq_pin = pci_config_read8(bus, device, function, PCI_INTERRUPT_PIN_OFFSET);

    let mut bars = [PciBarInfo::zeroed(); PCI_MAX_BARS];
    let mut bar_count = 0u8;
    if header_type == 0 {
        let mut bar_idx = 0u8;
        while bar_idx < PCI_MAX_BARS as u8 {
            let bar = pci_probe_bar(bus, device, function, bar_idx);
            bars[bar_idx as usize] = bar;
            if bar.is_present() {
                bar_count = bar_idx + 1;
            }
            // A 64-bit BAR consumes the following slot as its high dword.
            if bar.is_64bit {
                bar_idx += 1;
            }
            bar_idx += 1;
        }
    }

    if state.device_count >= PCI_MAX_DEVICES {
        klog_warn!(
            "PCI: device table full, dropping {:02x}:{:02x}.{}",
            bus,
            device,
            function
        );
        return;
    }

    state.devices[state.device_count] = PciDeviceInfo {
        bus,
        device,
        function,
        vendor_id: vendor,
        device_id,
        class_code,
        subclass,
        prog_if,
        revision,
        header_type,
        irq_line,
        irq_pin,
        bar_count,
        bars,
    };
    state.device_count += 1;

    klog_info!(
        "PCI: [{:02x}:{:02x}.{}] VID=0x{:04x} DID=0x{:04x} Class=0x{:02x}:{:02x} IRQ={}",
        bus,
        device,
        function,
        vendor,
        device_id,
        class_code,
        subclass,
        irq_line
    );

    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_present() {
            continue;
        }
        if bar.is_io {
            klog_info!("    BAR{}: IO base=0x{:x} size={}", i, bar.base, bar.size);
        } else {
            let pf = if bar.prefetchable {
                "prefetch"
            } else {
                "non-prefetch"
            };
            let bits = if bar.is_64bit { "64bit" } else { "32bit" };
            klog_info!(
                "    BAR{}: MMIO base=0x{:x} size=0x{:x} {} {}",
                i,
                bar.base,
                bar.size,
                pf,
                bits
            );
        }
    }
}

/// Walk every bus/device/function triple and record what answers.
///
/// Absent functions read all-ones; that is the normal case for most of the
/// address space, not an error.
fn pci_scan_all(state: &mut PciEnumState) {
    for bus in 0..PCI_MAX_BUSES {
        let bus = bus as u8;
        for device in 0..PCI_DEVICES_PER_BUS {
            if pci_read_vendor_id(bus, device, 0) == PCI_VENDOR_ID_INVALID {
                continue;
            }

            pci_record_function(state, bus, device, 0);

            if pci_is_multifunction(bus, device) {
                for function in 1..PCI_FUNCTIONS_PER_DEVICE {
                    if pci_read_vendor_id(bus, device, function) != PCI_VENDOR_ID_INVALID {
                        pci_record_function(state, bus, device, function);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Initialization & Queries
// =============================================================================

pub fn pci_init() {
    if !PCI_INIT.init_once() {
        return;
    }

    klog_info!("PCI: Initializing PCI subsystem");

    let mut state = ENUM_STATE.lock();
    state.device_count = 0;
    pci_scan_all(&mut state);

    let count = state.device_count;
    drop(state);

    DEVICE_COUNT_CACHE.store(count, Ordering::Release);
    klog_info!("PCI: Enumeration complete. Functions discovered: {}", count);
}

pub fn pci_get_device_count() -> usize {
    DEVICE_COUNT_CACHE.load(Ordering::Acquire)
}

pub fn pci_get_device(index: usize) -> Option<PciDeviceInfo> {
    let state = ENUM_STATE.lock();
    if index < state.device_count {
        Some(state.devices[index])
    } else {
        None
    }
}

/// First enumerated function matching `(vendor_id, device_id)`.
pub fn pci_find_device(vendor_id: u16, device_id: u16) -> Option<PciDeviceInfo> {
    let state = ENUM_STATE.lock();
    state.devices[..state.device_count]
        .iter()
        .find(|dev| dev.vendor_id == vendor_id && dev.device_id == device_id)
        .copied()
}

/// Turn on I/O decode, memory decode, and bus mastering for a function.
///
/// DMA-capable devices need all three before their rings are visible to the
/// host and their doorbell writes reach the device.
pub fn pci_enable_bus_mastering(dev: &PciDeviceInfo) {
    let mut command = pci_config_read16(dev.bus, dev.device, dev.function, PCI_COMMAND_OFFSET);
    command |= PCI_COMMAND_IO_SPACE | PCI_COMMAND_MEMORY_SPACE | PCI_COMMAND_BUS_MASTER;
    pci_config_write16(dev.bus, dev.device, dev.function, PCI_COMMAND_OFFSET, command);
}

/// BAR `idx` of an enumerated function, if the device implements it.
pub fn pci_get_bar_address(dev: &PciDeviceInfo, idx: usize) -> Option<PciBarInfo> {
    if idx >= PCI_MAX_BARS {
        return None;
    }
    let bar = dev.bars[idx];
    if bar.is_present() { Some(bar) } else { None }
}

// =============================================================================
// Driver Registry
// =============================================================================

pub fn pci_register_driver(driver: &'static PciDriver) -> c_int {
    let mut registry = DRIVER_REGISTRY.lock();
    if registry.drivers[..registry.count]
        .iter()
        .any(|&d| ptr::eq(d, driver))
    {
        return 0;
    }
    let idx = registry.count;
    if idx >= PCI_DRIVER_MAX {
        return -1;
    }
    let name = cstr_or_placeholder(driver.name);
    klog_info!("PCI: Registered driver {}", name);
    registry.drivers[idx] = driver;
    registry.count = idx + 1;
    0
}

/// Offer every enumerated function to every registered driver.
///
/// Locks are released before a probe runs so drivers are free to call back
/// into the PCI query functions (and to poll hardware at length).
pub fn pci_probe_drivers() {
    let driver_count = DRIVER_REGISTRY.lock().count;

    for drv_idx in 0..driver_count {
        let drv = {
            let registry = DRIVER_REGISTRY.lock();
            // SAFETY: pci_register_driver only accepts 'static PciDriver references
            unsafe { &*registry.drivers[drv_idx] }
        };

        for dev_idx in 0..pci_get_device_count() {
            let Some(dev) = pci_get_device(dev_idx) else {
                break;
            };
            if let Some(mf) = drv.match_fn {
                if mf(&dev, drv.context) {
                    if let Some(probe) = drv.probe {
                        let _ = probe(&dev, drv.context);
                    }
                }
            }
        }
    }
}
