//! PCI configuration space constants and device records.
//!
//! Single source of truth for PCI constants used across the driver subsystem.
//! Add new constants here only when a consumer exists.
//!
//! All PCI structures are `#[repr(C)]` for ABI stability between kernel subsystems.

// =============================================================================
// Configuration Space Register Offsets
// =============================================================================

/// Vendor ID register offset (16-bit).
pub const PCI_VENDOR_ID_OFFSET: u8 = 0x00;

/// Device ID register offset (16-bit).
pub const PCI_DEVICE_ID_OFFSET: u8 = 0x02;

/// Command register offset (16-bit).
pub const PCI_COMMAND_OFFSET: u8 = 0x04;

/// Status register offset (16-bit).
pub const PCI_STATUS_OFFSET: u8 = 0x06;

/// Revision ID register offset (8-bit).
pub const PCI_REVISION_ID_OFFSET: u8 = 0x08;

/// Programming Interface offset (8-bit).
pub const PCI_PROG_IF_OFFSET: u8 = 0x09;

/// Subclass register offset (8-bit).
pub const PCI_SUBCLASS_OFFSET: u8 = 0x0A;

/// Class Code register offset (8-bit).
pub const PCI_CLASS_CODE_OFFSET: u8 = 0x0B;

/// Header Type register offset (8-bit).
pub const PCI_HEADER_TYPE_OFFSET: u8 = 0x0E;

/// Base Address Register 0 offset.
pub const PCI_BAR0_OFFSET: u8 = 0x10;

/// Interrupt Line register offset (8-bit).
pub const PCI_INTERRUPT_LINE_OFFSET: u8 = 0x3C;

/// Interrupt Pin register offset (8-bit).
pub const PCI_INTERRUPT_PIN_OFFSET: u8 = 0x3D;

// =============================================================================
// Command Register Bits
// =============================================================================

/// Enable I/O space access (bit 0).
pub const PCI_COMMAND_IO_SPACE: u16 = 0x0001;

/// Enable memory space access (bit 1).
pub const PCI_COMMAND_MEMORY_SPACE: u16 = 0x0002;

/// Enable bus master capability (bit 2).
pub const PCI_COMMAND_BUS_MASTER: u16 = 0x0004;

// =============================================================================
// Header Type Bits
// =============================================================================

/// Multifunction device flag (bit 7 of the Header Type register).
pub const PCI_HEADER_TYPE_MULTIFUNCTION: u8 = 0x80;

// =============================================================================
// Known Vendor / Device IDs
// =============================================================================

/// Intel Corporation.
pub const PCI_VENDOR_ID_INTEL: u16 = 0x8086;

/// Intel 82540EM Gigabit Ethernet ("E1000", the QEMU default NIC).
pub const PCI_DEVICE_ID_82540EM: u16 = 0x100E;

/// Invalid vendor ID (no device present).
pub const PCI_VENDOR_ID_INVALID: u16 = 0xFFFF;

// =============================================================================
// Enumeration Limits
// =============================================================================

/// Maximum number of PCI buses.
pub const PCI_MAX_BUSES: usize = 256;

/// Maximum devices per bus.
pub const PCI_DEVICES_PER_BUS: u8 = 32;

/// Maximum functions per device.
pub const PCI_FUNCTIONS_PER_DEVICE: u8 = 8;

/// Maximum tracked PCI functions.
pub const PCI_MAX_DEVICES: usize = 64;

/// Maximum registered PCI drivers.
pub const PCI_DRIVER_MAX: usize = 8;

/// Maximum number of BARs per device (header type 0).
pub const PCI_MAX_BARS: usize = 6;

// =============================================================================
// PCI Device Structures
// =============================================================================

#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct PciBarInfo {
    pub base: u64,
    pub size: u64,
    pub is_io: bool,
    pub is_64bit: bool,
    pub prefetchable: bool,
}

impl PciBarInfo {
    pub const fn zeroed() -> Self {
        Self {
            base: 0,
            size: 0,
            is_io: false,
            is_64bit: false,
            prefetchable: false,
        }
    }

    /// A BAR slot the device does not implement.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.base != 0 || self.size != 0
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct PciDeviceInfo {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    pub class_code: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub revision: u8,
    pub header_type: u8,
    pub irq_line: u8,
    pub irq_pin: u8,
    pub bar_count: u8,
    pub bars: [PciBarInfo; PCI_MAX_BARS],
}

impl PciDeviceInfo {
    pub const fn zeroed() -> Self {
        Self {
            bus: 0,
            device: 0,
            function: 0,
            vendor_id: 0,
            device_id: 0,
            class_code: 0,
            subclass: 0,
            prog_if: 0,
            revision: 0,
            header_type: 0,
            irq_line: 0,
            irq_pin: 0,
            bar_count: 0,
            bars: [PciBarInfo::zeroed(); PCI_MAX_BARS],
        }
    }
}
