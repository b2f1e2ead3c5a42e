//! Intel 82540EM ("E1000") register map, descriptor formats, and bit
//! definitions.
//!
//! All registers are 32-bit at fixed offsets inside the BAR0 MMIO window.
//! Descriptors use the legacy 16-byte format; the layouts below must match
//! the datasheet exactly, hence `#[repr(C)]` with no padding.

use bitflags::bitflags;

/// BAR0 register window size.
pub const E1000_MMIO_WINDOW_SIZE: usize = 128 * 1024;

// =============================================================================
// Register Offsets (BAR0-relative, 32-bit)
// =============================================================================

/// Device control: reset, link, speed.
pub const REG_CTRL: usize = 0x0000;
/// Device status: link up, speed, duplex.
pub const REG_STATUS: usize = 0x0008;
/// STATUS: link up indication.
pub const STATUS_LU: u32 = 1 << 1;
/// Interrupt cause read (read-to-clear).
pub const REG_ICR: usize = 0x00C0;
/// Interrupt mask set/read.
pub const REG_IMS: usize = 0x00D0;
/// Interrupt mask clear.
pub const REG_IMC: usize = 0x00D8;
/// Receive control.
pub const REG_RCTL: usize = 0x0100;
/// Transmit control.
pub const REG_TCTL: usize = 0x0400;
/// Transmit inter-packet gap.
pub const REG_TIPG: usize = 0x0410;

/// RX descriptor base address, low dword.
pub const REG_RDBAL: usize = 0x2800;
/// RX descriptor base address, high dword.
pub const REG_RDBAH: usize = 0x2804;
/// RX descriptor ring length in bytes.
pub const REG_RDLEN: usize = 0x2808;
/// RX descriptor head (hardware-owned).
pub const REG_RDH: usize = 0x2810;
/// RX descriptor tail (software-owned).
pub const REG_RDT: usize = 0x2818;

/// TX descriptor base address, low dword.
pub const REG_TDBAL: usize = 0x3800;
/// TX descriptor base address, high dword.
pub const REG_TDBAH: usize = 0x3804;
/// TX descriptor ring length in bytes.
pub const REG_TDLEN: usize = 0x3808;
/// TX descriptor head (hardware-owned).
pub const REG_TDH: usize = 0x3810;
/// TX descriptor tail (software-owned).
pub const REG_TDT: usize = 0x3818;

/// Receive address 0, low dword (MAC bytes 0..3).
pub const REG_RAL0: usize = 0x5400;
/// Receive address 0, high dword (MAC bytes 4..5 + Address Valid).
pub const REG_RAH0: usize = 0x5404;

// =============================================================================
// CTRL Register Bits
// =============================================================================

/// Set Link Up.
pub const CTRL_SLU: u32 = 1 << 6;
/// Auto-Speed Detection Enable.
pub const CTRL_ASDE: u32 = 1 << 5;
/// Device reset; self-clearing.
pub const CTRL_RST: u32 = 1 << 26;

// =============================================================================
// RCTL Register Bits
// =============================================================================

/// Receiver enable.
pub const RCTL_EN: u32 = 1 << 1;
/// Store bad packets.
pub const RCTL_SBP: u32 = 1 << 2;
/// Unicast promiscuous.
pub const RCTL_UPE: u32 = 1 << 3;
/// Multicast promiscuous.
pub const RCTL_MPE: u32 = 1 << 4;
/// No loopback.
pub const RCTL_LBM_NONE: u32 = 0;
/// Free-buffer threshold: 1/2 of RDLEN.
pub const RCTL_RDMTS_HALF: u32 = 0;
/// Broadcast accept mode.
pub const RCTL_BAM: u32 = 1 << 15;
/// Receive buffer size 2048 bytes (BSIZE=00, BSEX=0).
pub const RCTL_BSIZE_2048: u32 = 0;
/// Strip ethernet CRC from incoming packets.
pub const RCTL_SECRC: u32 = 1 << 26;

// =============================================================================
// TCTL / TIPG Register Bits
// =============================================================================

/// Transmitter enable.
pub const TCTL_EN: u32 = 1 << 1;
/// Pad short packets.
pub const TCTL_PSP: u32 = 1 << 3;
/// Collision threshold (recommended 0x10), bits 4..11.
pub const TCTL_CT: u32 = 0x10 << 4;
/// Collision distance (full duplex 0x40), bits 12..21.
pub const TCTL_COLD: u32 = 0x40 << 12;

/// IPGT=10, IPGR1=8, IPGR2=6: the datasheet value for copper links.
pub const TIPG_DEFAULT: u32 = 0x0060_200A;

// =============================================================================
// Interrupt Cause Bits (ICR / IMS / IMC)
// =============================================================================

bitflags! {
    /// Interrupt cause and mask bits shared by ICR, IMS, and IMC.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct E1000Intr: u32 {
        /// Transmit descriptor written back.
        const TXDW  = 1 << 0;
        /// Transmit queue empty.
        const TXQE  = 1 << 1;
        /// Link status change.
        const LSC   = 1 << 2;
        /// Receive descriptor minimum threshold reached.
        const RXDMT0 = 1 << 4;
        /// Receiver overrun (no free descriptors).
        const RXO   = 1 << 6;
        /// Receiver timer expired (frames pending).
        const RXT0  = 1 << 7;
    }
}

impl E1000Intr {
    /// Causes the driver unmasks during init.
    pub const DRIVER_MASK: E1000Intr = E1000Intr::RXT0
        .union(E1000Intr::RXO)
        .union(E1000Intr::LSC)
        .union(E1000Intr::TXDW);
}

/// Value written to IMC to mask every interrupt source.
pub const IMC_ALL: u32 = 0xFFFF_FFFF;

// =============================================================================
// Descriptor Formats (legacy, 16 bytes each)
// =============================================================================

/// TX command: end of packet.
pub const TX_CMD_EOP: u8 = 1 << 0;
/// TX command: insert FCS/CRC.
pub const TX_CMD_IFCS: u8 = 1 << 1;
/// TX command: report status (descriptor writeback).
pub const TX_CMD_RS: u8 = 1 << 3;

/// TX/RX status: descriptor done.
pub const DESC_STATUS_DD: u8 = 1 << 0;
/// RX status: end of packet.
pub const RX_STATUS_EOP: u8 = 1 << 1;

#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct E1000TxDesc {
    pub buffer_addr: u64,
    pub length: u16,
    pub cso: u8,
    pub cmd: u8,
    pub status: u8,
    pub css: u8,
    pub special: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct E1000RxDesc {
    pub buffer_addr: u64,
    pub length: u16,
    pub checksum: u16,
    pub status: u8,
    pub errors: u8,
    pub special: u16,
}

/// Size of one legacy descriptor; TDLEN/RDLEN are programmed in these units.
pub const DESC_SIZE: usize = 16;

// =============================================================================
// Ring Geometry
// =============================================================================

/// TX ring length (power of two).
pub const N_TX_DESC: usize = 8;
/// RX ring length (power of two).
pub const N_RX_DESC: usize = 32;

/// Per-descriptor DMA buffer size; matches `RCTL_BSIZE_2048`.
pub const PACKET_BUFFER_SIZE: usize = 2048;

/// Largest frame `transmit` accepts (1500 payload + 14 header, no VLAN).
pub const MAX_FRAME_SIZE: usize = 1514;
