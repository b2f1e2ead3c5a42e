//! Higher Half Direct Map (HHDM) translation.
//!
//! Single source of truth for the HHDM offset. The bootloader hands the
//! offset to early init exactly once; every physical-to-virtual translation
//! for ordinary RAM (descriptor rings, DMA buffers) goes through here.

use core::sync::atomic::{AtomicU64, Ordering};

use vexos_lib::InitFlag;

use crate::addr::{PhysAddr, VirtAddr};

static HHDM_OFFSET: AtomicU64 = AtomicU64::new(0);
static HHDM_INIT: InitFlag = InitFlag::new();

pub fn init(offset: u64) {
    HHDM_OFFSET.store(offset, Ordering::Release);

    if !HHDM_INIT.claim() {
        panic!("HHDM already initialized - init() called twice!");
    }
}

#[inline]
pub fn is_available() -> bool {
    HHDM_INIT.is_set()
}

/// Get the raw HHDM offset value.
///
/// Debug-panics if HHDM has not been initialized. In release builds,
/// returns 0 (which will cause incorrect translations).
#[inline]
pub fn offset() -> u64 {
    debug_assert!(
        is_available(),
        "HHDM not initialized - call hhdm::init() first"
    );
    HHDM_OFFSET.load(Ordering::Acquire)
}

/// Get the HHDM offset, returning None if not initialized.
#[inline]
pub fn try_offset() -> Option<u64> {
    if is_available() {
        Some(HHDM_OFFSET.load(Ordering::Acquire))
    } else {
        None
    }
}

/// Extension trait adding HHDM translation methods to `PhysAddr`.
pub trait PhysAddrHhdm {
    /// Translate to a virtual address through the HHDM.
    ///
    /// Debug-panics if the HHDM is not initialized.
    fn to_virt(self) -> VirtAddr;

    /// Translate to a virtual address, or None if the HHDM is not up yet.
    fn try_to_virt(self) -> Option<VirtAddr>;
}

impl PhysAddrHhdm for PhysAddr {
    #[inline]
    fn to_virt(self) -> VirtAddr {
        VirtAddr::new(self.as_u64().wrapping_add(offset()))
    }

    #[inline]
    fn try_to_virt(self) -> Option<VirtAddr> {
        try_offset().map(|off| VirtAddr::new(self.as_u64().wrapping_add(off)))
    }
}
