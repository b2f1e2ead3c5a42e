//! Virtual memory hooks.
//!
//! Page table manipulation is owned by the paging subsystem; it registers a
//! single `map_physical` entry point here. MMIO mapping is the only consumer
//! in this tree.

use core::ffi::c_int;
use core::sync::atomic::{AtomicPtr, Ordering};

use bitflags::bitflags;

use crate::addr::{PhysAddr, VirtAddr};

bitflags! {
    /// Page mapping attribute flags, matching the paging subsystem's encoding.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const NO_EXECUTE = 1 << 63;
    }
}

impl PageFlags {
    /// Attributes for device register windows: mapped, writable, uncached,
    /// never executable.
    pub const MMIO: PageFlags = PageFlags::PRESENT
        .union(PageFlags::WRITABLE)
        .union(PageFlags::CACHE_DISABLE)
        .union(PageFlags::NO_EXECUTE);
}

/// Map one 4 KiB page at `virt` to `phys` with the given attribute bits.
/// Returns 0 on success.
pub type MapPhysicalFn = fn(virt: VirtAddr, phys: PhysAddr, flags: u64) -> c_int;

static MAP_HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Register the paging subsystem's 4 KiB map entry point. Called once during
/// early boot, before any driver asks for an MMIO mapping.
pub fn register_map_physical(map: MapPhysicalFn) {
    MAP_HOOK.store(map as *mut (), Ordering::Release);
}

pub fn map_physical_available() -> bool {
    !MAP_HOOK.load(Ordering::Acquire).is_null()
}

pub fn map_page_4kb(virt: VirtAddr, phys: PhysAddr, flags: u64) -> c_int {
    let ptr = MAP_HOOK.load(Ordering::Acquire);
    if ptr.is_null() {
        return -1;
    }
    // SAFETY: only `register_map_physical` stores here, and it stores a
    // valid `MapPhysicalFn`.
    let map: MapPhysicalFn = unsafe { core::mem::transmute(ptr) };
    map(virt, phys, flags)
}
