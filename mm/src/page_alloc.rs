//! Page frame allocation front end.
//!
//! The physical memory manager lives outside this subsystem; it registers its
//! allocate/free entry points here during early boot, the same way the serial
//! driver registers the klog backend. Everything below (DMA buffers,
//! descriptor rings) calls through these hooks and never sees the allocator's
//! internals.

use core::ffi::c_int;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::addr::{PhysAddr, VirtAddr};
use crate::hhdm::PhysAddrHhdm;

pub const ALLOC_FLAG_ZERO: u32 = 0x01;
pub const ALLOC_FLAG_DMA: u32 = 0x02;

/// Allocate one 4 KiB page frame. Returns `PhysAddr::NULL` on exhaustion.
pub type AllocPageFn = fn(flags: u32) -> PhysAddr;

/// Return a page frame to the allocator. Non-zero means the frame was not
/// tracked (double free or bogus address).
pub type FreePageFn = fn(phys: PhysAddr) -> c_int;

static ALLOC_HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());
static FREE_HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Register the physical memory manager's entry points.
///
/// Called once by the PMM after its free lists are ready. Until then every
/// allocation fails with `PhysAddr::NULL`.
pub fn register_page_allocator(alloc: AllocPageFn, free: FreePageFn) {
    ALLOC_HOOK.store(alloc as *mut (), Ordering::Release);
    FREE_HOOK.store(free as *mut (), Ordering::Release);
}

pub fn page_allocator_available() -> bool {
    !ALLOC_HOOK.load(Ordering::Acquire).is_null()
}

pub fn alloc_page_frame(flags: u32) -> PhysAddr {
    let ptr = ALLOC_HOOK.load(Ordering::Acquire);
    if ptr.is_null() {
        return PhysAddr::NULL;
    }
    // SAFETY: only `register_page_allocator` stores here, and it stores a
    // valid `AllocPageFn`.
    let alloc: AllocPageFn = unsafe { core::mem::transmute(ptr) };
    alloc(flags)
}

pub fn free_page_frame(phys: PhysAddr) -> c_int {
    let ptr = FREE_HOOK.load(Ordering::Acquire);
    if ptr.is_null() {
        return -1;
    }
    // SAFETY: only `register_page_allocator` stores here, and it stores a
    // valid `FreePageFn`.
    let free: FreePageFn = unsafe { core::mem::transmute(ptr) };
    free(phys)
}

// =============================================================================
// OwnedPageFrame - RAII wrapper for automatic page deallocation
// =============================================================================

/// An owned page frame that returns its physical page to the allocator when
/// dropped.
///
/// DMA code that hands a frame to hardware for the device's lifetime should
/// use [`into_phys`](Self::into_phys) to leak the frame deliberately.
pub struct OwnedPageFrame {
    phys: PhysAddr,
}

impl OwnedPageFrame {
    /// Allocate a new page frame with the given flags.
    ///
    /// Returns `None` if allocation fails (out of memory, or no allocator
    /// registered yet).
    #[inline]
    pub fn alloc(flags: u32) -> Option<Self> {
        let phys = alloc_page_frame(flags);
        if phys.is_null() {
            None
        } else {
            Some(Self { phys })
        }
    }

    /// Allocate a zeroed page frame.
    #[inline]
    pub fn alloc_zeroed() -> Option<Self> {
        Self::alloc(ALLOC_FLAG_ZERO)
    }

    /// Allocate a page frame suitable for DMA (zeroed, low memory).
    #[inline]
    pub fn alloc_dma() -> Option<Self> {
        Self::alloc(ALLOC_FLAG_ZERO | ALLOC_FLAG_DMA)
    }

    #[inline]
    pub fn phys_addr(&self) -> PhysAddr {
        self.phys
    }

    #[inline]
    pub fn phys_u64(&self) -> u64 {
        self.phys.as_u64()
    }

    /// Virtual address of the frame through the HHDM.
    #[inline]
    pub fn virt_addr(&self) -> VirtAddr {
        self.phys.to_virt()
    }

    #[inline]
    pub fn as_mut_ptr<T>(&self) -> *mut T {
        self.virt_addr().as_mut_ptr()
    }

    #[inline]
    pub fn as_ptr<T>(&self) -> *const T {
        self.virt_addr().as_ptr()
    }

    /// Give up ownership without freeing.
    ///
    /// Used when the frame's lifetime is handed to hardware, e.g. descriptor
    /// rings and packet buffers that the NIC DMAs into until shutdown.
    #[inline]
    pub fn into_phys(self) -> PhysAddr {
        let phys = self.phys;
        core::mem::forget(self);
        phys
    }
}

impl Drop for OwnedPageFrame {
    fn drop(&mut self) {
        if !self.phys.is_null() {
            free_page_frame(self.phys);
        }
    }
}

// SAFETY: the frame is exclusively owned; sending it to another context is
// no different from sending a Box.
unsafe impl Send for OwnedPageFrame {}

impl core::fmt::Debug for OwnedPageFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "OwnedPageFrame({})", self.phys)
    }
}
