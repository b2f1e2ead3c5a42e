#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod addr;
pub mod hhdm;
pub mod mmio;
pub mod page_alloc;
pub mod vmm;

pub mod test_fixtures;


pub use addr::{PhysAddr, VirtAddr};
pub use mmio::MmioRegion;
pub use page_alloc::{ALLOC_FLAG_DMA, ALLOC_FLAG_ZERO, OwnedPageFrame, alloc_page_frame, free_page_frame};
pub use vmm::PageFlags;

/// Base page size used for MMIO mapping and DMA buffer carving.
pub const PAGE_SIZE_4KB: u64 = 4096;
