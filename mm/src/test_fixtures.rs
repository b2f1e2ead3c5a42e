//! Fixtures for exercising DMA and MMIO consumers without the real physical
//! memory manager.
//!
//! A static arena stands in for the PMM: `fixture_init()` registers a bump
//! allocator over it through the normal [`crate::page_alloc`] hooks, so code
//! under test allocates frames exactly the way it would in a live kernel.
//! Frame addresses are derived through the HHDM in reverse, which keeps
//! `PhysAddr::to_virt()` round trips working whether or not the real HHDM is
//! up.

use core::cell::UnsafeCell;
use core::ffi::c_int;

use spin::Mutex;
use vexos_lib::InitFlag;

use crate::PAGE_SIZE_4KB;
use crate::addr::PhysAddr;
use crate::hhdm;
use crate::page_alloc::{ALLOC_FLAG_ZERO, register_page_allocator};

pub const FIXTURE_ARENA_PAGES: usize = 64;

#[repr(C, align(4096))]
struct Arena(UnsafeCell<[u8; FIXTURE_ARENA_PAGES * PAGE_SIZE_4KB as usize]>);

// SAFETY: access is serialised by ARENA_STATE below.
unsafe impl Sync for Arena {}

static ARENA: Arena = Arena(UnsafeCell::new([0; FIXTURE_ARENA_PAGES * PAGE_SIZE_4KB as usize]));

struct ArenaState {
    next_page: usize,
    live: usize,
}

static ARENA_STATE: Mutex<ArenaState> = Mutex::new(ArenaState {
    next_page: 0,
    live: 0,
});

static FIXTURE_INIT: InitFlag = InitFlag::new();

fn arena_base_virt() -> u64 {
    ARENA.0.get() as u64
}

fn fixture_alloc(flags: u32) -> PhysAddr {
    let mut state = ARENA_STATE.lock();
    if state.next_page >= FIXTURE_ARENA_PAGES {
        return PhysAddr::NULL;
    }
    let page = state.next_page;
    state.next_page += 1;
    state.live += 1;
    drop(state);

    let virt = arena_base_virt() + (page as u64) * PAGE_SIZE_4KB;
    if flags & ALLOC_FLAG_ZERO != 0 {
        unsafe { core::ptr::write_bytes(virt as *mut u8, 0, PAGE_SIZE_4KB as usize) };
    }
    // With an identity offset the "physical" address is the arena's own
    // higher-half virtual address, outside the hardware range PhysAddr::new
    // enforces. The raw constructor keeps the round trip exact.
    PhysAddr(virt.wrapping_sub(hhdm::offset()))
}

fn fixture_free(phys: PhysAddr) -> c_int {
    let virt = phys.as_u64().wrapping_add(hhdm::offset());
    let base = arena_base_virt();
    let span = (FIXTURE_ARENA_PAGES as u64) * PAGE_SIZE_4KB;
    if virt < base || virt >= base + span {
        return -1;
    }
    let mut state = ARENA_STATE.lock();
    if state.live == 0 {
        return -1;
    }
    state.live -= 1;
    0
}

/// Install the arena as the page allocator. Idempotent.
///
/// If no HHDM offset has been registered yet (standalone fixture context),
/// an identity offset of zero is installed so translations stay consistent.
pub fn fixture_init() {
    if !FIXTURE_INIT.claim() {
        return;
    }
    if !hhdm::is_available() {
        hhdm::init(0);
    }
    register_page_allocator(fixture_alloc, fixture_free);
}

/// Number of frames handed out and not yet freed.
pub fn fixture_live_frames() -> usize {
    ARENA_STATE.lock().live
}

/// Remaining capacity in pages. The bump pointer never rewinds, so a suite
/// that keeps allocating will eventually exhaust the fixture; size tests
/// accordingly.
pub fn fixture_pages_left() -> usize {
    FIXTURE_ARENA_PAGES - ARENA_STATE.lock().next_page
}
