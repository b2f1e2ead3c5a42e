use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// One-shot initialisation gate for subsystems with a single `*_init()`
/// entry point.
///
/// The winner of `init_once()` performs the initialisation and calls
/// `complete()`; every later caller sees `false` and returns early.
/// `claim()` is the degenerate form for resources that need no separate
/// "in progress" window, such as claiming a PCI device for a driver.
pub struct InitFlag {
    state: AtomicU8,
}

impl InitFlag {
    #[inline]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
        }
    }

    /// Attempt to become the initialiser. Returns `true` exactly once;
    /// the caller that wins must finish with [`complete`](Self::complete).
    #[inline]
    pub fn init_once(&self) -> bool {
        self.state
            .compare_exchange(UNINIT, INITIALIZING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Mark initialisation finished. Only the `init_once()` winner calls this.
    #[inline]
    pub fn complete(&self) {
        self.state.store(READY, Ordering::SeqCst);
    }

    /// Unconditionally mark the flag set, skipping the init window.
    #[inline]
    pub fn mark_set(&self) {
        self.state.store(READY, Ordering::SeqCst);
    }

    /// True once `complete()` (or a successful `claim()`) has happened.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::SeqCst) == READY
    }

    /// Relaxed-ordering variant for hot paths that only need an
    /// eventually-consistent answer.
    #[inline]
    pub fn is_set_relaxed(&self) -> bool {
        self.state.load(Ordering::Relaxed) == READY
    }

    /// Atomically transition straight from unset to set.
    /// Returns `true` for the single caller that wins.
    #[inline]
    pub fn claim(&self) -> bool {
        self.state
            .compare_exchange(UNINIT, READY, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Return to the unset state. Test fixtures only.
    #[inline]
    pub fn reset(&self) {
        self.state.store(UNINIT, Ordering::SeqCst);
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}
