//! Physical and virtual address newtypes.
//!
//! These prevent accidentally confusing physical addresses with virtual
//! addresses. Both are `#[repr(transparent)]` over a raw `u64` and compile
//! away entirely.

/// A physical memory address.
///
/// Physical addresses cannot be directly dereferenced. They must first be
/// translated to virtual addresses via the HHDM or an MMIO mapping.
///
/// On x86_64, physical addresses are up to 52 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

/// A virtual memory address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

impl PhysAddr {
    /// The null physical address.
    pub const NULL: Self = Self(0);

    /// Maximum valid physical address on x86_64 (52-bit physical space).
    pub const MAX: Self = Self((1 << 52) - 1);

    /// Create a new physical address from a raw u64 value.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the 52-bit physical address limit.
    #[inline]
    pub fn new(addr: u64) -> Self {
        assert!(addr <= Self::MAX.0, "PhysAddr out of range: 0x{:x}", addr);
        Self(addr)
    }

    /// Create a new physical address if it is in range.
    #[inline]
    pub const fn try_new(addr: u64) -> Option<Self> {
        if addr <= Self::MAX.0 {
            Some(Self(addr))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Add an offset to this address (wrapping on overflow).
    #[inline]
    pub const fn offset(self, off: u64) -> Self {
        Self(self.0.wrapping_add(off))
    }

    /// Add an offset, returning None on overflow.
    #[inline]
    pub const fn checked_offset(self, off: u64) -> Option<Self> {
        match self.0.checked_add(off) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Align address down to the given power-of-two alignment.
    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two(), "align must be power of two");
        Self(self.0 & !(align - 1))
    }

    /// Align address up to the given power-of-two alignment.
    #[inline]
    pub const fn align_up(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two(), "align must be power of two");
        Self((self.0.wrapping_add(align - 1)) & !(align - 1))
    }

    /// True if the address is a multiple of `align`.
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 % align == 0
    }
}

impl VirtAddr {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    #[inline]
    pub const fn offset(self, off: u64) -> Self {
        Self(self.0.wrapping_add(off))
    }

    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two(), "align must be power of two");
        Self(self.0 & !(align - 1))
    }
}

impl core::fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PA:0x{:x}", self.0)
    }
}

impl core::fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VA:0x{:x}", self.0)
    }
}
