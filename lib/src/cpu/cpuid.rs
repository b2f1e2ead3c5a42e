//! CPUID instruction wrapper.
//!
//! Only the leaves the kernel actually consults are named here; the test
//! harness uses leaf `0x16` to turn TSC deltas into wall time.

/// Execute CPUID with the given leaf (subleaf defaults to 0).
/// Returns (eax, ebx, ecx, edx).
#[inline(always)]
#[allow(unused_unsafe)]
pub fn cpuid(leaf: u32) -> (u32, u32, u32, u32) {
    let res = unsafe { core::arch::x86_64::__cpuid(leaf) };
    (res.eax, res.ebx, res.ecx, res.edx)
}

/// Basic CPU information and feature flags.
pub const CPUID_LEAF_FEATURES: u32 = 0x01;

/// Processor frequency information (base MHz in EAX).
pub const CPUID_LEAF_FREQUENCY: u32 = 0x16;

/// Highest supported basic leaf, returned in EAX of leaf 0.
pub const CPUID_LEAF_VENDOR: u32 = 0x00;
