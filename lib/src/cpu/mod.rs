pub mod core;
pub mod cpuid;
pub mod interrupts;

pub use self::core::*;
pub use cpuid::*;
pub use interrupts::*;
