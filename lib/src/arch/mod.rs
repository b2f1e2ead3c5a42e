pub mod idt;

pub use idt::*;
