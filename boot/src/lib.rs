#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod bringup;
pub mod idt;

pub mod idt_tests;

pub use bringup::{kernel_init, run_test_suites};
pub use idt::{
    idt_init, idt_load, idt_set_gate, idt_set_ist, register_exception_handler,
};
