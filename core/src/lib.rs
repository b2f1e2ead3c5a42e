#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod irq;
pub mod platform;
pub mod time;

pub mod irq_tests;
