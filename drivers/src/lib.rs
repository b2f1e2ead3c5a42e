#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod e1000;
pub mod e1000_defs;
pub mod irq;
pub mod pci;
pub mod pci_defs;
pub mod pic;
pub mod pit;
pub mod serial;

pub mod e1000_tests;
pub mod pci_tests;
pub mod pic_tests;
pub mod pit_tests;
