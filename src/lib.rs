//! aboot - First-Stage ARMv7 Loader
//!
//! Turns the flattened device tree firmware hands over into a flat
//! identity-mapped environment with the MMU and caches on, and records where
//! everything ended up for the next stage.
//!
//! # Boot Flow
//! 1. Validate the device tree ([`fdt`])
//! 2. Find the boot archive and the memory range around it ([`mm::plan`])
//! 3. Lay out page tables, the tree copy and the boot info ([`mm::layout`])
//! 4. Build 1 MiB section mappings ([`mm::section`])
//! 5. Flush caches by set/way and switch the MMU on ([`arch`])
//! 6. Hand off through [`bootinfo::BootInfo`]
//!
//! # Architecture
//! - Target: ARMv7-A, short-descriptor translation tables
//! - Board: QEMU virt (`qvirt` feature)
//! - Everything outside `arch::armv7` and the drivers is plain Rust and is
//!   unit tested on the host

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod arch;
pub mod boot;
pub mod bootinfo;
pub mod config;
pub mod console;
pub mod drivers;
pub mod fdt;
pub mod mm;
