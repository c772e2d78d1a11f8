//! Physical memory planning and the first-level translation table.
//!
//! Provides:
//! - Address and region types
//! - Archive and memory range discovery from the device tree
//! - Arena layout within the chosen range
//! - Section descriptors and the table that holds them
//!
//! # Safety Principles
//! - Every computed region is checked to fit the chosen memory range
//! - Address arithmetic is checked; nothing wraps silently
//! - Table slots are written at most once

pub mod address;
pub mod layout;
pub mod plan;
pub mod section;

pub use address::{PhysAddr, Region, VirtAddr};
pub use layout::{ArenaLayout, LayoutError};
pub use plan::{MemoryPlan, PlanError};
pub use section::{MappingError, Perm, SectionDescriptor, SectionTable};
