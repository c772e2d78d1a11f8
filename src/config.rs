//! Build-time configuration for the loader.
//!
//! Everything here is fixed at compile time; there is no runtime
//! configuration source this early in boot.

use log::LevelFilter;

/// Size of one first-level section mapping (1 MiB).
pub const SECTION_SIZE: u64 = 1 << 20;

/// Working space demanded past the (1 MiB rounded) archive end.
pub const ARCHIVE_RESERVE: u64 = 32 << 20;

/// Size and alignment of the first-level translation table.
pub const TABLE_ROOT_SIZE: u64 = 16 << 10;

/// Arena handed to the next stage for second-level tables.
pub const TABLE_ARENA_SIZE: u64 = 4 << 20;

/// Alignment of the page-table arena (one small page).
pub const TABLE_ARENA_ALIGN: u64 = 4 << 10;

/// The flattened device tree must sit on an 8-byte boundary.
pub const FDT_COPY_ALIGN: u64 = 8;

/// Slot alignment for the boot-info record.
pub const BOOT_INFO_ALIGN: u64 = 64;

/// First address the loader cannot express in a 32-bit descriptor.
pub const ADDRESSABLE_LIMIT: u64 = 1 << 32;

/// Maximum level accepted by the console logger.
#[cfg(not(feature = "verbose"))]
pub const LOG_LEVEL: LevelFilter = LevelFilter::Info;
/// Maximum level accepted by the console logger.
#[cfg(feature = "verbose")]
pub const LOG_LEVEL: LevelFilter = LevelFilter::Trace;

/// Whether the decoded device tree is dumped at debug level during boot.
pub const DUMP_FDT: bool = cfg!(feature = "fdt-dump");
