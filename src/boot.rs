//! The boot sequence.
//!
//! Decode the device tree, plan memory, lay out the arenas, relocate the
//! tree, build the identity mapping, flush caches, turn the MMU on and
//! hand off. Every step runs once; any failure ends in
//! [`BootConsole::fatal`].

use crate::arch::{clean_invalidate_all_data_caches, Cpu};
use crate::bootinfo::BootInfo;
use crate::config::DUMP_FDT;
use crate::console::{Backend, BootConsole};
use crate::fdt::{Fdt, FdtError};
use crate::mm::{
    ArenaLayout, LayoutError, MappingError, MemoryPlan, Perm, PlanError, Region, SectionTable,
};

/// Anything that stops the boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootError {
    #[error("device tree: {0}")]
    Fdt(#[from] FdtError),
    #[error("memory plan: {0}")]
    Plan(#[from] PlanError),
    #[error("arena layout: {0}")]
    Layout(#[from] LayoutError),
    #[error("mapping: {0}")]
    Mapping(#[from] MappingError),
    #[error("MMU still off after enabling it")]
    MmuNotEnabled,
}

/// Where everything goes, decided before memory is touched.
#[derive(Debug, Clone, Copy)]
pub struct BootPlan<'a> {
    pub fdt: Fdt<'a>,
    pub memory: MemoryPlan,
    pub layout: ArenaLayout,
}

impl<'a> BootPlan<'a> {
    /// Plan memory and lay out the arenas around the loader `image`.
    pub fn prepare(fdt: Fdt<'a>, image: Region) -> Result<Self, BootError> {
        let memory = MemoryPlan::discover(&fdt)?;
        let layout =
            ArenaLayout::build(&memory, fdt.total_size(), image, fdt.memory_reservations())?;
        for (name, region) in layout.regions() {
            log::debug!("{:>16} {:?}", name, region);
        }
        Ok(Self {
            fdt,
            memory,
            layout,
        })
    }
}

/// Copy the device tree to `dst` and validate the copy.
///
/// # Safety
/// `dst` must be writable for `fdt.total_size()` bytes, 8-byte aligned and
/// not used for anything else afterwards. It may overlap the source.
pub unsafe fn relocate_fdt(fdt: &Fdt<'_>, dst: usize) -> Result<Fdt<'static>, FdtError> {
    let src = fdt.as_bytes();
    // SAFETY: The caller guarantees the destination; `ptr::copy` allows
    // the two to overlap.
    let copy = unsafe {
        core::ptr::copy(src.as_ptr(), dst as *mut u8, src.len());
        core::slice::from_raw_parts(dst as *const u8, src.len())
    };
    Fdt::from_slice(copy)
}

/// Write the identity mappings the loader needs to keep running.
///
/// The scratch span (tables, tree copy, boot info) goes first, then the
/// loader image, then the console. Returns the console region.
pub fn map_boot_sections<B: Backend>(
    table: &mut SectionTable,
    layout: &ArenaLayout,
    image: Region,
    console: &BootConsole<B>,
) -> Result<Region, BootError> {
    let scratch = table.map_region(layout.scratch(), Perm::READ | Perm::WRITE)?;
    let code = table.map_region(image, Perm::READ | Perm::WRITE | Perm::EXEC)?;
    let region = console.map_console(table)?;
    log::debug!(
        "mapped {} scratch, {} image sections, console {:?}",
        scratch,
        code,
        region
    );
    Ok(region)
}

/// Flush caches, install the table at `root` and switch translation on.
///
/// Caches come back only once the MMU is confirmed on.
pub fn activate<C: Cpu + ?Sized>(cpu: &mut C, root: u32) -> Result<(), BootError> {
    cpu.disable_caches();
    let levels = clean_invalidate_all_data_caches(cpu);
    cpu.invalidate_icache();
    log::trace!("cleaned {} data cache levels", levels);

    cpu.install_table(root);
    cpu.enable_mmu();
    if !cpu.mmu_enabled() {
        return Err(BootError::MmuNotEnabled);
    }
    cpu.enable_caches();
    Ok(())
}

/// Run the whole sequence.
///
/// # Safety
/// `fdt_addr` must hold a readable device tree, `image` must cover the
/// running loader, and the memory the device tree describes must be free
/// for the loader to use.
unsafe fn run<B, C>(
    console: &BootConsole<B>,
    cpu: &mut C,
    fdt_addr: usize,
    image: Region,
) -> Result<(usize, BootInfo), BootError>
where
    B: Backend,
    C: Cpu,
{
    cpu.enable_unaligned_access();

    // SAFETY: Guaranteed by the caller.
    let fdt = unsafe { Fdt::from_addr(fdt_addr) }?;
    log::info!("device tree at {:#x}, {} bytes", fdt_addr, fdt.total_size());
    if DUMP_FDT {
        log::debug!("\n{}", fdt.dump());
    }

    let plan = BootPlan::prepare(fdt, image)?;
    let layout = plan.layout;
    log::info!(
        "archive {:?} in memory {:?}",
        plan.memory.archive,
        plan.memory.memory
    );

    // The copy has to land before the table root or boot info can be
    // written over any part of the source blob.
    // SAFETY: The layout placed the copy inside planned memory, outside
    // the image and every reserved range.
    let fdt = unsafe { relocate_fdt(&plan.fdt, layout.fdt.base.as_u64() as usize) }?;

    // SAFETY: The root is 16 KiB aligned inside the scratch span.
    let table = unsafe { SectionTable::zeroed_at(layout.table_root.base.as_u64() as usize) };
    let console_region = map_boot_sections(table, &layout, image, console)?;

    let info = BootInfo::new(&layout, image, console_region, plan.memory.archive);
    let info_addr = layout.boot_info.base.as_u64() as usize;
    // SAFETY: The boot info slot is 64-byte aligned and sized for the record.
    unsafe { info.write_to(info_addr) };

    activate(cpu, table.base_address() as u32)?;
    log::info!("MMU on, tree relocated to {:#x} ({} bytes)", info.fdt, fdt.total_size());
    Ok((info_addr, info))
}

/// Boot and never return.
///
/// # Safety
/// Same as the requirements on the entry arguments: `fdt_addr` is the
/// device tree firmware passed in, `image` the bounds of this loader.
pub unsafe fn boot<B, C>(console: &BootConsole<B>, cpu: &mut C, fdt_addr: usize, image: Region) -> !
where
    B: Backend,
    C: Cpu,
{
    log::info!("aboot {}, image {:?}", env!("CARGO_PKG_VERSION"), image);

    // SAFETY: Forwarded from the caller.
    match unsafe { run(console, cpu, fdt_addr, image) } {
        Ok((at, info)) => {
            log::info!("boot info: {:#x?}", info);
            console.fatal(format_args!("no next stage to enter; boot info at {:#x}", at))
        }
        Err(err) => console.fatal(format_args!("{}", err)),
    }
}
