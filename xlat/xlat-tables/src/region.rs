//! # Boot-Time Region Setup
//!
//! Builds the initial kernel address space: the image's own sections with
//! attributes derived from what each section is, then every
//! platform-declared region. Platform regions are mapped with overwrite
//! disallowed so a board definition can never silently alias a kernel
//! section — a collision surfaces as [`MapError::Busy`] and halts boot
//! instead of corrupting permissions.

use crate::MapError;
use crate::address_space::AddressSpace;
use crate::attributes::MemoryAttributes;
use xlat_addresses::{PhysicalAddress, VirtualAddress};

/// One contiguous piece of the kernel image.
#[derive(Copy, Clone, Debug)]
pub struct Section {
    pub phys: PhysicalAddress,
    pub virt: VirtualAddress,
    pub size: u64,
}

/// Where the linker put the kernel, granule-aligned per section.
///
/// Typically built from linker-script symbols at boot.
#[derive(Copy, Clone, Debug)]
pub struct KernelImageLayout {
    /// Executable code: mapped read-only, privileged-executable.
    pub text: Section,
    /// Constants: read-only, execute-never.
    pub rodata: Section,
    /// Mutable data and BSS: read-write (and therefore execute-never).
    pub data: Section,
}

/// One board/SoC-declared region, e.g. a peripheral window or a DMA pool.
#[derive(Copy, Clone, Debug)]
pub struct PlatformRegion {
    pub name: &'static str,
    pub phys: PhysicalAddress,
    pub virt: VirtualAddress,
    pub size: u64,
    pub attributes: MemoryAttributes,
}

/// Build the boot address space: kernel sections first, then platform
/// regions with overwrite disallowed.
///
/// On success the returned space is complete but **not** live; call
/// [`AddressSpace::enable`] (or hand
/// [`translation_config`](AddressSpace::translation_config) to your own
/// enable sequence) once the caller is ready for translated execution.
///
/// ### Errors
/// - [`MapError::Busy`]: a platform region overlaps a kernel section or an
///   earlier platform region.
/// - [`MapError::OutOfTables`]: the pool is too small for the layout.
pub fn init_address_space<const N: usize>(
    va_bits: u32,
    image: &KernelImageLayout,
    platform: &[PlatformRegion],
) -> Result<AddressSpace<N>, MapError> {
    let mut space = AddressSpace::new(va_bits);

    let text = MemoryAttributes::normal()
        .with_executable()
        .with_overwrite(true);
    let rodata = MemoryAttributes::normal().with_overwrite(true);
    let data = MemoryAttributes::normal()
        .with_read_write(true)
        .with_overwrite(true);

    space.map_region("text", image.text.phys, image.text.virt, image.text.size, text)?;
    space.map_region(
        "rodata",
        image.rodata.phys,
        image.rodata.virt,
        image.rodata.size,
        rodata,
    )?;
    space.map_region("data", image.data.phys, image.data.virt, image.data.size, data)?;

    for region in platform {
        let attrs = region.attributes.with_overwrite(false);
        space.map_region(region.name, region.phys, region.virt, region.size, attrs)?;
    }

    log::info!(
        "address space ready: {} of {} tables in use",
        space.allocated_tables(),
        space.table_capacity()
    );
    Ok(space)
}
