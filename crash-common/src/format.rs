//! On-disk structure definitions.
//!
//! The Mach-O records here should match those defined in Apple's
//! `<mach-o/loader.h>` and `<mach/machine.h>`. The [`GUID`] layout matches the
//! Windows `GUID` struct that Breakpad uses to name crash reports.
//!
//! All records derive [`scroll::Pread`] and [`scroll::Pwrite`] so they can be
//! read from or written to a byte buffer in either byte order. When a record was
//! read in the wrong order, [`crate::swap`] converts it in place.
#![allow(non_upper_case_globals)]

use scroll::{Endian, Pread, Pwrite, SizeWith};

/// A CPU type as stored in Mach-O headers (`cpu_type_t`).
pub type cpu_type_t = i32;
/// A CPU subtype as stored in Mach-O headers (`cpu_subtype_t`).
pub type cpu_subtype_t = i32;

/// Mask for architecture bits.
pub const CPU_ARCH_MASK: cpu_type_t = 0xff00_0000u32 as i32;
/// 64-bit ABI.
pub const CPU_ARCH_ABI64: cpu_type_t = 0x0100_0000;
/// ABI for 64-bit hardware with 32-bit pointers.
pub const CPU_ARCH_ABI64_32: cpu_type_t = 0x0200_0000;

pub const CPU_TYPE_ANY: cpu_type_t = -1;
pub const CPU_TYPE_VAX: cpu_type_t = 1;
pub const CPU_TYPE_MC680x0: cpu_type_t = 6;
pub const CPU_TYPE_X86: cpu_type_t = 7;
pub const CPU_TYPE_I386: cpu_type_t = CPU_TYPE_X86;
pub const CPU_TYPE_X86_64: cpu_type_t = CPU_TYPE_X86 | CPU_ARCH_ABI64;
pub const CPU_TYPE_MC98000: cpu_type_t = 10;
pub const CPU_TYPE_HPPA: cpu_type_t = 11;
pub const CPU_TYPE_ARM: cpu_type_t = 12;
pub const CPU_TYPE_ARM64: cpu_type_t = CPU_TYPE_ARM | CPU_ARCH_ABI64;
pub const CPU_TYPE_ARM64_32: cpu_type_t = CPU_TYPE_ARM | CPU_ARCH_ABI64_32;
pub const CPU_TYPE_MC88000: cpu_type_t = 13;
pub const CPU_TYPE_SPARC: cpu_type_t = 14;
pub const CPU_TYPE_I860: cpu_type_t = 15;
pub const CPU_TYPE_POWERPC: cpu_type_t = 18;
pub const CPU_TYPE_POWERPC64: cpu_type_t = CPU_TYPE_POWERPC | CPU_ARCH_ABI64;

/// Mask for the capability bits stored in the high byte of a subtype.
pub const CPU_SUBTYPE_MASK: cpu_subtype_t = 0xff00_0000u32 as i32;
/// Requests "any member of this CPU family" when looking up by type.
pub const CPU_SUBTYPE_MULTIPLE: cpu_subtype_t = -1;
pub const CPU_SUBTYPE_LITTLE_ENDIAN: cpu_subtype_t = 0;
pub const CPU_SUBTYPE_BIG_ENDIAN: cpu_subtype_t = 1;

pub const CPU_SUBTYPE_I386_ALL: cpu_subtype_t = 3;
pub const CPU_SUBTYPE_486: cpu_subtype_t = 4;
pub const CPU_SUBTYPE_486SX: cpu_subtype_t = 4 + (8 << 4);
pub const CPU_SUBTYPE_PENT: cpu_subtype_t = 5;
pub const CPU_SUBTYPE_PENTPRO: cpu_subtype_t = 6 + (1 << 4);
pub const CPU_SUBTYPE_PENTII_M3: cpu_subtype_t = 6 + (3 << 4);
pub const CPU_SUBTYPE_PENTII_M5: cpu_subtype_t = 6 + (5 << 4);
pub const CPU_SUBTYPE_PENTIUM_4: cpu_subtype_t = 10;
pub const CPU_SUBTYPE_X86_64_ALL: cpu_subtype_t = 3;
/// Haswell feature subset.
pub const CPU_SUBTYPE_X86_64_H: cpu_subtype_t = 8;

pub const CPU_SUBTYPE_ARM_ALL: cpu_subtype_t = 0;
pub const CPU_SUBTYPE_ARM_V4T: cpu_subtype_t = 5;
pub const CPU_SUBTYPE_ARM_V6: cpu_subtype_t = 6;
pub const CPU_SUBTYPE_ARM_V5TEJ: cpu_subtype_t = 7;
pub const CPU_SUBTYPE_ARM_XSCALE: cpu_subtype_t = 8;
pub const CPU_SUBTYPE_ARM_V7: cpu_subtype_t = 9;
pub const CPU_SUBTYPE_ARM_V7F: cpu_subtype_t = 10;
pub const CPU_SUBTYPE_ARM_V7S: cpu_subtype_t = 11;
pub const CPU_SUBTYPE_ARM_V7K: cpu_subtype_t = 12;
pub const CPU_SUBTYPE_ARM64_ALL: cpu_subtype_t = 0;
pub const CPU_SUBTYPE_ARM64_V8: cpu_subtype_t = 1;
pub const CPU_SUBTYPE_ARM64E: cpu_subtype_t = 2;

pub const CPU_SUBTYPE_POWERPC_ALL: cpu_subtype_t = 0;
pub const CPU_SUBTYPE_POWERPC_601: cpu_subtype_t = 1;
pub const CPU_SUBTYPE_POWERPC_603: cpu_subtype_t = 3;
pub const CPU_SUBTYPE_POWERPC_604: cpu_subtype_t = 5;
pub const CPU_SUBTYPE_POWERPC_750: cpu_subtype_t = 9;
pub const CPU_SUBTYPE_POWERPC_7400: cpu_subtype_t = 10;
pub const CPU_SUBTYPE_POWERPC_7450: cpu_subtype_t = 11;
pub const CPU_SUBTYPE_POWERPC_970: cpu_subtype_t = 100;

pub const CPU_SUBTYPE_MC680x0_ALL: cpu_subtype_t = 1;
pub const CPU_SUBTYPE_HPPA_ALL: cpu_subtype_t = 0;
pub const CPU_SUBTYPE_SPARC_ALL: cpu_subtype_t = 0;
pub const CPU_SUBTYPE_MC88000_ALL: cpu_subtype_t = 0;
pub const CPU_SUBTYPE_I860_ALL: cpu_subtype_t = 0;

/// The magic number of a 32-bit Mach-O file in the host's byte order.
pub const MH_MAGIC: u32 = 0xfeed_face;
/// [`MH_MAGIC`] read in the opposite byte order.
pub const MH_CIGAM: u32 = 0xcefa_edfe;
/// The magic number of a 64-bit Mach-O file in the host's byte order.
pub const MH_MAGIC_64: u32 = 0xfeed_facf;
/// [`MH_MAGIC_64`] read in the opposite byte order.
pub const MH_CIGAM_64: u32 = 0xcffa_edfe;

pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_UUID: u32 = 0x1b;

/// Classify a Mach-O magic number read with the reader's native byte order.
///
/// Returns `Some(false)` if the records that follow can be used as read,
/// `Some(true)` if every record must be byte-swapped first, and `None` if
/// `magic` isn't a Mach-O magic number at all.
pub fn needs_swap(magic: u32) -> Option<bool> {
    match magic {
        MH_MAGIC | MH_MAGIC_64 => Some(false),
        MH_CIGAM | MH_CIGAM_64 => Some(true),
        _ => None,
    }
}

/// Work out which byte order a Mach-O image was written in by reading its magic
/// number in little endian.
pub fn image_endian(bytes: &[u8]) -> Option<Endian> {
    let magic: u32 = bytes.pread_with(0, scroll::LE).ok()?;
    match needs_swap(magic)? {
        false => Some(Endian::Little),
        true => Some(Endian::Big),
    }
}

/// The header at the start of a 32-bit Mach-O file.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct MachHeader {
    /// [`MH_MAGIC`] or [`MH_CIGAM`].
    pub magic: u32,
    pub cputype: cpu_type_t,
    pub cpusubtype: cpu_subtype_t,
    /// The kind of file (executable, dylib, bundle...).
    pub filetype: u32,
    /// Number of load commands following the header.
    pub ncmds: u32,
    /// Total size in bytes of all load commands.
    pub sizeofcmds: u32,
    pub flags: u32,
}

/// The header at the start of a 64-bit Mach-O file.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct MachHeader64 {
    /// [`MH_MAGIC_64`] or [`MH_CIGAM_64`].
    pub magic: u32,
    pub cputype: cpu_type_t,
    pub cpusubtype: cpu_subtype_t,
    /// The kind of file (executable, dylib, bundle...).
    pub filetype: u32,
    /// Number of load commands following the header.
    pub ncmds: u32,
    /// Total size in bytes of all load commands.
    pub sizeofcmds: u32,
    pub flags: u32,
    pub reserved: u32,
}

/// The common prefix of every load command.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct LoadCommand {
    /// One of the `LC_*` constants.
    pub cmd: u32,
    /// Total size of the command in bytes, including this prefix.
    pub cmdsize: u32,
}

/// `LC_SEGMENT`: a segment of a 32-bit image.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct SegmentCommand {
    pub cmd: u32,
    /// Includes the size of the trailing [`Section`] records.
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u32,
    pub vmsize: u32,
    pub fileoff: u32,
    pub filesize: u32,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

/// `LC_SEGMENT_64`: a segment of a 64-bit image.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct SegmentCommand64 {
    pub cmd: u32,
    /// Includes the size of the trailing [`Section64`] records.
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

/// A section of a 32-bit segment.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct Section {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u32,
    pub size: u32,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

/// A section of a 64-bit segment.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct Section64 {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

/// `LC_LOAD_DYLIB` / `LC_ID_DYLIB`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct DylibCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    /// Offset of the library path from the start of this command.
    pub name_offset: u32,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
}

/// `LC_UUID`: the image's build identifier.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pread, Pwrite, SizeWith)]
pub struct UuidCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub uuid: [u8; 16],
}

/// A GUID as specified in Rpcdce.h
///
/// Matches the [Microsoft struct][msdn] of the same name.
///
/// [msdn]: https://msdn.microsoft.com/en-us/library/windows/desktop/aa373931(v=vs.85).aspx
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pread, Pwrite, SizeWith)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}
