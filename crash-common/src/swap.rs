//! In-place byte order conversion of Mach-O records.
//!
//! Symbol tools sometimes have to look at images built for a CPU with the other
//! byte order. The records in [`crate::format`] can be read in that order, but a
//! record that was copied out of a mapped image with its native layout needs
//! every multi-byte field reversed before it can be used.
//!
//! Each conversion reverses every multi-byte integer field exactly once and
//! leaves name and UUID byte arrays alone. There is no validation: a record with
//! nonsensical values is converted just the same. Converting twice gives back the
//! original bit pattern.

use scroll::Endian;

use crate::format::*;

/// A record whose multi-byte fields can be byte-reversed in place.
pub trait ByteSwap {
    /// Reverse the byte order of every multi-byte field.
    fn swap_bytes(&mut self);
}

macro_rules! impl_swap_field {
    ($($ty:ty),*) => {
        $(
            impl ByteSwap for $ty {
                #[inline]
                fn swap_bytes(&mut self) {
                    *self = <$ty>::swap_bytes(*self);
                }
            }
        )*
    };
}

impl_swap_field!(u16, u32, u64, i16, i32, i64);

/// Implement [`ByteSwap`] for a record by swapping the listed fields.
///
/// Only integer fields belong in the list; byte arrays are left out.
macro_rules! impl_swap_record {
    ($record:ty { $($field:ident),* $(,)? }) => {
        impl ByteSwap for $record {
            fn swap_bytes(&mut self) {
                $(ByteSwap::swap_bytes(&mut self.$field);)*
            }
        }
    };
}

impl_swap_record!(MachHeader {
    magic,
    cputype,
    cpusubtype,
    filetype,
    ncmds,
    sizeofcmds,
    flags,
});

impl_swap_record!(MachHeader64 {
    magic,
    cputype,
    cpusubtype,
    filetype,
    ncmds,
    sizeofcmds,
    flags,
    reserved,
});

impl_swap_record!(LoadCommand { cmd, cmdsize });

impl_swap_record!(SegmentCommand {
    cmd,
    cmdsize,
    vmaddr,
    vmsize,
    fileoff,
    filesize,
    maxprot,
    initprot,
    nsects,
    flags,
});

impl_swap_record!(SegmentCommand64 {
    cmd,
    cmdsize,
    vmaddr,
    vmsize,
    fileoff,
    filesize,
    maxprot,
    initprot,
    nsects,
    flags,
});

impl_swap_record!(Section {
    addr,
    size,
    offset,
    align,
    reloff,
    nreloc,
    flags,
    reserved1,
    reserved2,
});

impl_swap_record!(Section64 {
    addr,
    size,
    offset,
    align,
    reloff,
    nreloc,
    flags,
    reserved1,
    reserved2,
    reserved3,
});

impl_swap_record!(DylibCommand {
    cmd,
    cmdsize,
    name_offset,
    timestamp,
    current_version,
    compatibility_version,
});

impl_swap_record!(UuidCommand { cmd, cmdsize });

impl_swap_record!(GUID { data1, data2, data3 });

// The `_target` argument names the order the caller is converting to. Records
// are only ever handed to these functions when their order differs from the
// reader's, so the conversion is always a full reversal.

/// Convert a 32-bit Mach-O header to `_target` byte order.
pub fn swap_mach_header(header: &mut MachHeader, _target: Endian) {
    header.swap_bytes();
}

/// Convert a 64-bit Mach-O header to `_target` byte order.
pub fn swap_mach_header_64(header: &mut MachHeader64, _target: Endian) {
    header.swap_bytes();
}

/// Convert a load command prefix to `_target` byte order.
pub fn swap_load_command(command: &mut LoadCommand, _target: Endian) {
    command.swap_bytes();
}

/// Convert an `LC_SEGMENT` command to `_target` byte order.
pub fn swap_segment_command(segment: &mut SegmentCommand, _target: Endian) {
    segment.swap_bytes();
}

/// Convert an `LC_SEGMENT_64` command to `_target` byte order.
pub fn swap_segment_command_64(segment: &mut SegmentCommand64, _target: Endian) {
    segment.swap_bytes();
}

/// Convert the first `nsects` sections of `sections` to `_target` byte order.
///
/// A count larger than the slice is clamped to the slice length.
pub fn swap_section(sections: &mut [Section], nsects: u32, _target: Endian) {
    let count = sections.len().min(nsects as usize);
    for section in &mut sections[..count] {
        section.swap_bytes();
    }
}

/// Convert the first `nsects` 64-bit sections of `sections` to `_target` byte order.
///
/// A count larger than the slice is clamped to the slice length.
pub fn swap_section_64(sections: &mut [Section64], nsects: u32, _target: Endian) {
    let count = sections.len().min(nsects as usize);
    for section in &mut sections[..count] {
        section.swap_bytes();
    }
}

/// Convert an `LC_LOAD_DYLIB`/`LC_ID_DYLIB` command to `_target` byte order.
pub fn swap_dylib_command(command: &mut DylibCommand, _target: Endian) {
    command.swap_bytes();
}

/// Convert an `LC_UUID` command to `_target` byte order.
pub fn swap_uuid_command(command: &mut UuidCommand, _target: Endian) {
    command.swap_bytes();
}
