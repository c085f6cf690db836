use crash_common::format::*;
use crash_common::swap::*;
use crash_common::{arch_info_from_cpu_type, arch_info_from_name};
use scroll::{Endian, Pread, Pwrite, BE, LE};

const HEADER_SIZE: usize = 32;
const SEGMENT_SIZE: usize = 72;
const SECTION_SIZE: usize = 80;

fn name16(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..name.len()].copy_from_slice(name.as_bytes());
    out
}

fn section(sectname: &str, addr: u64, size: u64, offset: u32) -> Section64 {
    Section64 {
        sectname: name16(sectname),
        segname: name16("__TEXT"),
        addr,
        size,
        offset,
        align: 4,
        flags: 0x8000_0400,
        ..Section64::default()
    }
}

/// A header, one `LC_SEGMENT_64` and its sections, laid out as a PowerPC 64
/// build machine would write them.
fn big_endian_image(
    header: &MachHeader64,
    segment: &SegmentCommand64,
    sections: &[Section64],
) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_SIZE + SEGMENT_SIZE + sections.len() * SECTION_SIZE];
    bytes.pwrite_with(*header, 0, BE).unwrap();
    bytes.pwrite_with(*segment, HEADER_SIZE, BE).unwrap();
    for (i, section) in sections.iter().enumerate() {
        bytes
            .pwrite_with(*section, HEADER_SIZE + SEGMENT_SIZE + i * SECTION_SIZE, BE)
            .unwrap();
    }
    bytes
}

#[test]
fn test_foreign_image_swaps_back() {
    let header = MachHeader64 {
        magic: MH_MAGIC_64,
        cputype: CPU_TYPE_POWERPC64,
        cpusubtype: CPU_SUBTYPE_POWERPC_970,
        filetype: 2,
        ncmds: 1,
        sizeofcmds: (SEGMENT_SIZE + 2 * SECTION_SIZE) as u32,
        flags: 0x0020_0085,
        reserved: 0,
    };
    let segment = SegmentCommand64 {
        cmd: LC_SEGMENT_64,
        cmdsize: (SEGMENT_SIZE + 2 * SECTION_SIZE) as u32,
        segname: name16("__TEXT"),
        vmaddr: 0x1_0000_0000,
        vmsize: 0x4000,
        fileoff: 0,
        filesize: 0x4000,
        maxprot: 5,
        initprot: 5,
        nsects: 2,
        flags: 0,
    };
    let sections = [
        section("__text", 0x1_0000_1000, 0x2345, 0x1000),
        section("__cstring", 0x1_0000_3400, 0x120, 0x3400),
    ];
    let bytes = big_endian_image(&header, &segment, &sections);

    // A little-endian reader sees the magic backwards.
    assert_eq!(image_endian(&bytes), Some(Endian::Big));
    let mut read_header: MachHeader64 = bytes.pread_with(0, LE).unwrap();
    assert_eq!(needs_swap(read_header.magic), Some(true));

    swap_mach_header_64(&mut read_header, Endian::Little);
    assert_eq!(read_header, header);

    let mut read_segment: SegmentCommand64 = bytes.pread_with(HEADER_SIZE, LE).unwrap();
    swap_segment_command_64(&mut read_segment, Endian::Little);
    assert_eq!(read_segment, segment);
    assert_eq!(&read_segment.segname[..6], b"__TEXT");

    let mut read_sections: Vec<Section64> = (0..read_segment.nsects as usize)
        .map(|i| {
            bytes
                .pread_with(HEADER_SIZE + SEGMENT_SIZE + i * SECTION_SIZE, LE)
                .unwrap()
        })
        .collect();
    swap_section_64(&mut read_sections, read_segment.nsects, Endian::Little);
    assert_eq!(read_sections, sections);

    let arch = arch_info_from_cpu_type(read_header.cputype, read_header.cpusubtype).unwrap();
    assert_eq!(arch.name, "ppc970-64");
    assert_eq!(arch.byte_order, Endian::Big);
    assert_eq!(arch.pointer_width(), 8);
}

#[test]
fn test_native_arm64_image() {
    let header = MachHeader64 {
        magic: MH_MAGIC_64,
        cputype: CPU_TYPE_ARM64,
        // arm64e binaries carry pointer-authentication bits in the high byte.
        cpusubtype: CPU_SUBTYPE_ARM64E | 0x8000_0000u32 as i32,
        filetype: 6,
        ncmds: 0,
        sizeofcmds: 0,
        flags: 0,
        reserved: 0,
    };
    let mut bytes = vec![0u8; HEADER_SIZE];
    bytes.pwrite_with(header, 0, LE).unwrap();

    assert_eq!(image_endian(&bytes), Some(Endian::Little));
    let read: MachHeader64 = bytes.pread_with(0, LE).unwrap();
    assert_eq!(needs_swap(read.magic), Some(false));
    assert_eq!(read, header);

    let arch = arch_info_from_cpu_type(read.cputype, read.cpusubtype).unwrap();
    assert_eq!(arch.name, "arm64e");
    assert_eq!(arch.byte_order, Endian::Little);
    assert!(std::ptr::eq(arch, arch_info_from_name("arm64e").unwrap()));
}

#[test]
fn test_not_macho() {
    assert_eq!(image_endian(b"MDMP\x93\xa7\x00\x00"), None);
    assert_eq!(image_endian(b"\xfe"), None);
}
