//! CPU architecture lookup for Mach-O images.
//!
//! [`arch_info_from_name`] and [`arch_info_from_cpu_type`] answer the same
//! questions as the OS's `NXGetArchInfoFromName` / `NXGetArchInfoFromCpuType`,
//! but also know about architectures that were introduced after the host table
//! was frozen (`arm64`, `arm64e`, `armv7s`, `x86_64h`). Entries for those are
//! synthesized from a structurally similar host entry the first time they are
//! asked for and then live for the rest of the process.

use std::sync::OnceLock;

use scroll::Endian;
use tracing::trace;

use crate::format::*;

/// Metadata identifying a CPU type/subtype pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchInfo {
    /// Short name, as used by `-arch` flags (`"x86_64"`, `"armv7"`).
    pub name: &'static str,
    pub cpu_type: cpu_type_t,
    pub cpu_subtype: cpu_subtype_t,
    /// Byte order of images built for this architecture.
    pub byte_order: Endian,
    /// Human-readable description.
    pub description: &'static str,
}

impl ArchInfo {
    /// Pointer width in bytes implied by the CPU type.
    pub fn pointer_width(&self) -> usize {
        if self.cpu_type & CPU_ARCH_ABI64 != 0 {
            8
        } else {
            4
        }
    }
}

const fn entry(
    name: &'static str,
    cpu_type: cpu_type_t,
    cpu_subtype: cpu_subtype_t,
    byte_order: Endian,
    description: &'static str,
) -> ArchInfo {
    ArchInfo {
        name,
        cpu_type,
        cpu_subtype,
        byte_order,
        description,
    }
}

/// The architectures the host knows about.
///
/// Family entries come first so that a lookup with [`CPU_SUBTYPE_MULTIPLE`]
/// finds them before any specific member of the family.
#[rustfmt::skip]
static HOST_ARCH_TABLE: &[ArchInfo] = &[
    entry("hppa", CPU_TYPE_HPPA, CPU_SUBTYPE_HPPA_ALL, Endian::Big, "HP-PA"),
    entry("i386", CPU_TYPE_I386, CPU_SUBTYPE_I386_ALL, Endian::Little, "Intel 80x86"),
    entry("x86_64", CPU_TYPE_X86_64, CPU_SUBTYPE_X86_64_ALL, Endian::Little, "Intel x86-64"),
    entry("i860", CPU_TYPE_I860, CPU_SUBTYPE_I860_ALL, Endian::Big, "Intel 860"),
    entry("m68k", CPU_TYPE_MC680x0, CPU_SUBTYPE_MC680x0_ALL, Endian::Big, "Motorola 68K"),
    entry("m88k", CPU_TYPE_MC88000, CPU_SUBTYPE_MC88000_ALL, Endian::Big, "Motorola 88K"),
    entry("ppc", CPU_TYPE_POWERPC, CPU_SUBTYPE_POWERPC_ALL, Endian::Big, "PowerPC"),
    entry("ppc64", CPU_TYPE_POWERPC64, CPU_SUBTYPE_POWERPC_ALL, Endian::Big, "PowerPC 64-bit"),
    entry("sparc", CPU_TYPE_SPARC, CPU_SUBTYPE_SPARC_ALL, Endian::Big, "SPARC"),
    entry("arm", CPU_TYPE_ARM, CPU_SUBTYPE_ARM_ALL, Endian::Little, "ARM"),
    entry("i486", CPU_TYPE_I386, CPU_SUBTYPE_486, Endian::Little, "Intel 80486"),
    entry("i486SX", CPU_TYPE_I386, CPU_SUBTYPE_486SX, Endian::Little, "Intel 80486SX"),
    entry("pentium", CPU_TYPE_I386, CPU_SUBTYPE_PENT, Endian::Little, "Intel Pentium"),
    entry("i586", CPU_TYPE_I386, CPU_SUBTYPE_PENT, Endian::Little, "Intel 80586"),
    entry("pentpro", CPU_TYPE_I386, CPU_SUBTYPE_PENTPRO, Endian::Little, "Intel Pentium Pro"),
    entry("i686", CPU_TYPE_I386, CPU_SUBTYPE_PENTPRO, Endian::Little, "Intel Pentium Pro"),
    entry("pentIIm3", CPU_TYPE_I386, CPU_SUBTYPE_PENTII_M3, Endian::Little, "Intel Pentium II Model 3"),
    entry("pentIIm5", CPU_TYPE_I386, CPU_SUBTYPE_PENTII_M5, Endian::Little, "Intel Pentium II Model 5"),
    entry("pentium4", CPU_TYPE_I386, CPU_SUBTYPE_PENTIUM_4, Endian::Little, "Intel Pentium 4"),
    entry("ppc601", CPU_TYPE_POWERPC, CPU_SUBTYPE_POWERPC_601, Endian::Big, "PowerPC 601"),
    entry("ppc603", CPU_TYPE_POWERPC, CPU_SUBTYPE_POWERPC_603, Endian::Big, "PowerPC 603"),
    entry("ppc604", CPU_TYPE_POWERPC, CPU_SUBTYPE_POWERPC_604, Endian::Big, "PowerPC 604"),
    entry("ppc750", CPU_TYPE_POWERPC, CPU_SUBTYPE_POWERPC_750, Endian::Big, "PowerPC 750"),
    entry("ppc7400", CPU_TYPE_POWERPC, CPU_SUBTYPE_POWERPC_7400, Endian::Big, "PowerPC 7400"),
    entry("ppc7450", CPU_TYPE_POWERPC, CPU_SUBTYPE_POWERPC_7450, Endian::Big, "PowerPC 7450"),
    entry("ppc970", CPU_TYPE_POWERPC, CPU_SUBTYPE_POWERPC_970, Endian::Big, "PowerPC 970"),
    entry("ppc970-64", CPU_TYPE_POWERPC64, CPU_SUBTYPE_POWERPC_970, Endian::Big, "PowerPC 970 64-bit"),
    entry("armv4t", CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V4T, Endian::Little, "arm v4t"),
    entry("armv5", CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V5TEJ, Endian::Little, "arm v5"),
    entry("xscale", CPU_TYPE_ARM, CPU_SUBTYPE_ARM_XSCALE, Endian::Little, "arm xscale"),
    entry("armv6", CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V6, Endian::Little, "arm v6"),
    entry("armv7", CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7, Endian::Little, "arm v7"),
    entry("armv7f", CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7F, Endian::Little, "arm v7f"),
    entry("armv7k", CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7K, Endian::Little, "arm v7k"),
    entry("little", CPU_TYPE_ANY, CPU_SUBTYPE_LITTLE_ENDIAN, Endian::Little, "Little Endian"),
    entry("big", CPU_TYPE_ANY, CPU_SUBTYPE_BIG_ENDIAN, Endian::Big, "Big Endian"),
];

/// Every entry of the host architecture table, in lookup order.
pub fn host_arch_table() -> &'static [ArchInfo] {
    HOST_ARCH_TABLE
}

/// Look up `name` in the host table only.
pub fn host_arch_info_from_name(name: &str) -> Option<&'static ArchInfo> {
    HOST_ARCH_TABLE.iter().find(|info| info.name == name)
}

/// Look up a type/subtype pair in the host table only.
///
/// Capability bits in the subtype are ignored. [`CPU_SUBTYPE_MULTIPLE`] matches
/// the first entry for `cpu_type`.
pub fn host_arch_info_from_cpu_type(
    cpu_type: cpu_type_t,
    cpu_subtype: cpu_subtype_t,
) -> Option<&'static ArchInfo> {
    if cpu_subtype == CPU_SUBTYPE_MULTIPLE {
        return HOST_ARCH_TABLE.iter().find(|info| info.cpu_type == cpu_type);
    }
    let subtype = cpu_subtype & !CPU_SUBTYPE_MASK;
    HOST_ARCH_TABLE
        .iter()
        .find(|info| info.cpu_type == cpu_type && info.cpu_subtype == subtype)
}

/// Architectures the host table predates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Extension {
    Arm64,
    Arm64e,
    Armv7s,
    X86_64h,
}

struct ExtensionTemplate {
    name: &'static str,
    base: &'static str,
    cpu_type: cpu_type_t,
    cpu_subtype: cpu_subtype_t,
    description: &'static str,
}

impl Extension {
    const ALL: [Extension; 4] = [
        Extension::Arm64,
        Extension::Arm64e,
        Extension::Armv7s,
        Extension::X86_64h,
    ];

    fn template(self) -> ExtensionTemplate {
        match self {
            Extension::Arm64 => ExtensionTemplate {
                name: "arm64",
                base: "arm",
                cpu_type: CPU_TYPE_ARM64,
                cpu_subtype: CPU_SUBTYPE_ARM64_ALL,
                description: "arm 64",
            },
            Extension::Arm64e => ExtensionTemplate {
                name: "arm64e",
                base: "arm",
                cpu_type: CPU_TYPE_ARM64,
                cpu_subtype: CPU_SUBTYPE_ARM64E,
                description: "arm64e",
            },
            Extension::Armv7s => ExtensionTemplate {
                name: "armv7s",
                base: "armv7",
                cpu_type: CPU_TYPE_ARM,
                cpu_subtype: CPU_SUBTYPE_ARM_V7S,
                description: "arm v7s",
            },
            Extension::X86_64h => ExtensionTemplate {
                name: "x86_64h",
                base: "x86_64",
                cpu_type: CPU_TYPE_X86_64,
                cpu_subtype: CPU_SUBTYPE_X86_64_H,
                description: "x86_64 Haswell",
            },
        }
    }

    fn from_name(name: &str) -> Option<Extension> {
        Extension::ALL
            .iter()
            .copied()
            .find(|ext| ext.template().name == name)
    }

    fn from_cpu_type(cpu_type: cpu_type_t, cpu_subtype: cpu_subtype_t) -> Option<Extension> {
        let subtype = cpu_subtype & !CPU_SUBTYPE_MASK;
        Extension::ALL.iter().copied().find(|ext| {
            let template = ext.template();
            template.cpu_type == cpu_type && template.cpu_subtype == subtype
        })
    }

    fn slot(self) -> &'static OnceLock<Option<ArchInfo>> {
        // Never torn down: callers hold `&'static` references into these.
        static SYNTHESIZED: [OnceLock<Option<ArchInfo>>; 4] = [
            OnceLock::new(),
            OnceLock::new(),
            OnceLock::new(),
            OnceLock::new(),
        ];
        &SYNTHESIZED[self as usize]
    }

    /// The synthesized entry, built on first use.
    fn arch_info(self) -> Option<&'static ArchInfo> {
        self.slot()
            .get_or_init(|| {
                let template = self.template();
                let base = host_arch_info_from_name(template.base)?;
                trace!("arch: synthesizing {} from {}", template.name, base.name);
                Some(ArchInfo {
                    name: template.name,
                    cpu_type: template.cpu_type,
                    cpu_subtype: template.cpu_subtype,
                    description: template.description,
                    ..base.clone()
                })
            })
            .as_ref()
    }
}

/// Look up an architecture by name, e.g. `"arm64"` or `"ppc"`.
pub fn arch_info_from_name(name: &str) -> Option<&'static ArchInfo> {
    match Extension::from_name(name) {
        Some(ext) => ext.arch_info(),
        None => host_arch_info_from_name(name),
    }
}

/// Look up an architecture by the CPU type and subtype found in a Mach-O header.
pub fn arch_info_from_cpu_type(
    cpu_type: cpu_type_t,
    cpu_subtype: cpu_subtype_t,
) -> Option<&'static ArchInfo> {
    match Extension::from_cpu_type(cpu_type, cpu_subtype) {
        Some(ext) => ext.arch_info(),
        None => host_arch_info_from_cpu_type(cpu_type, cpu_subtype),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_entries_pass_through() {
        for info in host_arch_table() {
            let by_type = arch_info_from_cpu_type(info.cpu_type, info.cpu_subtype);
            assert_eq!(
                by_type.map(|i| i as *const ArchInfo),
                host_arch_info_from_cpu_type(info.cpu_type, info.cpu_subtype)
                    .map(|i| i as *const ArchInfo),
                "{}",
                info.name
            );
            let by_name = arch_info_from_name(info.name).unwrap();
            assert!(std::ptr::eq(by_name, info));
        }
    }

    #[test]
    fn test_arm64_synthesized() {
        let arm = host_arch_info_from_name("arm").unwrap();
        let arm64 = arch_info_from_cpu_type(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL).unwrap();
        assert_eq!(arm64.name, "arm64");
        assert_eq!(arm64.cpu_type, CPU_TYPE_ARM64);
        assert_eq!(arm64.cpu_subtype, CPU_SUBTYPE_ARM64_ALL);
        assert_eq!(arm64.description, "arm 64");
        assert_eq!(arm64.byte_order, arm.byte_order);
        assert_eq!(arm64.pointer_width(), 8);

        let again = arch_info_from_cpu_type(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL).unwrap();
        assert!(std::ptr::eq(arm64, again));
        let by_name = arch_info_from_name("arm64").unwrap();
        assert!(std::ptr::eq(arm64, by_name));
    }

    #[test]
    fn test_armv7s_synthesized() {
        let armv7 = arch_info_from_name("armv7").unwrap();
        let armv7s = arch_info_from_name("armv7s").unwrap();
        assert_eq!(armv7s.cpu_type, CPU_TYPE_ARM);
        assert_eq!(armv7s.cpu_subtype, CPU_SUBTYPE_ARM_V7S);
        assert_eq!(armv7s.description, "arm v7s");
        assert_eq!(armv7s.byte_order, armv7.byte_order);
        assert_eq!(armv7s.pointer_width(), 4);
        assert!(std::ptr::eq(
            armv7s,
            arch_info_from_cpu_type(CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7S).unwrap()
        ));
    }

    #[test]
    fn test_other_extensions() {
        let arm64e = arch_info_from_cpu_type(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64E).unwrap();
        assert_eq!(arm64e.name, "arm64e");
        let haswell = arch_info_from_name("x86_64h").unwrap();
        assert_eq!(haswell.cpu_type, CPU_TYPE_X86_64);
        assert_eq!(haswell.cpu_subtype, CPU_SUBTYPE_X86_64_H);
        assert_eq!(haswell.byte_order, Endian::Little);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(arch_info_from_name("riscv128"), None);
        assert_eq!(arch_info_from_cpu_type(0x7777, 0), None);
        assert_eq!(arch_info_from_cpu_type(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_V8), None);
    }

    #[test]
    fn test_subtype_lookup_rules() {
        let family = arch_info_from_cpu_type(CPU_TYPE_POWERPC, CPU_SUBTYPE_MULTIPLE).unwrap();
        assert_eq!(family.name, "ppc");

        // Capability bits in the high byte don't change the answer.
        let subtype = CPU_SUBTYPE_X86_64_ALL | 0x8000_0000u32 as i32;
        let masked = arch_info_from_cpu_type(CPU_TYPE_X86_64, subtype).unwrap();
        assert_eq!(masked.name, "x86_64");

        assert_eq!(arch_info_from_name("ppc").unwrap().byte_order, Endian::Big);
    }

    #[test]
    fn test_concurrent_first_use() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    arch_info_from_name("arm64e").unwrap() as *const ArchInfo as usize
                })
            })
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }
}
