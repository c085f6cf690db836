//! Shared building blocks for writing and shipping crash reports.
//!
//! * [`format`]: on-disk Mach-O record definitions and CPU type constants, plus
//!   the [`GUID`](format::GUID) layout used for report identifiers.
//! * [`arch`]: CPU architecture lookup that also knows architectures newer than
//!   the host's own table.
//! * [`swap`]: in-place byte order conversion of Mach-O records.
//! * [`guid`]: generation and formatting of report identifiers.
//!
//! You probably want the [minidump-descriptor][descriptor] and
//! [crash-upload][upload] crates, which use these to name and submit reports.
//!
//! [descriptor]: https://crates.io/crates/minidump-descriptor
//! [upload]: https://crates.io/crates/crash-upload

pub mod arch;
pub mod format;
pub mod guid;
pub mod swap;

pub use arch::{arch_info_from_cpu_type, arch_info_from_name, ArchInfo};
pub use guid::{create_guid, guid_to_string, GuidError, ReportIdentifier};
