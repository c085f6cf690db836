//! Where a crash handler writes its minidump.
//!
//! A [`MinidumpDescriptor`] is set up once, long before anything crashes, and
//! handed to the crash handler. It either wraps an output handle the embedder
//! already opened, or a directory in which a fresh `<guid>.dmp` file name is
//! derived on demand.
//!
//! The crash handler may read the descriptor from a signal handler, with the
//! heap in an unknown state. So the derived path is stored in a fixed-size
//! buffer inside the descriptor itself: once [`materialize_path`] has run,
//! [`path`] and [`c_path`] are plain views into that buffer and never allocate,
//! and a clone of the descriptor carries its own copy of the buffer.
//!
//! # Examples
//!
//! ```no_run
//! use minidump_descriptor::MinidumpDescriptor;
//!
//! # fn foo() -> Result<(), minidump_descriptor::DescriptorError> {
//! let mut descriptor = MinidumpDescriptor::from_directory("/tmp/crashes");
//! descriptor.set_size_limit(Some(10 * 1024 * 1024));
//! let path = descriptor.materialize_path()?;
//! assert!(path.starts_with("/tmp/crashes"));
//! # Ok(())
//! # }
//! ```
//!
//! [`materialize_path`]: MinidumpDescriptor::materialize_path
//! [`path`]: MinidumpDescriptor::path
//! [`c_path`]: MinidumpDescriptor::c_path

use std::ffi::CStr;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crash_common::guid::{create_guid, guid_to_string, GuidError, GUID_STRING_LENGTH};
use tracing::{debug, warn};

/// A platform output handle (a file descriptor on unix).
#[cfg(unix)]
pub type RawHandle = std::os::unix::io::RawFd;
/// A platform output handle.
#[cfg(not(unix))]
pub type RawHandle = isize;

/// The value that never names a usable handle.
pub const INVALID_HANDLE: RawHandle = -1;

/// Capacity of the inline path buffer, including the NUL terminator.
pub const MAX_PATH_LEN: usize = 4096;

/// Extension of minidump files derived from a directory.
pub const MINIDUMP_EXTENSION: &str = "dmp";

/// How many fresh identifiers to try before giving up on finding an unused name.
const MAX_NAME_ATTEMPTS: usize = 8;

/// Errors encountered while deriving a minidump path.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Descriptor writes to a handle and has no path")]
    HandleBased,
    #[error("Minidump path {0:?} does not fit in the path buffer")]
    PathTooLong(PathBuf),
    #[error("Minidump path {0:?} cannot be stored as a C string")]
    UnrepresentablePath(PathBuf),
    #[error("No unused file name found after {0} attempts")]
    NoUniqueName(usize),
    #[error("Error checking {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Guid(#[from] GuidError),
}

impl DescriptorError {
    /// Returns just the name of the error, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorError::HandleBased => "HandleBased",
            DescriptorError::PathTooLong(_) => "PathTooLong",
            DescriptorError::UnrepresentablePath(_) => "UnrepresentablePath",
            DescriptorError::NoUniqueName(_) => "NoUniqueName",
            DescriptorError::Io { .. } => "Io",
            DescriptorError::Guid(_) => "Guid",
        }
    }
}

/// A path stored in place, NUL terminated. Empty until set.
#[derive(Clone)]
struct InlinePath {
    buf: [u8; MAX_PATH_LEN],
    len: usize,
}

impl InlinePath {
    fn new() -> InlinePath {
        InlinePath {
            buf: [0; MAX_PATH_LEN],
            len: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn set(&mut self, path: &Path) -> Result<(), DescriptorError> {
        let bytes = path_bytes(path)
            .ok_or_else(|| DescriptorError::UnrepresentablePath(path.to_owned()))?;
        if bytes.contains(&0) {
            return Err(DescriptorError::UnrepresentablePath(path.to_owned()));
        }
        if bytes.len() >= MAX_PATH_LEN {
            return Err(DescriptorError::PathTooLong(path.to_owned()));
        }
        self.buf[..bytes.len()].copy_from_slice(bytes);
        self.buf[bytes.len()] = 0;
        self.len = bytes.len();
        Ok(())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn as_path(&self) -> &Path {
        bytes_path(self.as_bytes())
    }

    fn as_c_str(&self) -> Option<&CStr> {
        CStr::from_bytes_with_nul(&self.buf[..=self.len]).ok()
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Some(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Option<&[u8]> {
    path.to_str().map(str::as_bytes)
}

#[cfg(unix)]
fn bytes_path(bytes: &[u8]) -> &Path {
    use std::os::unix::ffi::OsStrExt;
    Path::new(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_path(bytes: &[u8]) -> &Path {
    // Only ever holds bytes that came from a `&str`.
    Path::new(std::str::from_utf8(bytes).unwrap_or_default())
}

#[derive(Clone)]
enum Target {
    Handle(RawHandle),
    Directory {
        directory: PathBuf,
        path: InlinePath,
    },
}

/// Where a minidump should be written, and limits the writer should honor.
#[derive(Clone)]
pub struct MinidumpDescriptor {
    target: Target,
    size_limit: Option<u64>,
    address_within_principal_mapping: u64,
    skip_dump_if_principal_mapping_not_referenced: bool,
    sanitize_stacks: bool,
}

impl MinidumpDescriptor {
    fn with_target(target: Target) -> MinidumpDescriptor {
        MinidumpDescriptor {
            target,
            size_limit: None,
            address_within_principal_mapping: 0,
            skip_dump_if_principal_mapping_not_referenced: false,
            sanitize_stacks: false,
        }
    }

    /// Write the minidump to `handle`, which the caller opened and will close.
    ///
    /// # Panics
    ///
    /// If `handle` is [`INVALID_HANDLE`].
    pub fn from_handle(handle: RawHandle) -> MinidumpDescriptor {
        assert!(handle != INVALID_HANDLE, "minidump handle must be valid");
        MinidumpDescriptor::with_target(Target::Handle(handle))
    }

    /// Write the minidump to a new file in `directory`.
    ///
    /// The directory is not created; it has to exist by the time the minidump
    /// is written.
    ///
    /// # Panics
    ///
    /// If `directory` is empty.
    pub fn from_directory<P: Into<PathBuf>>(directory: P) -> MinidumpDescriptor {
        let directory = directory.into();
        assert!(
            !directory.as_os_str().is_empty(),
            "minidump directory must not be empty"
        );
        MinidumpDescriptor::with_target(Target::Directory {
            directory,
            path: InlinePath::new(),
        })
    }

    /// Whether the minidump goes to a caller-supplied handle rather than a path.
    pub fn is_handle_based(&self) -> bool {
        matches!(self.target, Target::Handle(_))
    }

    /// The output handle, for handle-based descriptors.
    pub fn handle(&self) -> Option<RawHandle> {
        match self.target {
            Target::Handle(handle) => Some(handle),
            Target::Directory { .. } => None,
        }
    }

    /// The target directory, for directory-based descriptors.
    pub fn directory(&self) -> Option<&Path> {
        match &self.target {
            Target::Handle(_) => None,
            Target::Directory { directory, .. } => Some(directory),
        }
    }

    /// Derive the minidump path if that hasn't happened yet, and return it.
    ///
    /// The file name is a fresh report identifier that names nothing in the
    /// directory at the time it is picked. Once a path has been derived it
    /// never changes, so later calls return the same path from the same
    /// buffer.
    pub fn materialize_path(&mut self) -> Result<&Path, DescriptorError> {
        let (directory, path) = match &mut self.target {
            Target::Handle(_) => return Err(DescriptorError::HandleBased),
            Target::Directory { directory, path } => (directory, path),
        };
        if !path.is_empty() {
            return Ok(path.as_path());
        }

        for _ in 0..MAX_NAME_ATTEMPTS {
            let guid = create_guid();
            let mut name = [0u8; GUID_STRING_LENGTH + 1];
            let name = guid_to_string(&guid, &mut name)?;
            let candidate = directory
                .join(name)
                .with_extension(MINIDUMP_EXTENSION);

            match fs::symlink_metadata(&candidate) {
                Ok(_) => {
                    warn!("descriptor: {} already exists", candidate.display());
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(DescriptorError::Io {
                        path: candidate,
                        source,
                    })
                }
            }

            path.set(&candidate)?;
            debug!("descriptor: minidump path is {}", candidate.display());
            return Ok(path.as_path());
        }
        Err(DescriptorError::NoUniqueName(MAX_NAME_ATTEMPTS))
    }

    /// The derived minidump path, if [`materialize_path`] has succeeded.
    ///
    /// Never allocates.
    ///
    /// [`materialize_path`]: MinidumpDescriptor::materialize_path
    pub fn path(&self) -> Option<&Path> {
        self.inline_path().map(InlinePath::as_path)
    }

    /// The raw bytes of the derived path, without the terminator.
    ///
    /// Never allocates.
    pub fn path_bytes(&self) -> Option<&[u8]> {
        self.inline_path().map(InlinePath::as_bytes)
    }

    /// The derived path as a NUL-terminated C string, for code that has to
    /// open the file with raw syscalls.
    ///
    /// Never allocates.
    pub fn c_path(&self) -> Option<&CStr> {
        self.inline_path().and_then(InlinePath::as_c_str)
    }

    fn inline_path(&self) -> Option<&InlinePath> {
        match &self.target {
            Target::Directory { path, .. } if !path.is_empty() => Some(path),
            _ => None,
        }
    }

    /// The maximum size in bytes the minidump may grow to, `None` for no limit.
    ///
    /// Advisory: the writer is expected to honor it, the descriptor doesn't.
    pub fn size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    pub fn set_size_limit(&mut self, limit: Option<u64>) {
        self.size_limit = limit;
    }

    /// An address that must lie in a mapping for that mapping's memory to be
    /// included. 0 means unset.
    pub fn address_within_principal_mapping(&self) -> u64 {
        self.address_within_principal_mapping
    }

    pub fn set_address_within_principal_mapping(&mut self, address: u64) {
        self.address_within_principal_mapping = address;
    }

    /// Whether the writer should skip the dump when no thread's stack refers to
    /// the principal mapping.
    pub fn skip_dump_if_principal_mapping_not_referenced(&self) -> bool {
        self.skip_dump_if_principal_mapping_not_referenced
    }

    pub fn set_skip_dump_if_principal_mapping_not_referenced(&mut self, skip: bool) {
        self.skip_dump_if_principal_mapping_not_referenced = skip;
    }

    /// Whether the writer should scrub stack contents that don't look like
    /// pointers into mapped memory.
    pub fn sanitize_stacks(&self) -> bool {
        self.sanitize_stacks
    }

    pub fn set_sanitize_stacks(&mut self, sanitize: bool) {
        self.sanitize_stacks = sanitize;
    }
}

impl fmt::Debug for MinidumpDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("MinidumpDescriptor");
        match &self.target {
            Target::Handle(handle) => s.field("handle", handle),
            Target::Directory { directory, path } => s
                .field("directory", directory)
                .field("path", &(!path.is_empty()).then(|| path.as_path())),
        };
        s.field("size_limit", &self.size_limit)
            .field(
                "address_within_principal_mapping",
                &self.address_within_principal_mapping,
            )
            .field(
                "skip_dump_if_principal_mapping_not_referenced",
                &self.skip_dump_if_principal_mapping_not_referenced,
            )
            .field("sanitize_stacks", &self.sanitize_stacks)
            .finish()
    }
}
