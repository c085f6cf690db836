//! Report identifiers.
//!
//! Every crash report is named by a random [`GUID`]. The generator is seeded
//! lazily, exactly once, from the wall clock; concurrent first callers wait for
//! the seeding to finish rather than racing it.
//!
//! The random source is a general purpose PRNG. Identifiers are practically
//! unique, which is all report correlation needs, but they are not unguessable.

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use scroll::{Pread, LE};
use tracing::debug;

use crate::format::GUID;

/// The identifier of a single crash report.
pub type ReportIdentifier = GUID;

/// Length of the string form of a [`GUID`], without a terminator.
pub const GUID_STRING_LENGTH: usize = 36;

/// Byte offsets of the hyphens in the string form.
const HYPHENS: [usize; 4] = [8, 13, 18, 27];

/// Errors produced while formatting or parsing a [`GUID`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GuidError {
    #[error("Buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
    #[error("Formatted GUID has length {0}, expected 36")]
    LengthMismatch(usize),
    #[error("Malformed GUID string")]
    Malformed,
}

impl GuidError {
    /// Returns just the name of the error, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            GuidError::BufferTooSmall { .. } => "BufferTooSmall",
            GuidError::LengthMismatch(_) => "LengthMismatch",
            GuidError::Malformed => "Malformed",
        }
    }
}

/// Where a generator gets its one-time seed from.
pub trait SeedSource {
    fn seed(&self) -> u64;
}

/// Seeds from the current wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClockSeed;

impl SeedSource for ClockSeed {
    fn seed(&self) -> u64 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        // Two processes started in the same instant still get different seeds.
        nanos ^ (u64::from(std::process::id()) << 32)
    }
}

/// Produces random [`GUID`]s.
///
/// Most callers want [`create_guid`], which uses a process-wide generator.
pub struct GuidGenerator<S = ClockSeed> {
    seed: S,
    rng: OnceLock<Mutex<StdRng>>,
}

impl<S> GuidGenerator<S> {
    pub const fn new(seed: S) -> Self {
        GuidGenerator {
            seed,
            rng: OnceLock::new(),
        }
    }

    /// Whether the one-time seeding has happened yet.
    pub fn is_seeded(&self) -> bool {
        self.rng.get().is_some()
    }
}

impl<S: SeedSource> GuidGenerator<S> {
    /// Generate a new identifier, seeding the generator first if needed.
    pub fn generate(&self) -> GUID {
        let rng = self.rng.get_or_init(|| {
            let seed = self.seed.seed();
            debug!("guid: seeding report identifier generator");
            Mutex::new(StdRng::seed_from_u64(seed))
        });
        // A panic while holding the lock can't leave the PRNG in a state
        // that matters to us.
        let mut rng = match rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut guid = GUID {
            data1: rng.next_u32(),
            data2: rng.next_u32() as u16,
            data3: rng.next_u32() as u16,
            data4: [0; 8],
        };
        guid.data4[..4].copy_from_slice(&rng.next_u32().to_le_bytes());
        guid.data4[4..].copy_from_slice(&rng.next_u32().to_le_bytes());
        guid
    }
}

static GENERATOR: GuidGenerator = GuidGenerator::new(ClockSeed);

/// Generate a new report identifier from the process-wide generator.
pub fn create_guid() -> ReportIdentifier {
    GENERATOR.generate()
}

impl GUID {
    /// The two halves of `data4`, each read least-significant byte first.
    fn data4_words(&self) -> (u32, u32) {
        let [a, b, c, d, e, f, g, h] = self.data4;
        (
            u32::from_le_bytes([a, b, c, d]),
            u32::from_le_bytes([e, f, g, h]),
        )
    }

    /// The 16-byte little-endian wire layout.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.data1.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.data2.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.data3.to_le_bytes());
        bytes[8..].copy_from_slice(&self.data4);
        bytes
    }

    /// Read a GUID from its 16-byte little-endian wire layout.
    pub fn from_bytes(bytes: &[u8; 16]) -> GUID {
        bytes.pread_with(0, LE).unwrap_or_default()
    }
}

impl fmt::Display for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hi, lo) = self.data4_words();
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:08x}-{:08x}",
            self.data1, self.data2, self.data3, hi, lo
        )
    }
}

/// Format `guid` into `buf` without allocating.
///
/// `buf` must have room for the 36 characters plus a NUL terminator, which is
/// written after them. Returns the formatted part of `buf`.
pub fn guid_to_string<'a>(guid: &GUID, buf: &'a mut [u8]) -> Result<&'a str, GuidError> {
    let actual = buf.len();
    if actual <= GUID_STRING_LENGTH {
        return Err(GuidError::BufferTooSmall {
            needed: GUID_STRING_LENGTH + 1,
            actual,
        });
    }
    let written = {
        let mut cursor = &mut buf[..];
        write!(cursor, "{}", guid).map_err(|_| GuidError::LengthMismatch(actual))?;
        actual - cursor.len()
    };
    if written != GUID_STRING_LENGTH {
        return Err(GuidError::LengthMismatch(written));
    }
    buf[written] = 0;
    std::str::from_utf8(&buf[..written]).map_err(|_| GuidError::Malformed)
}

impl FromStr for GUID {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<GUID, GuidError> {
        let bytes = s.as_bytes();
        if !s.is_ascii()
            || bytes.len() != GUID_STRING_LENGTH
            || HYPHENS.iter().any(|&i| bytes[i] != b'-')
        {
            return Err(GuidError::Malformed);
        }
        let field = |start: usize, end: usize| -> Result<u32, GuidError> {
            let digits = &s[start..end];
            if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(GuidError::Malformed);
            }
            u32::from_str_radix(digits, 16).map_err(|_| GuidError::Malformed)
        };

        let mut guid = GUID {
            data1: field(0, 8)?,
            data2: field(9, 13)? as u16,
            data3: field(14, 18)? as u16,
            data4: [0; 8],
        };
        guid.data4[..4].copy_from_slice(&field(19, 27)?.to_le_bytes());
        guid.data4[4..].copy_from_slice(&field(28, 36)?.to_le_bytes());
        Ok(guid)
    }
}
