//! Full-state export/import.
//!
//! A [`FleetSnapshot`] is the serialization seam of the engine: persistence,
//! if any, belongs to whoever holds the snapshot. Two encodings are offered:
//!
//! - plain JSON (`to_json` / `from_json`)
//! - a framed binary form for files:
//!
//! ```text
//! [magic: "BUSR"][version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::Bus;
use crate::student::Student;

/// Current snapshot format version.
pub const FORMAT_VERSION: u8 = 1;

/// Magic bytes identifying framed snapshots.
pub const MAGIC: [u8; 4] = *b"BUSR";

/// Largest payload accepted when decoding (64 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Errors raised while encoding, decoding or storing snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// JSON (de)serialization failed.
    #[error("snapshot serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    /// File or stream I/O failed.
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Magic bytes did not match.
    #[error("invalid magic bytes: expected {expected:?}, got {actual:?}")]
    BadMagic {
        /// Expected magic.
        expected: [u8; 4],
        /// What was read.
        actual: [u8; 4],
    },

    /// Unknown format version.
    #[error("unsupported snapshot version: {actual} (expected {expected})")]
    UnsupportedVersion {
        /// Supported version.
        expected: u8,
        /// What was read.
        actual: u8,
    },

    /// Declared payload is too large.
    #[error("payload size {size} exceeds maximum {max}")]
    TooLarge {
        /// Declared size.
        size: usize,
        /// Limit.
        max: usize,
    },

    /// Checksum mismatch.
    #[error("CRC mismatch: stored={stored:08x}, computed={computed:08x} (data corrupted)")]
    Corrupted {
        /// Stored checksum.
        stored: u32,
        /// Checksum of the bytes read.
        computed: u32,
    },
}

/// Copy of both engine collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    /// Format version the snapshot was written with.
    pub format_version: u8,
    /// When the snapshot was taken.
    pub exported_at: DateTime<Utc>,
    /// Buses in store order.
    pub buses: Vec<Bus>,
    /// Students in store order.
    pub students: Vec<Student>,
}

impl FleetSnapshot {
    /// Creates a snapshot stamped with the current time.
    #[must_use]
    pub fn new(buses: Vec<Bus>, students: Vec<Student>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            exported_at: Utc::now(),
            buses,
            students,
        }
    }

    /// Content hash of the collections, ignoring `exported_at`.
    ///
    /// Two snapshots with equal fingerprints describe observationally
    /// identical engines.
    ///
    /// # Errors
    ///
    /// Fails only if a record cannot be serialized.
    pub fn fingerprint(&self) -> Result<String, SnapshotError> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&serde_json::to_vec(&self.buses)?);
        hasher.update(&[0]);
        hasher.update(&serde_json::to_vec(&self.students)?);
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Serializes to JSON.
    ///
    /// # Errors
    ///
    /// Fails only if a record cannot be serialized.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Serde`] for malformed input and
    /// [`SnapshotError::UnsupportedVersion`] for an unknown `format_version`.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.ensure_supported()?;
        Ok(snapshot)
    }

    /// Checks that `format_version` is one this build reads.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::UnsupportedVersion`] otherwise.
    pub const fn ensure_supported(&self) -> Result<(), SnapshotError> {
        if self.format_version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                expected: FORMAT_VERSION,
                actual: self.format_version,
            });
        }
        Ok(())
    }

    /// Encodes to the framed binary form.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails or the payload is too large.
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let data = serde_json::to_vec(self)?;
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(SnapshotError::TooLarge {
                size: data.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut hasher = Hasher::new();
        hasher.update(&data);
        let crc = hasher.finalize();

        #[allow(clippy::cast_possible_truncation)]
        let len = data.len() as u32;

        let mut out = Vec::with_capacity(MAGIC.len() + 1 + 4 + data.len() + 4);
        out.extend_from_slice(&MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&data);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    /// Decodes the framed binary form, verifying magic, version and checksum.
    ///
    /// # Errors
    ///
    /// Any framing, checksum or JSON failure.
    pub fn decode(reader: &mut impl Read) -> Result<Self, SnapshotError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(SnapshotError::BadMagic {
                expected: MAGIC,
                actual: magic,
            });
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                expected: FORMAT_VERSION,
                actual: version[0],
            });
        }

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(SnapshotError::TooLarge {
                size: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;

        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes)?;
        let stored = u32::from_le_bytes(crc_bytes);

        let mut hasher = Hasher::new();
        hasher.update(&data);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(SnapshotError::Corrupted { stored, computed });
        }

        let snapshot: Self = serde_json::from_slice(&data)?;
        snapshot.ensure_supported()?;
        Ok(snapshot)
    }

    /// Decodes from a byte slice.
    ///
    /// # Errors
    ///
    /// See [`FleetSnapshot::decode`].
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Self::decode(&mut Cursor::new(bytes))
    }
}

/// Writes a framed snapshot to `path`.
///
/// The bytes go to a sibling temp file first and are renamed into place, so
/// a reader never sees a half-written snapshot.
///
/// # Errors
///
/// Encoding or I/O failure.
pub fn write_snapshot_file(path: impl AsRef<Path>, snapshot: &FleetSnapshot) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let bytes = snapshot.encode()?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote fleet snapshot");
    Ok(())
}

/// Reads a framed snapshot from `path`.
///
/// # Errors
///
/// I/O, framing or checksum failure.
pub fn read_snapshot_file(path: impl AsRef<Path>) -> Result<FleetSnapshot, SnapshotError> {
    let bytes = fs::read(path.as_ref())?;
    FleetSnapshot::decode_bytes(&bytes)
}
