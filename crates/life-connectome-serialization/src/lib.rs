// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! # LiFE Connectome Serialization
//!
//! Persisted form of a (typically reduced) connectome: fascicle geometry, its
//! reference frame, fitted weights and the fit diagnostics they came from.
//!
//! ## Design Goals
//! - **Fast**: bincode payload
//! - **Compact**: optional LZ4 compression
//! - **Safe to load**: magic, version and checksum are verified before decoding
//!
//! ## Usage
//! ```ignore
//! use life_connectome_serialization::{save_connectome, load_connectome, ConnectomeSnapshot};
//!
//! let snapshot = ConnectomeSnapshot::from_connectome(&reduced, Some(summary), metadata);
//! save_connectome(&snapshot, "reduced.lifec")?;
//!
//! let connectome = load_connectome("reduced.lifec")?.to_connectome()?;
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

mod snapshot;

pub use snapshot::*;

/// Connectome I/O errors
#[derive(Error, Debug)]
pub enum ConnectomeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: u32,
        expected_version: u32,
    },

    #[error("Invalid magic number: expected LIFEC, got {0:?}")]
    InvalidMagic([u8; 5]),

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Invalid connectome snapshot: {0}")]
    InvalidSnapshot(String),
}

pub type Result<T> = std::result::Result<T, ConnectomeError>;

/// Magic number for connectome files: "LIFEC"
const MAGIC: &[u8; 5] = b"LIFEC";

/// Current format version (increment when format changes)
pub const FORMAT_VERSION: u32 = 1;

const FLAG_COMPRESSED: u8 = 1;

/// Save a connectome to a file, LZ4-compressed when the `compression`
/// feature is enabled.
///
/// # Format
/// ```text
/// [Header]
/// - Magic: "LIFEC" (5 bytes)
/// - Version: u32 LE (4 bytes)
/// - Flags: u8 (1 byte) - bit 0: compressed
/// - Uncompressed Size: u64 LE (8 bytes, payload size before compression)
/// - Checksum: u64 LE (8 bytes, FNV-1a of version, flags, size and stored payload)
/// [Data]
/// - Bincode-serialized ConnectomeSnapshot (optionally LZ4 compressed)
/// ```
pub fn save_connectome<P: AsRef<Path>>(snapshot: &ConnectomeSnapshot, path: P) -> Result<()> {
    save_connectome_with(snapshot, path, cfg!(feature = "compression"))
}

/// Save with explicit control over compression.
pub fn save_connectome_with<P: AsRef<Path>>(
    snapshot: &ConnectomeSnapshot,
    path: P,
    compress: bool,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_snapshot(&mut writer, snapshot, compress)?;
    writer.flush()?;
    Ok(())
}

/// Load a connectome from a file with automatic LZ4 decompression
pub fn load_connectome<P: AsRef<Path>>(path: P) -> Result<ConnectomeSnapshot> {
    read_snapshot(BufReader::new(File::open(path)?))
}

/// Encode a snapshot into an in-memory buffer (same layout as the file).
pub fn encode_connectome(snapshot: &ConnectomeSnapshot, compress: bool) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_snapshot(&mut buffer, snapshot, compress)?;
    Ok(buffer)
}

/// Decode a snapshot from an in-memory buffer.
pub fn decode_connectome(bytes: &[u8]) -> Result<ConnectomeSnapshot> {
    read_snapshot(bytes)
}

fn write_snapshot<W: Write>(writer: &mut W, snapshot: &ConnectomeSnapshot, compress: bool) -> Result<()> {
    let data =
        bincode::serialize(snapshot).map_err(|e| ConnectomeError::Serialization(e.to_string()))?;
    let uncompressed_size = data.len() as u64;
    let (payload, flags) = if compress {
        (compress_payload(&data)?, FLAG_COMPRESSED)
    } else {
        (data, 0u8)
    };

    let version_bytes = FORMAT_VERSION.to_le_bytes();
    let size_bytes = uncompressed_size.to_le_bytes();
    let checksum = calculate_checksum(&[&version_bytes[..], &[flags][..], &size_bytes[..], &payload[..]]);

    writer.write_all(MAGIC)?;
    writer.write_all(&version_bytes)?;
    writer.write_all(&[flags])?;
    writer.write_all(&size_bytes)?;
    writer.write_all(&checksum.to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

fn read_snapshot<R: Read>(mut reader: R) -> Result<ConnectomeSnapshot> {
    let mut magic = [0u8; 5];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(ConnectomeError::InvalidMagic(magic));
    }

    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version != FORMAT_VERSION {
        return Err(ConnectomeError::VersionMismatch {
            file_version: version,
            expected_version: FORMAT_VERSION,
        });
    }

    let mut flags = [0u8; 1];
    reader.read_exact(&mut flags)?;
    let mut size_bytes = [0u8; 8];
    reader.read_exact(&mut size_bytes)?;
    let uncompressed_size = u64::from_le_bytes(size_bytes);
    let mut checksum_bytes = [0u8; 8];
    reader.read_exact(&mut checksum_bytes)?;
    let expected_checksum = u64::from_le_bytes(checksum_bytes);

    let mut payload = Vec::new();
    reader.read_to_end(&mut payload)?;
    let checksum = calculate_checksum(&[&version_bytes[..], &flags[..], &size_bytes[..], &payload[..]]);
    if checksum != expected_checksum {
        return Err(ConnectomeError::ChecksumMismatch);
    }

    let data = if flags[0] & FLAG_COMPRESSED != 0 {
        decompress_payload(&payload, uncompressed_size)?
    } else {
        payload
    };

    let snapshot: ConnectomeSnapshot =
        bincode::deserialize(&data).map_err(|e| ConnectomeError::Deserialization(e.to_string()))?;
    Ok(snapshot)
}

#[cfg(feature = "compression")]
fn compress_payload(data: &[u8]) -> Result<Vec<u8>> {
    lz4::block::compress(data, None, false).map_err(|e| ConnectomeError::Compression(e.to_string()))
}

#[cfg(not(feature = "compression"))]
fn compress_payload(_data: &[u8]) -> Result<Vec<u8>> {
    Err(ConnectomeError::Compression(
        "compression requested but the compression feature is not enabled".to_string(),
    ))
}

#[cfg(feature = "compression")]
fn decompress_payload(payload: &[u8], uncompressed_size: u64) -> Result<Vec<u8>> {
    let size = i32::try_from(uncompressed_size).map_err(|_| {
        ConnectomeError::Compression(format!("uncompressed size {} too large", uncompressed_size))
    })?;
    lz4::block::decompress(payload, Some(size))
        .map_err(|e| ConnectomeError::Compression(format!("Decompression failed: {}", e)))
}

#[cfg(not(feature = "compression"))]
fn decompress_payload(_payload: &[u8], _uncompressed_size: u64) -> Result<Vec<u8>> {
    Err(ConnectomeError::Compression(
        "File is compressed but compression feature is not enabled".to_string(),
    ))
}

/// FNV-1a over the concatenation of `parts`
fn calculate_checksum(parts: &[&[u8]]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    for &byte in parts.iter().flat_map(|part| part.iter()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
