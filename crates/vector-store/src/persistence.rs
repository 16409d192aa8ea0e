//! On-disk layout of a store directory.
//!
//! Two artifacts, row-aligned:
//!
//! - `entries.json`: schema version, embedding id, dimension and the entry list.
//! - `vectors.bin`: `NVS1` magic, format version (u32), dimension (u32),
//!   row count (u64), then `rows * dimension` little-endian f32 values.
//!
//! Each artifact is written to a `.tmp` sibling and renamed into place. The
//! pair is not replaced atomically; a crash between the two renames shows up
//! as a row-count mismatch on the next load and is rejected.

use crate::embeddings::EMBEDDING_FORMAT_ID;
use crate::error::{Result, VectorStoreError};
use crate::paths::{entries_path, temp_path_for, vectors_path};
use crate::types::Entry;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

pub const ENTRIES_SCHEMA_VERSION: u32 = 1;
pub const VECTORS_FORMAT_VERSION: u32 = 1;

const VECTORS_MAGIC: &[u8; 4] = b"NVS1";
const VECTORS_HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Deserialize)]
struct PersistedEntries {
    schema_version: u32,
    embedding: String,
    dimension: usize,
    entries: Vec<Entry>,
}

#[derive(Debug, Serialize)]
struct PersistedEntriesRef<'a> {
    schema_version: u32,
    embedding: &'a str,
    dimension: usize,
    entries: &'a [Entry],
}

/// Load both artifacts from `dir`. Missing artifacts count as zero rows.
pub fn load(dir: &Path, dimension: usize) -> Result<(Vec<Entry>, Array2<f32>)> {
    discard_stale_temp(&entries_path(dir))?;
    discard_stale_temp(&vectors_path(dir))?;

    let entries = load_entries(&entries_path(dir), dimension)?;
    let vectors = load_vectors(&vectors_path(dir), dimension)?;

    if entries.len() != vectors.nrows() {
        return Err(VectorStoreError::CorruptPersistence(format!(
            "{} entries but {} vector rows in {}; reset or repair the store",
            entries.len(),
            vectors.nrows(),
            dir.display()
        )));
    }

    Ok((entries, vectors))
}

/// Rewrite both artifacts in full.
///
/// Both `.tmp` files are written before either is renamed, so a failed
/// write leaves the previous pair untouched.
pub fn save(dir: &Path, entries: &[Entry], vectors: &Array2<f32>) -> Result<()> {
    if entries.len() != vectors.nrows() {
        return Err(VectorStoreError::CorruptPersistence(format!(
            "refusing to persist {} entries with {} vector rows",
            entries.len(),
            vectors.nrows()
        )));
    }

    let dimension = vectors.ncols();
    let vector_bytes = encode_vectors(vectors)?;
    let persisted = PersistedEntriesRef {
        schema_version: ENTRIES_SCHEMA_VERSION,
        embedding: EMBEDDING_FORMAT_ID,
        dimension,
        entries,
    };
    let entry_bytes = serde_json::to_vec_pretty(&persisted)?;

    let vectors_file = vectors_path(dir);
    let entries_file = entries_path(dir);
    let vectors_tmp = temp_path_for(&vectors_file);
    let entries_tmp = temp_path_for(&entries_file);

    let staged = std::fs::write(&vectors_tmp, &vector_bytes)
        .and_then(|()| std::fs::write(&entries_tmp, &entry_bytes));
    if let Err(err) = staged {
        discard_staged(&[vectors_tmp.as_path(), entries_tmp.as_path()]);
        return Err(err.into());
    }

    std::fs::rename(&vectors_tmp, &vectors_file)?;
    std::fs::rename(&entries_tmp, &entries_file)?;

    log::debug!(
        "Persisted {} rows (dimension {dimension}) to {}",
        entries.len(),
        dir.display()
    );
    Ok(())
}

/// Delete both artifacts. Already-missing files are fine.
///
/// Leftover `.tmp` files go first, so a failure there leaves the live pair
/// untouched.
pub fn remove(dir: &Path) -> Result<()> {
    let artifacts = [entries_path(dir), vectors_path(dir)];
    for path in &artifacts {
        remove_if_exists(&temp_path_for(path))?;
    }
    for path in &artifacts {
        remove_if_exists(path)?;
    }
    Ok(())
}

fn load_entries(path: &Path, dimension: usize) -> Result<Vec<Entry>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let persisted: PersistedEntries = serde_json::from_slice(&bytes)?;
    if persisted.schema_version != ENTRIES_SCHEMA_VERSION {
        return Err(VectorStoreError::UnsupportedFormat(format!(
            "entries schema_version {} (expected {ENTRIES_SCHEMA_VERSION})",
            persisted.schema_version
        )));
    }
    if persisted.embedding != EMBEDDING_FORMAT_ID {
        return Err(VectorStoreError::UnsupportedFormat(format!(
            "embedding '{}' (expected '{EMBEDDING_FORMAT_ID}')",
            persisted.embedding
        )));
    }
    if persisted.dimension != dimension {
        return Err(VectorStoreError::InvalidDimension {
            expected: dimension,
            actual: persisted.dimension,
        });
    }
    Ok(persisted.entries)
}

fn load_vectors(path: &Path, dimension: usize) -> Result<Array2<f32>> {
    match std::fs::read(path) {
        Ok(bytes) => decode_vectors(&bytes, dimension),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Array2::zeros((0, dimension))),
        Err(err) => Err(err.into()),
    }
}

fn encode_vectors(vectors: &Array2<f32>) -> Result<Vec<u8>> {
    let dimension = u32::try_from(vectors.ncols()).map_err(|_| {
        VectorStoreError::InvalidConfig(format!("dimension {} exceeds u32", vectors.ncols()))
    })?;
    let rows = vectors.nrows() as u64;

    let mut out = Vec::with_capacity(VECTORS_HEADER_LEN + vectors.len() * 4);
    out.extend_from_slice(VECTORS_MAGIC);
    out.extend_from_slice(&VECTORS_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&dimension.to_le_bytes());
    out.extend_from_slice(&rows.to_le_bytes());
    for v in vectors {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

fn decode_vectors(bytes: &[u8], expected_dimension: usize) -> Result<Array2<f32>> {
    if bytes.len() < VECTORS_HEADER_LEN || &bytes[0..4] != VECTORS_MAGIC {
        return Err(VectorStoreError::CorruptPersistence(
            "vectors artifact has no valid header".to_string(),
        ));
    }

    let version = read_u32(&bytes[4..8]);
    if version != VECTORS_FORMAT_VERSION {
        return Err(VectorStoreError::UnsupportedFormat(format!(
            "vectors format version {version} (expected {VECTORS_FORMAT_VERSION})"
        )));
    }

    let dimension = read_u32(&bytes[8..12]) as usize;
    if dimension != expected_dimension {
        return Err(VectorStoreError::InvalidDimension {
            expected: expected_dimension,
            actual: dimension,
        });
    }

    let rows = usize::try_from(read_u64(&bytes[12..20])).map_err(|_| {
        VectorStoreError::CorruptPersistence("vectors row count overflows usize".to_string())
    })?;
    let body = &bytes[VECTORS_HEADER_LEN..];
    let expected_len = rows
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4));
    if expected_len != Some(body.len()) {
        return Err(VectorStoreError::CorruptPersistence(format!(
            "vectors artifact declares {rows} rows of {dimension} but holds {} bytes",
            body.len()
        )));
    }

    let data: Vec<f32> = body
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Array2::from_shape_vec((rows, dimension), data)
        .map_err(|err| VectorStoreError::CorruptPersistence(format!("vectors shape: {err}")))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Best effort: the write error is what the caller reports.
fn discard_staged(paths: &[&Path]) {
    for path in paths {
        if path.is_file() {
            if let Err(err) = std::fs::remove_file(path) {
                log::warn!("Could not remove partial write {}: {err}", path.display());
            }
        }
    }
}

fn discard_stale_temp(path: &Path) -> Result<()> {
    let tmp = temp_path_for(path);
    if tmp.exists() {
        log::warn!("Removing leftover partial write {}", tmp.display());
        remove_if_exists(&tmp)?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
