//! Per-row checkpoint store.
//!
//! # File Format
//!
//! ```text
//! [magic: 8 bytes]     b"SIMROW\0\0"
//! [version: u16]       1
//! [index: u64]         row index (informational)
//! [len: u64]           number of values
//! [values: f64 × len]
//! [digest: 32 bytes]   SHA256 of everything above
//! ```
//!
//! All integers and floats are little-endian. Loaded rows are not checked
//! against the current image count.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, SimilarityError};

const MAGIC: &[u8; 8] = b"SIMROW\0\0";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 8 + 2 + 8 + 8;
const DIGEST_SIZE: usize = 32;

/// Default checkpoint directory, relative to the working directory.
pub const DEFAULT_CHECKPOINT_DIR: &str = "./checkpoints";

/// Directory of `similarity_matrix_row{i}.bin` files.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_DIR)
    }
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("similarity_matrix_row{index}.bin"))
    }

    fn temp_path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("similarity_matrix_row{index}.bin.tmp"))
    }

    /// Load row `index`, or `None` when no checkpoint exists.
    ///
    /// The directory itself is never created or checked here. Anything that
    /// does not stat as a regular file counts as no checkpoint.
    pub fn load(&self, index: usize) -> Result<Option<Vec<f64>>> {
        let path = self.path_for(index);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            _ => return Ok(None),
        }
        let bytes = fs::read(&path)
            .map_err(|source| SimilarityError::CheckpointRead { path: path.clone(), source })?;
        let row = decode_row(&bytes)
            .map_err(|reason| SimilarityError::CheckpointCorrupt { path: path.clone(), reason })?;
        debug!(row = index, path = %path.display(), "checkpoint hit");
        Ok(Some(row))
    }

    /// Persist row `index`, replacing any existing checkpoint.
    ///
    /// Writes to a per-row temporary file and renames it into place, so an
    /// interrupted write never leaves a truncated checkpoint behind.
    pub fn save(&self, index: usize, row: &[f64]) -> Result<()> {
        // create_dir_all tolerates a directory that already exists
        fs::create_dir_all(&self.dir).map_err(|source| SimilarityError::CheckpointWrite {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(index);
        let tmp = self.temp_path_for(index);
        let bytes = encode_row(index, row);
        if let Err(source) = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(SimilarityError::CheckpointWrite { path, source });
        }
        debug!(row = index, path = %path.display(), "checkpoint written");
        Ok(())
    }

    /// Delete the checkpoint for row `index`. Missing files are not an error.
    pub fn remove(&self, index: usize) -> Result<()> {
        match fs::remove_file(self.path_for(index)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Delete every row checkpoint in the directory. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("similarity_matrix_row")
                && (name.ends_with(".bin") || name.ends_with(".bin.tmp"))
            {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn encode_row(index: usize, row: &[f64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + row.len() * 8 + DIGEST_SIZE);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&(index as u64).to_le_bytes());
    buf.extend_from_slice(&(row.len() as u64).to_le_bytes());
    for v in row {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    let digest: [u8; 32] = Sha256::digest(&buf).into();
    buf.extend_from_slice(&digest);
    buf
}

fn decode_row(bytes: &[u8]) -> std::result::Result<Vec<f64>, String> {
    if bytes.len() < HEADER_SIZE + DIGEST_SIZE {
        return Err(format!("file too short ({} bytes)", bytes.len()));
    }
    if &bytes[..8] != MAGIC {
        return Err("bad magic".to_string());
    }

    let (body, stored) = bytes.split_at(bytes.len() - DIGEST_SIZE);
    let actual = Sha256::digest(body);
    if actual.as_slice() != stored {
        return Err(format!(
            "digest mismatch: stored {}, computed {}",
            hex::encode(stored),
            hex::encode(actual)
        ));
    }

    let version = u16::from_le_bytes([bytes[8], bytes[9]]);
    if version != VERSION {
        return Err(format!("unsupported version {version}"));
    }
    let len = read_u64(&body[18..26]) as usize;
    let payload = &body[HEADER_SIZE..];
    if payload.len() != len.saturating_mul(8) {
        return Err(format!("expected {len} values, found {} bytes", payload.len()));
    }

    Ok(payload
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap_or([0; 8])))
        .collect())
}

fn read_u64(b: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&b[..8]);
    u64::from_le_bytes(arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("never_created"));
        assert!(store.load(0).unwrap().is_none());
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_non_directory_parent_is_none() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let store = CheckpointStore::new(blocker.join("checkpoints"));
        assert!(store.load(0).unwrap().is_none());
    }

    #[test]
    fn test_directory_at_row_path_is_none() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::create_dir(store.path_for(2)).unwrap();
        assert!(store.load(2).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested/checkpoints"));
        store.save(3, &[0.0, 0.0, 0.0, 1.0, 0.25]).unwrap();
        assert!(store.path_for(3).ends_with("similarity_matrix_row3.bin"));
        assert_eq!(store.load(3).unwrap().unwrap(), vec![0.0, 0.0, 0.0, 1.0, 0.25]);
        assert!(!store.temp_path_for(3).exists());
    }

    #[test]
    fn test_overwrite() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(0, &[1.0, 0.5]).unwrap();
        store.save(0, &[1.0, 0.7, 0.1]).unwrap();
        assert_eq!(store.load(0).unwrap().unwrap(), vec![1.0, 0.7, 0.1]);
    }

    #[test]
    fn test_corrupt_detected() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(1, &[0.0, 1.0, 0.3]).unwrap();

        let path = store.path_for(1);
        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();
        let err = store.load(1).unwrap_err();
        assert!(matches!(err, SimilarityError::CheckpointCorrupt { .. }));

        fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            store.load(1),
            Err(SimilarityError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn test_uncreatable_dir() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let store = CheckpointStore::new(blocker.join("checkpoints"));
        let err = store.save(0, &[1.0]).unwrap_err();
        assert!(matches!(err, SimilarityError::CheckpointWrite { .. }));
        assert!(!store.path_for(0).exists());
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        for i in 0..3 {
            store.save(i, &[1.0]).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        fs::write(store.temp_path_for(7), b"torn").unwrap();

        store.remove(0).unwrap();
        store.remove(0).unwrap();
        assert!(store.load(0).unwrap().is_none());

        assert_eq!(store.clear().unwrap(), 3);
        assert!(!store.temp_path_for(7).exists());
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(CheckpointStore::new(dir.path().join("absent")).clear().unwrap(), 0);
    }
}
