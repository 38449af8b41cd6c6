//! Streaming SHA-256 computation for version files.
//!
//! Two entry points share the same buffered loop: [`compute_file_hash`] hashes
//! a file in place, and [`copy_and_hash`] hashes exactly the buffers it writes
//! to the destination, so the digest always describes the persisted copy.

use crate::error::{Result, ResultExt as _};
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Buffer size for streaming file reads (8 KB).
const BUFFER_SIZE: usize = 8192;

/// Outcome of [`copy_and_hash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    /// Lowercase hex SHA-256 of the bytes written
    pub hash: String,
    /// Number of bytes written
    pub bytes: u64,
}

/// Compute SHA-256 hash of a file using streaming I/O.
///
/// # Errors
///
/// Returns error if the file can't be opened or read.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let (hash, _) = stream(&mut reader, &mut std::io::sink())
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(hash)
}

/// Copy `source` to `dest` byte-for-byte, hashing the same buffers that are written.
///
/// `dest` is created or truncated; its parent directory must exist.
///
/// # Errors
///
/// Returns error if either file can't be opened or an I/O error occurs mid-copy.
/// A partially written destination is left in place.
pub fn copy_and_hash(source: &Path, dest: &Path) -> Result<CopiedFile> {
    let src = File::open(source)
        .with_context(|| format!("Failed to open source file: {}", source.display()))?;
    let dst = File::create(dest)
        .with_context(|| format!("Failed to create stored file: {}", dest.display()))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, src);
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dst);

    let (hash, bytes) = stream(&mut reader, &mut writer)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush stored file: {}", dest.display()))?;

    Ok(CopiedFile { hash, bytes })
}

/// Hash of an in-memory byte slice, same encoding as the streaming variants.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn stream(reader: &mut impl Read, writer: &mut impl Write) -> std::io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        let chunk = buffer.get(..bytes_read).unwrap_or_default();
        writer.write_all(chunk)?;
        hasher.update(chunk);
        total += bytes_read as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_empty_version_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("empty.jsonl");
        std::fs::write(&source, b"").unwrap();

        let copied = copy_and_hash(&source, &dir.path().join("stored.jsonl")).unwrap();
        assert_eq!(copied.bytes, 0);
        assert_eq!(copied.hash, EMPTY_DIGEST);
        assert_eq!(compute_file_hash(&source).unwrap(), EMPTY_DIGEST);
    }

    #[test]
    fn test_digest_of_ndjson_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v1.jsonl");
        std::fs::write(&path, "{\"value\": 42}\n").unwrap();

        assert_eq!(
            compute_file_hash(&path).unwrap(),
            hash_bytes(b"{\"value\": 42}\n")
        );
        assert_ne!(hash_bytes(b"{\"value\": 42}\n"), hash_bytes(b"{\"value\": 44}\n"));
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.jsonl");
        assert!(compute_file_hash(&missing).is_err());
        assert!(copy_and_hash(&missing, &dir.path().join("out.jsonl")).is_err());
        assert!(!dir.path().join("out.jsonl").exists());
    }

    #[test]
    fn test_copy_spanning_several_buffers() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.jsonl");
        let dest = dir.path().join("copy.jsonl");

        let data: Vec<u8> = (0..BUFFER_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &data).unwrap();

        let copied = copy_and_hash(&source, &dest).unwrap();

        assert_eq!(copied.bytes, data.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
        assert_eq!(copied.hash, compute_file_hash(&dest).unwrap());
        assert_eq!(copied.hash, hash_bytes(&data));
    }
}
