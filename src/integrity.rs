//! Content digests for stored dataset versions.
//!
//! Every version file is identified by the SHA-256 of its bytes. The digest is
//! a pure function of content: two versions with identical bytes share a digest,
//! which makes duplicate uploads detectable and lets an import verify each
//! archived file against the manifest before re-ingesting it.
//!
//! - [`hasher`]: streaming hash computation (8 KB buffers, O(1) memory)

pub mod hasher;

pub use hasher::{CopiedFile, compute_file_hash, copy_and_hash, hash_bytes};
