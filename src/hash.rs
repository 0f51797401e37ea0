//! Canonical content hashing
//!
//! The hash covers exactly the content-bearing files of an archive:
//! `task/rubric.md`, `task/prompt.md`, and every submission's
//! `content.md` / `content.pdf` / `pages/*`. Paths are sorted
//! lexicographically and fed as `path NUL bytes NUL` into one SHA-256, so the
//! result depends only on path names and content bytes. Two independently
//! built archives with identical grading content hash identically.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// True for paths whose bytes participate in the content hash.
pub fn is_content_path(path: &str) -> bool {
    if path == "task/rubric.md" || path == "task/prompt.md" {
        return true;
    }
    path.starts_with("submissions/")
        && (path.ends_with("/content.md")
            || path.ends_with("/content.pdf")
            || path.contains("/pages/"))
}

/// Compute the canonical `sha256:<hex>` content hash over a full file map.
///
/// Non-content entries (manifest, core/index JSON, additional data) are
/// ignored. The `BTreeMap` keeps iteration in lexicographic path order.
pub fn content_hash(files: &BTreeMap<String, Vec<u8>>) -> String {
    let mut hasher = Sha256::new();
    for (path, bytes) in files {
        if !is_content_path(path) {
            continue;
        }
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        hasher.update([0u8]);
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
