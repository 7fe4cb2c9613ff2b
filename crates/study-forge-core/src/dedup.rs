//! Content-hash deduplication of validated records.
//!
//! Each record's primary text is trimmed and lowercased, then hashed with
//! SHA-256. The first record with a given hash is kept; later ones are
//! dropped. Relative order of the survivors is preserved.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::models::ValidatedRecord;

/// SHA-256 of the normalized primary text of a record.
pub fn content_hash(primary_text: &str) -> [u8; 32] {
    let normalized = primary_text.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Remove records whose normalized primary text was already seen.
///
/// Returns the surviving records and the number removed.
pub fn dedupe(records: Vec<ValidatedRecord>) -> (Vec<ValidatedRecord>, usize) {
    dedupe_by(records, |r| r.primary_text().into_owned())
}

/// [`dedupe`] with a caller-supplied primary text.
pub fn dedupe_by<T, F>(records: Vec<T>, primary_text: F) -> (Vec<T>, usize)
where
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::with_capacity(records.len());
    let before = records.len();
    let kept: Vec<T> = records
        .into_iter()
        .filter(|r| seen.insert(content_hash(&primary_text(r))))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}
