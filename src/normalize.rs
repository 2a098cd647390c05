// 🔑 Description Normalizer + Dedupe Hasher
// Canonical text for rule matching, content-addressed identity for upserts

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Hash algorithm version, stamped into transaction metadata at assembly
/// time. Bump this if `normalize_description` or `dedupe_hash` ever change;
/// stored hashes computed under an older version cannot be compared with
/// freshly computed ones.
pub const HASH_VERSION: u32 = 1;

/// Canonicalize a free-text transaction description.
///
/// NFKD-decomposes (dropping the combining marks that decomposition splits
/// off), lowercases, collapses every run of non-alphanumeric characters to
/// a single space, and trims. Pure and total: any input yields some output.
///
/// Applied once at write time, before hashing. Never re-applied at read
/// time, so the algorithm is frozen under `HASH_VERSION`.
pub fn normalize_description(description: &str) -> String {
    let mut out = String::with_capacity(description.len());
    let mut pending_space = false;

    for ch in description.nfkd() {
        if is_combining_mark(ch) {
            // Diacritics split off by decomposition vanish without
            // breaking the word
            continue;
        }
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_space = true;
        }
    }

    out
}

/// Compute the content-addressed dedupe hash for a transaction.
///
/// SHA-256 hex over the pipe-joined tuple
/// `account_id|YYYY-MM-DD|amount(2dp)|CURRENCY|normalized_description`.
/// Two transactions with the same hash are treated as the same economic
/// event: the second upsert replaces the first.
pub fn dedupe_hash(
    account_id: &str,
    posted: NaiveDate,
    amount: f64,
    currency: &str,
    normalized_description: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{:.2}|{}|{}",
        account_id,
        posted.format("%Y-%m-%d"),
        amount,
        currency.to_uppercase(),
        normalized_description,
    ));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================
