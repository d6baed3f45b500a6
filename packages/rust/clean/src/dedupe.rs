//! Deduplication engine: exact email matching plus fuzzy name matching.
//!
//! Email is a strong, normalizable identity key; when a record has none, a
//! case- and word-order-insensitive name similarity catches near-identical
//! entries (typos, casing, reordered tokens) without requiring exact string
//! equality.

use std::collections::HashSet;

use tracing::debug;

use contactscrub_shared::Record;

/// Fixed policy constant on a 0–100 scale, not configurable per call.
const NAME_SIMILARITY_THRESHOLD: f64 = 90.0;

/// Reduce an ordered record sequence to a deduplicated ordered subsequence.
///
/// Records with a non-empty email are kept once per `trim(lower(email))`.
/// Records without one are compared by [`token_sort_similarity`] against the
/// names of all records kept so far and dropped at or above the threshold.
/// Fuzzy comparison is skipped when either name is empty — two blank names
/// are not a meaningful duplicate signal.
///
/// Worst case is quadratic in the number of email-less records; fine for
/// per-job batches in the low thousands. Revisit with a name-prefix index if
/// volumes grow materially.
pub fn deduplicate(records: &[Record]) -> Vec<Record> {
    let mut seen_emails: HashSet<String> = HashSet::new();
    let mut keep: Vec<Record> = Vec::new();

    for record in records {
        let email = record.get("email").trim().to_lowercase();
        if !email.is_empty() {
            if seen_emails.insert(email) {
                keep.push(record.clone());
            }
            continue;
        }

        let name = record.get("name").trim();
        let duplicate = !name.is_empty()
            && keep.iter().any(|kept| {
                let kept_name = kept.get("name").trim();
                !kept_name.is_empty()
                    && token_sort_similarity(kept_name, name) >= NAME_SIMILARITY_THRESHOLD
            });
        if duplicate {
            debug!(name, "dropping near-duplicate record");
        } else {
            keep.push(record.clone());
        }
    }
    keep
}

/// Token-sort similarity on a 0–100 scale.
///
/// Both names are lowercased, whitespace-split, token-sorted, and rejoined
/// before a normalized Levenshtein comparison, so casing and word order
/// never count against a match.
pub fn token_sort_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&token_sort_key(a), &token_sort_key(b)) * 100.0
}

fn token_sort_key(s: &str) -> String {
    let mut tokens: Vec<String> = s
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
