//! Dot-separated application version comparison.
//!
//! Versions are compared as tuples of unsigned integers, so `1.2.0` sorts
//! before `1.10.0`. The shorter tuple is padded with zeros.

use std::cmp::Ordering;

/// Parse `1.10.2` into `[1, 10, 2]`. Returns `None` if any component is not
/// a plain unsigned integer.
fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                part.parse::<u64>().ok()
            }
        })
        .collect()
}

/// Compare two versions numerically.
///
/// Returns `None` when either side is malformed; callers treat that as
/// "cannot decide" rather than as a failure.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let mut left = parse_version(a)?;
    let mut right = parse_version(b)?;

    let len = left.len().max(right.len());
    left.resize(len, 0);
    right.resize(len, 0);

    Some(left.cmp(&right))
}

/// Whether `current` satisfies the minimum `required` version.
///
/// `None` means the comparison was skipped because a version is malformed.
pub fn meets_minimum(current: &str, required: &str) -> Option<bool> {
    compare_versions(current, required).map(|ord| ord != Ordering::Less)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_not_lexicographic() {
        assert_eq!(compare_versions("1.2.0", "1.10.0"), Some(Ordering::Less));
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Some(Ordering::Greater));
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Some(Ordering::Equal));
        assert_eq!(compare_versions("2", "1.99.99"), Some(Ordering::Greater));
    }

    #[test]
    fn test_malformed_versions_are_undecidable() {
        assert_eq!(compare_versions("1.2.x", "1.0"), None);
        assert_eq!(compare_versions("1.0", ""), None);
        assert_eq!(compare_versions("1..0", "1.0"), None);
        assert_eq!(compare_versions("v1.0", "1.0"), None);
    }

    #[test]
    fn test_meets_minimum() {
        assert_eq!(meets_minimum("1.1.0", "1.1.0"), Some(true));
        assert_eq!(meets_minimum("1.0.9", "1.1.0"), Some(false));
        assert_eq!(meets_minimum("2.0", "1.10"), Some(true));
        assert_eq!(meets_minimum("beta", "1.0"), None);
    }
}
