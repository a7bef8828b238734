//! Dotted version comparison for tool version thresholds.
//!
//! External tools report versions in assorted shapes (`24.0.7`, `2.24`,
//! `v2.20.2-desktop.1`). Comparison is numeric, component by component,
//! with missing trailing components treated as zero and any non-numeric
//! suffix stripped before parsing.

use std::cmp::Ordering;

/// Returns true if version `a` is greater than or equal to version `b`.
#[must_use]
pub fn version_gte(a: &str, b: &str) -> bool {
    compare(a, b) != Ordering::Less
}

/// Compare two dotted version strings numerically.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let av = components(a);
    let bv = components(b);
    let len = av.len().max(bv.len());

    for i in 0..len {
        let x = av.get(i).copied().unwrap_or(0);
        let y = bv.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// Extract the first dotted-version-looking token from free-text tool output.
///
/// `Docker version 24.0.7, build afdd53b` -> `24.0.7`.
#[must_use]
pub fn extract_version(text: &str) -> Option<String> {
    for token in text.split(|c: char| c.is_whitespace() || c == ',') {
        let trimmed = token.trim_start_matches(['v', 'V']);
        if trimmed
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
            && trimmed.contains('.')
        {
            return Some(trimmed.to_string());
        }
    }
    None
}

fn components(version: &str) -> Vec<u64> {
    version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .map(numeric_prefix)
        .collect()
}

/// Numeric prefix of a single component (`7-ce` -> 7, `rc1` -> 0).
fn numeric_prefix(component: &str) -> u64 {
    let digits: String = component
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_ordering() {
        assert!(version_gte("2", "1.9.9"));
        assert!(version_gte("20.10", "20.9"));
        assert!(version_gte("1.0", "1.0.0"));
        assert!(!version_gte("1.9.9", "2"));
        assert!(!version_gte("20.9", "20.10"));
    }

    #[test]
    fn test_equal_versions() {
        assert_eq!(compare("2.24.0", "2.24.0"), Ordering::Equal);
        assert_eq!(compare("2.24", "2.24.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_prerelease_suffix_is_stripped() {
        // Suffixes compare on their numeric prefix only.
        assert!(version_gte("2.20.2-desktop.1", "2.20.2"));
        assert!(version_gte("24.0.7-ce", "24.0.7"));
        assert!(!version_gte("2.0-rc1", "2.1"));
    }

    #[test]
    fn test_leading_v_ignored() {
        assert!(version_gte("v2.24.5", "2.0"));
        assert!(version_gte("2.24.5", "v2.0"));
    }

    #[test]
    fn test_unequal_component_counts() {
        assert!(version_gte("20.10.0.1", "20.10"));
        assert!(!version_gte("20.10", "20.10.0.1"));
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(
            extract_version("Docker version 24.0.7, build afdd53b").as_deref(),
            Some("24.0.7")
        );
        assert_eq!(
            extract_version("docker-compose version 1.29.2, build 5becea4c").as_deref(),
            Some("1.29.2")
        );
        assert_eq!(extract_version("2.24.5").as_deref(), Some("2.24.5"));
        assert_eq!(extract_version("no numbers here"), None);
    }
}
