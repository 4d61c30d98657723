// Shared helpers for integration tests

use std::fs;

/// Read a file shipped under assets/
pub fn read_asset(name: &str) -> String {
    let path = format!("assets/{}", name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read asset {}: {}", path, e))
}

/// Count non-overlapping occurrences of a substring
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_occurrences() {
        assert_eq!(count_occurrences("a b a b a", "a"), 3);
        assert_eq!(count_occurrences("a b a b a", "c"), 0);
    }
}
