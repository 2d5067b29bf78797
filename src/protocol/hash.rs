//! Commit hash normalization and validation.
//!
//! GitMsg identifies commits by a lowercase hex hash truncated to 12
//! characters. Any hex input of at least one character is accepted and
//! canonicalized; non-hex input is rejected with a hash-format failure.

use super::ProtocolError;

/// Canonical length of a GitMsg commit hash.
pub const HASH_LEN: usize = 12;

/// Canonicalize a commit hash: lowercase and truncate to [`HASH_LEN`].
///
/// Rejects empty input and any input containing a non-hex character.
pub fn normalize(input: &str) -> Result<String, ProtocolError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProtocolError::InvalidHash(input.to_string()));
    }

    let lowered = trimmed.to_ascii_lowercase();
    let end = lowered.len().min(HASH_LEN);
    Ok(lowered[..end].to_string())
}

/// True iff the input is exactly [`HASH_LEN`] lowercase hex characters.
pub fn validate(input: &str) -> bool {
    input.len() == HASH_LEN
        && input
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_truncates() {
        assert_eq!(normalize("ABC123DEF456789").unwrap(), "abc123def456");
        assert_eq!(normalize("abc").unwrap(), "abc");
        assert_eq!(normalize("  AbC1  ").unwrap(), "abc1");
    }

    #[test]
    fn test_normalize_rejects_non_hex() {
        assert!(normalize("xyz").is_err());
        assert!(normalize("").is_err());
        assert!(normalize("abc123g").is_err());
        assert!(normalize("abc 123").is_err());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize("ABC123DEF456789").unwrap();
        assert_eq!(normalize(&once).unwrap(), once);
    }

    #[test]
    fn test_validate_exact_length() {
        assert!(validate("abc123def456"));
        assert!(!validate("abc123def45"));
        assert!(!validate("abc123def4567"));
        assert!(!validate("ABC123DEF456"));
        assert!(!validate(""));
    }
}
