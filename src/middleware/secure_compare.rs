//! Constant-time byte comparison.
//!
//! Both operands are hashed to fixed-size SHA-256 digests before comparison,
//! so the comparison itself touches the same number of bytes no matter where
//! (or whether) the inputs differ, including when their lengths differ.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two byte strings in constant time.
///
/// Returns `true` only when `a` and `b` are byte-for-byte equal. Inputs of
/// different lengths are a mismatch, but the length check is folded into the
/// same constant-time result instead of returning early.
pub fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    let digest_a = Sha256::digest(a);
    let digest_b = Sha256::digest(b);

    let lengths_match = (a.len() as u64).ct_eq(&(b.len() as u64));
    let digests_match = digest_a.as_slice().ct_eq(digest_b.as_slice());

    (lengths_match & digests_match).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_compare_equal() {
        assert!(secure_compare(b"secret123", b"secret123"));
    }

    #[test]
    fn test_secure_compare_empty() {
        assert!(secure_compare(b"", b""));
        assert!(!secure_compare(b"", b"x"));
    }

    #[test]
    fn test_secure_compare_same_length_mismatch() {
        assert!(!secure_compare(b"secret123", b"secret456"));
        assert!(!secure_compare(b"Xecret123", b"secret123"));
    }

    #[test]
    fn test_secure_compare_different_lengths() {
        assert!(!secure_compare(b"short", b"much-longer-string"));
        // Prefix of the other operand must not match
        assert!(!secure_compare(b"secret", b"secret123"));
    }

    #[test]
    fn test_secure_compare_is_symmetric() {
        assert_eq!(
            secure_compare(b"alpha", b"alphabet"),
            secure_compare(b"alphabet", b"alpha")
        );
    }
}
