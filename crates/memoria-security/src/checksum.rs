use sha2::{Digest, Sha256};

/// Outcome of comparing retrieved bytes against a declared digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Mismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest comparison is case-insensitive on the declared hex string.
pub fn verify_sha256(bytes: &[u8], expected_hex: &str) -> Verification {
    compare_digest(sha256_hex(bytes), expected_hex)
}

fn compare_digest(actual: String, expected_hex: &str) -> Verification {
    let expected = expected_hex.trim();
    if actual.eq_ignore_ascii_case(expected) {
        Verification::Verified
    } else {
        Verification::Mismatch {
            expected: expected.to_ascii_lowercase(),
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(sha256_hex(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn verify_accepts_uppercase_declared_digest() {
        let verdict = verify_sha256(b"hello", &HELLO_SHA256.to_ascii_uppercase());
        assert_eq!(verdict, Verification::Verified);
    }

    #[test]
    fn verify_rejects_every_single_byte_alteration() {
        let original = b"memoria release payload".to_vec();
        let declared = sha256_hex(&original);

        for index in 0..original.len() {
            let mut altered = original.clone();
            altered[index] ^= 0x01;
            let verdict = verify_sha256(&altered, &declared);
            assert!(
                !verdict.is_verified(),
                "flipping byte {index} must not verify"
            );
        }

        let mut truncated = original.clone();
        truncated.pop();
        assert!(!verify_sha256(&truncated, &declared).is_verified());

        let mut extended = original;
        extended.push(b'\n');
        assert!(!verify_sha256(&extended, &declared).is_verified());
    }

    #[test]
    fn mismatch_reports_both_digests() {
        let verdict = verify_sha256(b"hello", &"0".repeat(64));
        match verdict {
            Verification::Mismatch { expected, actual } => {
                assert_eq!(expected, "0".repeat(64));
                assert_eq!(actual, HELLO_SHA256);
            }
            Verification::Verified => panic!("zero digest must not verify"),
        }
    }
}
