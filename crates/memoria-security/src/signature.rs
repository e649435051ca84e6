use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Release-signing key pinned in the installer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedKey {
    key: VerifyingKey,
}

impl TrustedKey {
    pub fn from_hex(public_key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(public_key_hex.trim())
            .context("failed to decode release public key hex")?;
        let len = bytes.len();
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            anyhow!("invalid release public key length: expected 32 bytes, got {len}")
        })?;
        let key = VerifyingKey::from_bytes(&array).context("invalid release public key bytes")?;
        Ok(Self { key })
    }

    /// Returns `Ok(false)` for a well-formed signature that does not match,
    /// and an error when the signature itself cannot be decoded.
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> Result<bool> {
        let bytes =
            hex::decode(signature_hex.trim()).context("failed to decode release signature hex")?;
        let len = bytes.len();
        let array: [u8; 64] = bytes.try_into().map_err(|_| {
            anyhow!("invalid release signature length: expected 64 bytes, got {len}")
        })?;
        let signature = Signature::from_bytes(&array);
        Ok(self.key.verify(payload, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[42_u8; 32])
    }

    fn trusted() -> TrustedKey {
        TrustedKey::from_hex(&hex::encode(signing_key().verifying_key().to_bytes()))
            .expect("key must decode")
    }

    #[test]
    fn accepts_signature_over_release_payload() {
        let payload = b"1.2.0\nmemoria-1.2.0.tar.gz\nabc\n";
        let signature = hex::encode(signing_key().sign(payload).to_bytes());

        assert!(trusted().verify(payload, &signature).expect("must verify"));
    }

    #[test]
    fn rejects_signature_for_different_payload() {
        let signature = hex::encode(signing_key().sign(b"1.2.0\n").to_bytes());

        let verified = trusted()
            .verify(b"1.3.0\n", &signature)
            .expect("verification must complete");
        assert!(!verified);
    }

    #[test]
    fn malformed_signature_or_key_is_an_error() {
        assert!(trusted().verify(b"", "zz").is_err());
        assert!(trusted().verify(b"", "00").is_err());
        assert!(TrustedKey::from_hex("zz").is_err());
        assert!(TrustedKey::from_hex("00").is_err());
    }
}
