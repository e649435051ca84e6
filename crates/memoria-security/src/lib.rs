mod checksum;
mod signature;

pub use checksum::{sha256_hex, verify_sha256, Verification};
pub use signature::TrustedKey;
