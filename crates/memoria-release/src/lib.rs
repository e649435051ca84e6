mod artifact;
mod retriever;

pub use artifact::{verify, FetchedArtifact, VerifiedArtifact};
pub use memoria_security::Verification;
pub use retriever::{ReleaseSource, Retriever, MANIFEST_FILE_NAME};

#[cfg(test)]
mod tests;
