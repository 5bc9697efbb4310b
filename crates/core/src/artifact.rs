// SPDX-License-Identifier: MIT

//! Final trained adapter artifact (§3, §4.G, §6 IntegrityError).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Internally generated artifact identifier (`art-<nanoid>`), unlike
    /// the client-chosen [`crate::job::JobId`].
    pub struct ArtifactId("art-");
}

/// The trained adapter as a single file on durable storage with a hash
/// (§3). `verified` is false when the locally computed SHA-256 does not
/// match the provider-reported digest, or when no digest was available
/// to compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: ArtifactId,
    pub job_id: String,
    pub path: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub created_at_ms: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub verified: bool,
}

impl Artifact {
    /// Reconcile a locally computed digest against the provider's reported
    /// digest (§6: "any mismatch with provider-reported digest, when
    /// available, marks the artifact unverified").
    pub fn verify(&mut self, provider_digest: Option<&str>) {
        self.verified = match provider_digest {
            Some(expected) => expected.eq_ignore_ascii_case(&self.sha256),
            None => false,
        };
    }
}

/// Lowercase hex SHA-256 of `bytes`, the digest format used for
/// [`Artifact::sha256`] and checkpoint blob hashing (§4.D, §4.G).
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

crate::builder! {
    pub struct ArtifactBuilder => Artifact {
        into {
            job_id: String = "job-test-1",
            path: String = "/artifacts/job-test-1/adapter_model.safetensors",
            sha256: String = "0".repeat(64),
        }
        set {
            artifact_id: ArtifactId = ArtifactId::new(),
            size_bytes: u64 = 1024,
            created_at_ms: u64 = 1_000_000,
            metadata: HashMap<String, String> = HashMap::new(),
            verified: bool = false,
        }
    }
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
