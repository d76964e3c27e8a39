//! Resource State Fingerprints
//!
//! Two content hashes per resource/day row, used by downstream SCD and
//! drift-detection consumers:
//!
//! ```text
//! state_hash      = H( resource_id |#| resource_group |#| resource_name |#|
//!                      sub_account_id |#| billing_account_name |#| region_id |#|
//!                      normalized_tags )
//!
//! full_state_hash = H( resource_group |#| resource_name |#| resource_type |#|
//!                      sub_account_id |#| billing_account_name |#| region_id |#|
//!                      normalized_tags )
//! ```
//!
//! `state_hash` answers "did this resource change?" keyed by its id.
//! `full_state_hash` omits `resource_id` so structurally-identical
//! resources under different ids (other tenants, other environments) hash
//! identically and can be clustered.
//!
//! # Canonicalization
//!
//! - Absent fields render as the empty string.
//! - Fields join with `|#|`; a field containing that sequence collides with
//!   a differently-split row. Accepted limitation, no escaping.
//! - The digest is a policy knob ([`HashAlgorithm`]): md5 by default for
//!   compact 32-char fingerprints, sha256 opt-in. Switching rewrites every
//!   downstream fingerprint, so it is configuration, never a code change.

use crate::records::ResourcePerDay;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Delimiter between fields in fingerprint input strings.
pub const FIELD_DELIMITER: &str = "|#|";

/// Digest selection for both fingerprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// 128-bit digest, 32 hex chars. Content addressing, not security.
    #[default]
    Md5,
    /// 256-bit digest, 64 hex chars.
    Sha256,
}

impl HashAlgorithm {
    /// Lowercase-hex digest of `input`.
    pub fn digest_hex(self, input: &str) -> String {
        match self {
            Self::Md5 => {
                let mut hasher = Md5::new();
                hasher.update(input.as_bytes());
                format!("{:x}", hasher.finalize())
            }
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(input.as_bytes());
                format!("{:x}", hasher.finalize())
            }
        }
    }

    /// Hex characters produced per digest.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!(
                "unknown hash algorithm {:?} (expected md5 or sha256)",
                other
            )),
        }
    }
}

/// Both fingerprints for one resource/day row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprints {
    pub state_hash: String,
    pub full_state_hash: String,
}

/// Identity-scoped fingerprint, keyed by `resource_id`.
pub fn state_hash(row: &ResourcePerDay, normalized_tags: &str, algorithm: HashAlgorithm) -> String {
    let input = [
        row.resource_id.as_str(),
        row.resource_group.as_deref().unwrap_or(""),
        row.resource_name.as_deref().unwrap_or(""),
        row.sub_account_id.as_deref().unwrap_or(""),
        row.billing_account_name.as_deref().unwrap_or(""),
        row.region_id.as_deref().unwrap_or(""),
        normalized_tags,
    ]
    .join(FIELD_DELIMITER);
    algorithm.digest_hex(&input)
}

/// Identity-agnostic fingerprint: same field set minus `resource_id`, plus
/// `resource_type`, for cross-resource clustering.
pub fn full_state_hash(
    row: &ResourcePerDay,
    normalized_tags: &str,
    algorithm: HashAlgorithm,
) -> String {
    let input = [
        row.resource_group.as_deref().unwrap_or(""),
        row.resource_name.as_deref().unwrap_or(""),
        row.resource_type.as_deref().unwrap_or(""),
        row.sub_account_id.as_deref().unwrap_or(""),
        row.billing_account_name.as_deref().unwrap_or(""),
        row.region_id.as_deref().unwrap_or(""),
        normalized_tags,
    ]
    .join(FIELD_DELIMITER);
    algorithm.digest_hex(&input)
}

/// Derive both fingerprints in one call.
pub fn derive_fingerprints(
    row: &ResourcePerDay,
    normalized_tags: &str,
    algorithm: HashAlgorithm,
) -> Fingerprints {
    Fingerprints {
        state_hash: state_hash(row, normalized_tags, algorithm),
        full_state_hash: full_state_hash(row, normalized_tags, algorithm),
    }
}

// =============================================================================
// TESTS
// =============================================================================
