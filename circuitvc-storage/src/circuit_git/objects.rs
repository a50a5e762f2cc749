// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Circuit Git Object Types
//!
//! Content-addressed identifiers and the immutable commit record.
//! A commit id is the digest of every other commit field, so editing a
//! stored record is detectable by recomputing it.

use blake3::Hasher;
use chrono::{DateTime, Utc};
use circuitvc_core::{CircuitVcError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shortest hex prefix accepted as a version reference
pub const MIN_PREFIX_LEN: usize = 4;

/// Object ID - BLAKE3 hash (32 bytes), serialized as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(pub [u8; 32]);

impl ObjectId {
    /// Create from content (content-addressable)
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Display as short hex string (like git short hash, 14 chars)
    pub fn short(&self) -> String {
        hex::encode(&self.0[..7])
    }

    /// Full hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a full 64-character hex id
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|_| CircuitVcError::validation(format!("invalid object id '{}'", hex_str)))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CircuitVcError::validation(format!(
                "invalid object id '{}' (expected 64 hex characters)",
                hex_str
            ))
        })?;
        Ok(Self(arr))
    }

    /// Check if this ID starts with the given hex prefix (short id matching)
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

impl TryFrom<String> for ObjectId {
    type Error = CircuitVcError;

    fn try_from(value: String) -> Result<Self> {
        ObjectId::from_hex(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_hex()
    }
}

/// Fields covered by the commit digest, in a fixed order.
#[derive(Serialize)]
struct CommitDigestFields<'a> {
    circuit_name: &'a str,
    blob_id: &'a [u8; 32],
    parent_id: Option<&'a [u8; 32]>,
    author: &'a str,
    message: &'a str,
    timestamp_us: u64,
    sequence_number: u64,
}

/// Commit - immutable snapshot of one circuit version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Commit {
    pub id: ObjectId,
    pub circuit_name: String,
    /// Payload blob in the object store
    pub blob_id: ObjectId,
    /// None only for the first commit of a circuit
    pub parent_id: Option<ObjectId>,
    pub author: String,
    pub message: String,
    /// Commit time (microseconds since Unix epoch)
    pub timestamp_us: u64,
    /// 1-based position in the circuit history
    pub sequence_number: u64,
}

impl Commit {
    /// Build a commit and compute its id.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        circuit_name: impl Into<String>,
        blob_id: ObjectId,
        parent_id: Option<ObjectId>,
        author: impl Into<String>,
        message: impl Into<String>,
        timestamp_us: u64,
        sequence_number: u64,
    ) -> Result<Self> {
        let mut commit = Self {
            id: ObjectId([0u8; 32]),
            circuit_name: circuit_name.into(),
            blob_id,
            parent_id,
            author: author.into(),
            message: message.into(),
            timestamp_us,
            sequence_number,
        };
        commit.id = commit.compute_id()?;
        Ok(commit)
    }

    /// Recompute the id from the other fields
    pub fn compute_id(&self) -> Result<ObjectId> {
        let fields = CommitDigestFields {
            circuit_name: &self.circuit_name,
            blob_id: self.blob_id.as_bytes(),
            parent_id: self.parent_id.as_ref().map(ObjectId::as_bytes),
            author: &self.author,
            message: &self.message,
            timestamp_us: self.timestamp_us,
            sequence_number: self.sequence_number,
        };
        let serialized = bincode::serialize(&fields)?;
        Ok(ObjectId::from_content(&serialized))
    }

    /// Fails with an integrity error if the stored id does not match.
    pub fn verify(&self) -> Result<()> {
        let expected = self.compute_id()?;
        if expected != self.id {
            return Err(CircuitVcError::integrity(format!(
                "commit {} of '{}' does not match its recomputed id {}",
                self.id.to_hex(),
                self.circuit_name,
                expected.to_hex()
            )));
        }
        Ok(())
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        micros_to_datetime(self.timestamp_us)
    }
}

/// Commit summary for history listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: ObjectId,
    pub sequence_number: u64,
    pub parent_id: Option<ObjectId>,
    pub blob_id: ObjectId,
    pub author: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitSummary {
    /// First line of the message
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

impl From<&Commit> for CommitSummary {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id,
            sequence_number: commit.sequence_number,
            parent_id: commit.parent_id,
            blob_id: commit.blob_id,
            author: commit.author.clone(),
            message: commit.message.clone(),
            timestamp: commit.timestamp(),
        }
    }
}

/// Reference to one version of a circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRef {
    /// Current head
    Latest,
    /// Full id or unique hex prefix (lowercase)
    Id(String),
}

impl VersionRef {
    pub fn id(id: &ObjectId) -> Self {
        VersionRef::Id(id.to_hex())
    }
}

impl FromStr for VersionRef {
    type Err = CircuitVcError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(VersionRef::Latest);
        }
        if s.len() < MIN_PREFIX_LEN || s.len() > 64 {
            return Err(CircuitVcError::validation(format!(
                "version reference '{}' must be 'latest' or {}-64 hex characters",
                s, MIN_PREFIX_LEN
            )));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CircuitVcError::validation(format!(
                "version reference '{}' is not hexadecimal",
                s
            )));
        }
        Ok(VersionRef::Id(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRef::Latest => write!(f, "latest"),
            VersionRef::Id(prefix) => write!(f, "{}", prefix),
        }
    }
}

/// Time source for commit timestamps
pub trait Clock: Send + Sync {
    /// Microseconds since Unix epoch
    fn now_us(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        Utc::now().timestamp_micros().max(0) as u64
    }
}

/// Clock frozen at a given instant, for reproducible commit ids
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_us(&self) -> u64 {
        self.0
    }
}

pub(crate) fn micros_to_datetime(timestamp_us: u64) -> DateTime<Utc> {
    let secs = (timestamp_us / 1_000_000) as i64;
    let nsecs = ((timestamp_us % 1_000_000) * 1000) as u32;
    DateTime::from_timestamp(secs, nsecs).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commit() -> Commit {
        Commit::new(
            "bell",
            ObjectId::from_content(b"h q[0];"),
            None,
            "Alice",
            "initial",
            1_700_000_000_000_000,
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_object_id_from_content() {
        let id1 = ObjectId::from_content(b"hello");
        let id2 = ObjectId::from_content(b"hello");
        let id3 = ObjectId::from_content(b"world");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_object_id_hex_roundtrip() {
        let id = ObjectId::from_content(b"test");
        let hex = id.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(ObjectId::from_hex(&hex).unwrap(), id);
        assert_eq!(id.short().len(), 14);
        assert!(id.starts_with(&hex[..6].to_ascii_uppercase()));
    }

    #[test]
    fn test_object_id_rejects_bad_hex() {
        assert!(ObjectId::from_hex("xyz").is_err());
        assert!(ObjectId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_commit_id_is_deterministic() {
        assert_eq!(sample_commit().id, sample_commit().id);
    }

    #[test]
    fn test_commit_id_covers_every_field() {
        let base = sample_commit();

        let mut other = base.clone();
        other.message = "edited".to_string();
        assert_ne!(other.compute_id().unwrap(), base.id);

        let mut other = base.clone();
        other.sequence_number = 2;
        assert_ne!(other.compute_id().unwrap(), base.id);

        let mut other = base.clone();
        other.parent_id = Some(base.id);
        assert_ne!(other.compute_id().unwrap(), base.id);

        let mut other = base.clone();
        other.timestamp_us += 1;
        assert_ne!(other.compute_id().unwrap(), base.id);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut commit = sample_commit();
        assert!(commit.verify().is_ok());

        commit.author = "Mallory".to_string();
        let err = commit.verify().unwrap_err();
        assert!(matches!(err, CircuitVcError::Integrity(_)));
    }

    #[test]
    fn test_commit_json_uses_hex_ids() {
        let commit = sample_commit();
        let json = serde_json::to_string(&commit).unwrap();
        assert!(json.contains(&commit.id.to_hex()));
        assert!(json.contains("\"parent_id\":null"));

        let back: Commit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, commit);
    }

    #[test]
    fn test_commit_json_rejects_unknown_fields() {
        let commit = sample_commit();
        let mut value = serde_json::to_value(&commit).unwrap();
        value["branch"] = serde_json::json!("main");
        assert!(serde_json::from_value::<Commit>(value).is_err());
    }

    #[test]
    fn test_version_ref_parsing() {
        assert_eq!("latest".parse::<VersionRef>().unwrap(), VersionRef::Latest);
        assert_eq!("LATEST".parse::<VersionRef>().unwrap(), VersionRef::Latest);
        assert_eq!(
            "ABCDEF".parse::<VersionRef>().unwrap(),
            VersionRef::Id("abcdef".to_string())
        );
        assert!("abc".parse::<VersionRef>().is_err());
        assert!("zzzz".parse::<VersionRef>().is_err());
        assert!("a".repeat(65).parse::<VersionRef>().is_err());
    }

    #[test]
    fn test_timestamp_conversion() {
        let commit = sample_commit();
        assert_eq!(commit.timestamp().timestamp(), 1_700_000_000);
        assert_eq!(micros_to_datetime(1_500_000).timestamp_subsec_micros(), 500_000);
    }

    #[test]
    fn test_summary_title_is_first_line() {
        let mut commit = sample_commit();
        commit.message = "add measurement\n\nmeasures both qubits".to_string();
        let summary = CommitSummary::from(&commit);
        assert_eq!(summary.title(), "add measurement");
        assert_eq!(summary.timestamp, commit.timestamp());
    }

    #[test]
    fn test_fixed_clock() {
        assert_eq!(FixedClock(42).now_us(), 42);
        assert!(SystemClock.now_us() > 1_600_000_000_000_000);
    }
}
