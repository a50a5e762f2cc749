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

//! Version Control Facade
//!
//! The operation surface external callers use: commit, list, get, checkout
//! and diff, plus repository-wide verify and stats. Every error from the
//! layers below is passed through unchanged.

use super::atomic::{write_atomic, Persist};
use super::commits::CircuitInfo;
use super::diff::{CircuitDiff, DiffEngine};
use super::objects::{Clock, Commit, CommitSummary, SystemClock, VersionRef};
use super::refs::validate_circuit_name;
use super::repository::Repository;
use super::store::StoreStats;
use circuitvc_core::{CircuitVcError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Structural diff between two versions of one circuit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub circuit_name: String,
    pub from: CommitSummary,
    pub to: CommitSummary,
    pub diff: CircuitDiff,
}

/// Outcome of a full repository check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyReport {
    pub objects_checked: u64,
    pub circuits_checked: u64,
    pub commits_checked: u64,
    pub problems: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Repository-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStats {
    #[serde(flatten)]
    pub objects: StoreStats,
    pub circuit_count: u64,
    pub commit_count: u64,
}

/// Circuit version control over one repository
pub struct VersionControl {
    repo: Repository,
    diff_engine: DiffEngine,
    clock: Arc<dyn Clock>,
}

impl VersionControl {
    pub fn new(repo: Repository) -> Self {
        Self::with_clock(repo, Arc::new(SystemClock))
    }

    /// Use a custom time source for commit timestamps
    pub fn with_clock(repo: Repository, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            diff_engine: DiffEngine::new(),
            clock,
        }
    }

    pub fn with_diff_engine(mut self, diff_engine: DiffEngine) -> Self {
        self.diff_engine = diff_engine;
        self
    }

    /// Open the repository at `location`
    pub fn open(location: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Repository::open(location)?))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Commit a new version of a circuit
    pub fn commit(
        &self,
        circuit_name: &str,
        payload: &[u8],
        message: &str,
        author: Option<&str>,
    ) -> Result<Commit> {
        self.commit_with_timeout(circuit_name, payload, message, author, None)
    }

    /// Commit, giving up with a conflict if the circuit's head lock is not
    /// acquired within `timeout`
    pub fn commit_with_timeout(
        &self,
        circuit_name: &str,
        payload: &[u8],
        message: &str,
        author: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Commit> {
        let deadline = timeout.map(|t| Instant::now() + t);

        validate_circuit_name(circuit_name)?;
        if payload.is_empty() {
            return Err(CircuitVcError::validation("circuit payload is empty"));
        }
        if message.trim().is_empty() {
            return Err(CircuitVcError::validation("commit message is empty"));
        }
        let author = match author {
            Some(author) if author.trim().is_empty() => {
                return Err(CircuitVcError::validation("author is empty"));
            }
            Some(author) => author,
            None => self.repo.default_author(),
        };

        let blob_id = self.repo.objects().put(payload)?;
        self.repo.commits().append_commit(
            circuit_name,
            blob_id,
            author,
            message,
            self.clock.as_ref(),
            deadline,
        )
    }

    /// History of a circuit, newest first
    pub fn list_versions(&self, circuit_name: &str) -> Result<Vec<CommitSummary>> {
        let history = self.repo.commits().history(circuit_name)?;
        Ok(history.iter().map(CommitSummary::from).collect())
    }

    /// Resolve a version reference to its commit
    pub fn resolve(&self, circuit_name: &str, version: &VersionRef) -> Result<Commit> {
        self.repo.commits().resolve(circuit_name, version)
    }

    /// Payload of one version. Read-only.
    pub fn get_version(&self, circuit_name: &str, version: &VersionRef) -> Result<Vec<u8>> {
        let commit = self.resolve(circuit_name, version)?;
        self.read_blob(&commit)
    }

    /// Write one version's payload to `output_path`, replacing the file
    /// atomically. Repository state is not touched.
    pub fn checkout(
        &self,
        circuit_name: &str,
        version: &VersionRef,
        output_path: impl AsRef<Path>,
    ) -> Result<Commit> {
        let commit = self.resolve(circuit_name, version)?;
        let payload = self.read_blob(&commit)?;
        let output_path = output_path.as_ref();
        write_atomic(output_path, &payload, Persist::Overwrite)?;

        info!(
            circuit = %circuit_name,
            id = %commit.id,
            path = %output_path.display(),
            "checked out circuit version"
        );
        Ok(commit)
    }

    /// Structural diff between two versions
    pub fn diff_versions(
        &self,
        circuit_name: &str,
        from: &VersionRef,
        to: &VersionRef,
    ) -> Result<VersionDiff> {
        let (from_commit, from_payload) = self.load_version(circuit_name, from)?;
        let (to_commit, to_payload) = self.load_version(circuit_name, to)?;

        let diff = self.diff_engine.diff_payloads(&from_payload, &to_payload);
        debug!(
            circuit = %circuit_name,
            from = %from_commit.id,
            to = %to_commit.id,
            segments = diff.segments.len(),
            "computed structural diff"
        );

        Ok(VersionDiff {
            circuit_name: circuit_name.to_string(),
            from: CommitSummary::from(&from_commit),
            to: CommitSummary::from(&to_commit),
            diff,
        })
    }

    /// Line-level unified diff between two versions
    pub fn unified_diff(
        &self,
        circuit_name: &str,
        from: &VersionRef,
        to: &VersionRef,
    ) -> Result<String> {
        let (from_commit, from_payload) = self.load_version(circuit_name, from)?;
        let (to_commit, to_payload) = self.load_version(circuit_name, to)?;

        Ok(self.diff_engine.unified_text(
            &from_payload,
            &to_payload,
            &format!("{}@{}", circuit_name, from_commit.id.short()),
            &format!("{}@{}", circuit_name, to_commit.id.short()),
        ))
    }

    /// Every committed circuit with its head and version count
    pub fn list_circuits(&self) -> Result<Vec<CircuitInfo>> {
        self.repo.commits().list_circuits()
    }

    /// Re-hash every object and walk every history.
    ///
    /// Corruption is reported in the returned [`VerifyReport`]; only I/O
    /// failures that prevent the walk itself are returned as errors.
    pub fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        let objects = self.repo.objects();

        for id in objects.list()? {
            report.objects_checked += 1;
            if let Err(e) = objects.get(&id) {
                report.problems.push(e.to_string());
            }
        }

        for name in self.repo.commits().refs().list()? {
            report.circuits_checked += 1;
            let history = match self.repo.commits().history(&name) {
                Ok(history) => history,
                Err(e) => {
                    report.problems.push(format!("circuit '{}': {}", name, e));
                    continue;
                }
            };
            for commit in &history {
                report.commits_checked += 1;
                if !objects.exists(&commit.blob_id) {
                    report.problems.push(format!(
                        "circuit '{}': commit {} references missing blob {}",
                        name,
                        commit.id.to_hex(),
                        commit.blob_id.to_hex()
                    ));
                }
            }
        }

        if report.is_clean() {
            info!(
                objects = report.objects_checked,
                commits = report.commits_checked,
                "repository verified"
            );
        } else {
            warn!(problems = report.problems.len(), "repository verification found problems");
        }
        Ok(report)
    }

    pub fn stats(&self) -> Result<RepositoryStats> {
        let circuits = self.list_circuits()?;
        Ok(RepositoryStats {
            objects: self.repo.objects().stats()?,
            circuit_count: circuits.len() as u64,
            commit_count: circuits.iter().map(|c| c.versions).sum(),
        })
    }

    fn load_version(&self, circuit_name: &str, version: &VersionRef) -> Result<(Commit, Vec<u8>)> {
        let commit = self.resolve(circuit_name, version)?;
        let payload = self.read_blob(&commit)?;
        Ok((commit, payload))
    }

    fn read_blob(&self, commit: &Commit) -> Result<Vec<u8>> {
        self.repo.objects().get(&commit.blob_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_git::diff::SegmentKind;
    use crate::circuit_git::objects::FixedClock;
    use circuitvc_core::ErrorKind;

    fn setup() -> (tempfile::TempDir, VersionControl) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), "Alice", false).unwrap();
        let vc = VersionControl::with_clock(repo, Arc::new(FixedClock(1_700_000_000_000_000)));
        (dir, vc)
    }

    #[test]
    fn test_commit_uses_default_author() {
        let (_dir, vc) = setup();
        let c1 = vc.commit("bell", b"h q[0];", "initial", None).unwrap();
        assert_eq!(c1.author, "Alice");

        let c2 = vc.commit("bell", b"x q[0];", "flip", Some("Bob")).unwrap();
        assert_eq!(c2.author, "Bob");
    }

    #[test]
    fn test_commit_validation() {
        let (_dir, vc) = setup();

        let cases = [
            vc.commit("bell", b"", "msg", None),
            vc.commit("bell", b"h q[0];", "", None),
            vc.commit("bell", b"h q[0];", "   ", None),
            vc.commit("bell", b"h q[0];", "msg", Some(" ")),
            vc.commit("bad/name", b"h q[0];", "msg", None),
        ];
        for result in cases {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
        }
        assert!(vc.list_circuits().unwrap().is_empty());
    }

    #[test]
    fn test_get_version_roundtrip() {
        let (_dir, vc) = setup();
        let c1 = vc.commit("bell", b"h q[0];", "one", None).unwrap();
        vc.commit("bell", b"h q[0]; cx q[0],q[1];", "two", None).unwrap();

        assert_eq!(vc.get_version("bell", &VersionRef::id(&c1.id)).unwrap(), b"h q[0];");
        assert_eq!(
            vc.get_version("bell", &VersionRef::Latest).unwrap(),
            b"h q[0]; cx q[0],q[1];"
        );
    }

    #[test]
    fn test_checkout_writes_file() {
        let (dir, vc) = setup();
        let c1 = vc.commit("bell", b"h q[0];", "one", None).unwrap();
        let out = dir.path().join("work").join("bell.qasm");

        let resolved = vc.checkout("bell", &VersionRef::Latest, &out).unwrap();
        assert_eq!(resolved.id, c1.id);
        assert_eq!(std::fs::read(&out).unwrap(), b"h q[0];");
        assert_eq!(vc.list_versions("bell").unwrap().len(), 1);
    }

    #[test]
    fn test_diff_versions() {
        let (_dir, vc) = setup();
        let c1 = vc.commit("bell", b"h q[0]; cx q[0],q[1];", "initial", None).unwrap();
        let c2 = vc
            .commit("bell", b"h q[0]; cx q[0],q[1]; measure q->c;", "add measurement", None)
            .unwrap();

        let diff = vc
            .diff_versions("bell", &VersionRef::id(&c1.id), &VersionRef::id(&c2.id))
            .unwrap();
        assert_eq!(diff.from.id, c1.id);
        assert_eq!(diff.to.id, c2.id);
        let kinds: Vec<SegmentKind> = diff.diff.segments.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SegmentKind::Kept, SegmentKind::Inserted]);

        let unified = vc
            .unified_diff("bell", &VersionRef::id(&c1.id), &VersionRef::Latest)
            .unwrap();
        assert!(unified.contains("measure"));
    }

    #[test]
    fn test_verify_clean_and_corrupt() {
        let (dir, vc) = setup();
        let c1 = vc.commit("bell", b"h q[0];", "one", None).unwrap();
        vc.commit("ghz", b"h q[0]; cx q[0],q[1]; cx q[1],q[2];", "one", None)
            .unwrap();

        let report = vc.verify().unwrap();
        assert!(report.is_clean(), "{:?}", report.problems);
        assert_eq!(report.objects_checked, 2);
        assert_eq!(report.circuits_checked, 2);
        assert_eq!(report.commits_checked, 2);

        std::fs::write(dir.path().join("objects").join(c1.blob_id.to_hex()), b"junk").unwrap();
        let report = vc.verify().unwrap();
        assert_eq!(report.problems.len(), 1);
    }

    #[test]
    fn test_stats() {
        let (_dir, vc) = setup();
        vc.commit("bell", b"h q[0];", "one", None).unwrap();
        vc.commit("bell", b"x q[0];", "two", None).unwrap();
        vc.commit("ghz", b"h q[0];", "same payload as bell v1", None).unwrap();

        let stats = vc.stats().unwrap();
        assert_eq!(stats.objects.object_count, 2);
        assert_eq!(stats.circuit_count, 2);
        assert_eq!(stats.commit_count, 3);
    }
}
