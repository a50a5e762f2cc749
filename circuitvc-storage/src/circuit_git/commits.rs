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

//! Commit Graph
//!
//! Linear, append-only history per circuit name. Each commit is a JSON file
//! `commits/<circuit_name>/<sequence_number>-<commit_id>`, written once and
//! never modified. The head pointer in `refs/` decides which records are
//! part of history: a record whose sequence number is above the head was
//! left by an interrupted commit and is ignored until the next writer
//! removes it.

use super::atomic::{write_atomic, Persist};
use super::objects::{Clock, Commit, ObjectId, VersionRef};
use super::refs::{validate_circuit_name, RefStore};
use super::store::ObjectStore;
use circuitvc_core::{CircuitVcError, Result, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One commit file on disk, identified by its name alone
#[derive(Debug, Clone)]
struct RecordEntry {
    sequence_number: u64,
    id: ObjectId,
    path: PathBuf,
}

/// Head summary for one circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitInfo {
    pub name: String,
    pub head: ObjectId,
    pub versions: u64,
}

/// Commit graph over the `commits/` and `refs/` directories
#[derive(Debug, Clone)]
pub struct CommitGraph {
    dir: PathBuf,
    refs: RefStore,
    objects: ObjectStore,
    lock_policy: RetryPolicy,
}

impl CommitGraph {
    pub fn new(
        dir: impl Into<PathBuf>,
        refs: RefStore,
        objects: ObjectStore,
        lock_policy: RetryPolicy,
    ) -> Self {
        Self {
            dir: dir.into(),
            refs,
            objects,
            lock_policy,
        }
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    fn circuit_dir(&self, circuit_name: &str) -> PathBuf {
        self.dir.join(circuit_name)
    }

    /// Append a commit on top of the current head and advance the head.
    ///
    /// Serialized per circuit name by the head lock; fails with
    /// [`CircuitVcError::Conflict`] if the lock cannot be taken in time.
    pub fn append_commit(
        &self,
        circuit_name: &str,
        blob_id: ObjectId,
        author: &str,
        message: &str,
        clock: &dyn Clock,
        deadline: Option<Instant>,
    ) -> Result<Commit> {
        validate_circuit_name(circuit_name)?;
        if !self.objects.exists(&blob_id) {
            return Err(CircuitVcError::not_found(format!(
                "blob {} referenced by new commit",
                blob_id.to_hex()
            )));
        }

        let lock = self.refs.lock(circuit_name, &self.lock_policy, deadline)?;

        let parent = match self.refs.read_head(circuit_name)? {
            Some(head) => Some(self.load(circuit_name, &head)?),
            None => None,
        };
        let sequence_number = parent.as_ref().map_or(1, |p| p.sequence_number + 1);

        self.remove_orphans(circuit_name, sequence_number)?;

        let commit = Commit::new(
            circuit_name,
            blob_id,
            parent.as_ref().map(|p| p.id),
            author,
            message,
            clock.now_us(),
            sequence_number,
        )?;

        let path = self
            .circuit_dir(circuit_name)
            .join(record_file_name(sequence_number, &commit.id));
        let json = serde_json::to_vec_pretty(&commit)?;
        if !write_atomic(&path, &json, Persist::NoClobber)? {
            return Err(CircuitVcError::integrity(format!(
                "commit record {} already exists",
                path.display()
            )));
        }

        self.refs.write_head(&lock, &commit.id)?;
        drop(lock);

        info!(
            circuit = %circuit_name,
            seq = sequence_number,
            id = %commit.id,
            blob = %blob_id,
            "committed circuit version"
        );
        Ok(commit)
    }

    /// Delete records at or above `next_sequence` left by interrupted commits.
    /// Must be called with the head lock held.
    fn remove_orphans(&self, circuit_name: &str, next_sequence: u64) -> Result<()> {
        for entry in self.records(circuit_name)? {
            if entry.sequence_number >= next_sequence {
                warn!(
                    circuit = %circuit_name,
                    seq = entry.sequence_number,
                    id = %entry.id,
                    "removing orphaned commit record"
                );
                fs::remove_file(&entry.path)?;
            }
        }
        Ok(())
    }

    /// Full history, newest first. Every record is verified on the way.
    pub fn history(&self, circuit_name: &str) -> Result<Vec<Commit>> {
        let head = self.head(circuit_name)?;
        let records = self.records(circuit_name)?;

        let mut commits: Vec<Commit> = Vec::new();
        let mut current = Some(head);

        while let Some(id) = current {
            let entry = records.iter().find(|r| r.id == id).ok_or_else(|| {
                CircuitVcError::integrity(format!(
                    "history of '{}' references missing commit {}",
                    circuit_name,
                    id.to_hex()
                ))
            })?;
            let commit = read_record(entry, circuit_name)?;

            if let Some(newer) = commits.last() {
                if commit.sequence_number + 1 != newer.sequence_number {
                    return Err(CircuitVcError::integrity(format!(
                        "history of '{}' has a sequence gap between {} and {}",
                        circuit_name, commit.sequence_number, newer.sequence_number
                    )));
                }
            }

            current = commit.parent_id;
            commits.push(commit);
        }

        match commits.last() {
            Some(root) if root.sequence_number == 1 => {}
            _ => {
                return Err(CircuitVcError::integrity(format!(
                    "history of '{}' does not start at sequence 1",
                    circuit_name
                )));
            }
        }

        debug!(circuit = %circuit_name, versions = commits.len(), "loaded history");
        Ok(commits)
    }

    /// Resolve `latest`, a full id or a unique id prefix to a commit.
    pub fn resolve(&self, circuit_name: &str, version: &VersionRef) -> Result<Commit> {
        let head = self.head(circuit_name)?;

        let prefix = match version {
            VersionRef::Latest => return self.load(circuit_name, &head),
            VersionRef::Id(prefix) => prefix,
        };

        let head_seq = self.load(circuit_name, &head)?.sequence_number;
        let matches: Vec<RecordEntry> = self
            .records(circuit_name)?
            .into_iter()
            .filter(|r| r.sequence_number <= head_seq && r.id.starts_with(prefix))
            .collect();

        match matches.as_slice() {
            [] => Err(CircuitVcError::not_found(format!(
                "version '{}' of circuit '{}'",
                prefix, circuit_name
            ))),
            [entry] => read_record(entry, circuit_name),
            _ => Err(CircuitVcError::validation(format!(
                "version prefix '{}' is ambiguous for circuit '{}' ({} matches)",
                prefix,
                circuit_name,
                matches.len()
            ))),
        }
    }

    /// Every committed circuit with its head and version count
    pub fn list_circuits(&self) -> Result<Vec<CircuitInfo>> {
        let mut circuits = Vec::new();
        for name in self.refs.list()? {
            let head = self.head(&name)?;
            let commit = self.load(&name, &head)?;
            circuits.push(CircuitInfo {
                name,
                head,
                versions: commit.sequence_number,
            });
        }
        Ok(circuits)
    }

    fn head(&self, circuit_name: &str) -> Result<ObjectId> {
        self.refs.read_head(circuit_name)?.ok_or_else(|| {
            CircuitVcError::not_found(format!("circuit '{}' has no commits", circuit_name))
        })
    }

    /// Load and verify one commit by exact id
    fn load(&self, circuit_name: &str, id: &ObjectId) -> Result<Commit> {
        let records = self.records(circuit_name)?;
        let entry = records.iter().find(|r| r.id == *id).ok_or_else(|| {
            CircuitVcError::integrity(format!(
                "commit {} of '{}' is referenced but missing",
                id.to_hex(),
                circuit_name
            ))
        })?;
        read_record(entry, circuit_name)
    }

    /// Commit files of a circuit sorted by sequence number
    fn records(&self, circuit_name: &str) -> Result<Vec<RecordEntry>> {
        let dir = self.circuit_dir(circuit_name);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((sequence_number, id)) = parse_record_file_name(name) {
                records.push(RecordEntry {
                    sequence_number,
                    id,
                    path: entry.path(),
                });
            }
        }
        records.sort_by_key(|r| r.sequence_number);
        Ok(records)
    }
}

fn record_file_name(sequence_number: u64, id: &ObjectId) -> String {
    format!("{}-{}", sequence_number, id.to_hex())
}

fn parse_record_file_name(name: &str) -> Option<(u64, ObjectId)> {
    let (seq, hex) = name.split_once('-')?;
    let seq = seq.parse::<u64>().ok()?;
    let id = ObjectId::from_hex(hex).ok()?;
    Some((seq, id))
}

/// Read a commit file and check it against its file name and its own digest.
fn read_record(entry: &RecordEntry, circuit_name: &str) -> Result<Commit> {
    let text = fs::read_to_string(&entry.path)?;
    let commit: Commit = serde_json::from_str(&text).map_err(|e| {
        CircuitVcError::validation(format!(
            "malformed commit record {}: {}",
            display_name(&entry.path),
            e
        ))
    })?;

    if commit.id != entry.id
        || commit.sequence_number != entry.sequence_number
        || commit.circuit_name != circuit_name
    {
        return Err(CircuitVcError::integrity(format!(
            "commit record {} does not match its location",
            display_name(&entry.path)
        )));
    }
    commit.verify()?;
    Ok(commit)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
