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

//! Object Store - Content-Addressable Storage
//!
//! One file per blob under `objects/`, named by the hex BLAKE3 digest of its
//! bytes. Identical payloads share one file. Every read re-hashes the
//! content, so out-of-band edits surface as integrity errors.

use super::atomic::{write_atomic, Persist};
use super::objects::ObjectId;
use circuitvc_core::{CircuitVcError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Object store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub object_count: u64,
    pub total_size_bytes: u64,
}

/// Filesystem object store. Cloning is cheap; clones share the directory.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    dir: PathBuf,
}

impl ObjectStore {
    /// Open a store rooted at an existing `objects/` directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.dir.join(id.to_hex())
    }

    /// Store a payload (idempotent - same content = same ID)
    pub fn put(&self, data: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::from_content(data);
        let path = self.object_path(&id);

        if path.exists() {
            self.check_existing(&id, data)?;
            debug!(object = %id, "object already stored");
            return Ok(id);
        }

        if write_atomic(&path, data, Persist::NoClobber)? {
            debug!(object = %id, size = data.len(), "stored object");
        } else {
            // Lost a race with a concurrent put of the same digest
            self.check_existing(&id, data)?;
        }
        Ok(id)
    }

    /// Existing content under `id` must be byte-identical to `data`.
    /// The stored file is never overwritten, even when it is the corrupt side.
    fn check_existing(&self, id: &ObjectId, data: &[u8]) -> Result<()> {
        let stored = fs::read(self.object_path(id))?;
        if stored != data {
            warn!(object = %id, "stored object differs from content with the same digest");
            return Err(CircuitVcError::integrity(format!(
                "digest collision on object {}: stored content differs from new content",
                id.to_hex()
            )));
        }
        Ok(())
    }

    /// Read and verify an object
    pub fn get(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let data = match fs::read(self.object_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CircuitVcError::not_found(format!(
                    "object {}",
                    id.to_hex()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let actual = ObjectId::from_content(&data);
        if actual != *id {
            warn!(object = %id, actual = %actual, "object content does not match its digest");
            return Err(CircuitVcError::integrity(format!(
                "object {} is corrupt (content hashes to {})",
                id.to_hex(),
                actual.to_hex()
            )));
        }
        Ok(data)
    }

    /// Check if an object exists without reading it
    pub fn exists(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// All stored object ids, sorted. Temporary files are skipped.
    pub fn list(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.len() != 64 {
                continue;
            }
            if let Ok(id) = ObjectId::from_hex(name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for id in self.list()? {
            let meta = fs::metadata(self.object_path(&id))?;
            stats.object_count += 1;
            stats.total_size_bytes += meta.len();
        }
        Ok(stats)
    }
}
