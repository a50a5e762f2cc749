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

//! Repository Lifecycle
//!
//! ```text
//! <repo_root>/
//!   config                                   TOML metadata
//!   objects/<digest>                         blobs
//!   commits/<circuit_name>/<seq>-<commit_id> commit records
//!   refs/<circuit_name>                      head commit id
//! ```

use super::atomic::{write_atomic, Persist};
use super::commits::CommitGraph;
use super::refs::RefStore;
use super::store::ObjectStore;
use circuitvc_core::{CircuitVcError, RepositoryConfig, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config";
const OBJECTS_DIR: &str = "objects";
const COMMITS_DIR: &str = "commits";
const REFS_DIR: &str = "refs";

/// An opened circuit repository
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
    config: RepositoryConfig,
    objects: ObjectStore,
    commits: CommitGraph,
}

impl Repository {
    /// Create a repository with default settings
    pub fn init(location: impl AsRef<Path>, author: &str, overwrite: bool) -> Result<Self> {
        Self::init_with_config(location, RepositoryConfig::new(author), overwrite)
    }

    /// Create a repository at `location`.
    ///
    /// Fails with [`CircuitVcError::AlreadyExists`] if one is already there,
    /// unless `overwrite` is set, in which case all prior history is removed.
    pub fn init_with_config(
        location: impl AsRef<Path>,
        config: RepositoryConfig,
        overwrite: bool,
    ) -> Result<Self> {
        let root = location.as_ref();
        config.validate()?;

        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            if !overwrite {
                return Err(CircuitVcError::AlreadyExists(format!(
                    "repository at {}",
                    root.display()
                )));
            }
            info!(path = %root.display(), "discarding existing repository");
            for sub in [OBJECTS_DIR, COMMITS_DIR, REFS_DIR] {
                remove_dir_if_present(&root.join(sub))?;
            }
        }

        for sub in [OBJECTS_DIR, COMMITS_DIR, REFS_DIR] {
            fs::create_dir_all(root.join(sub))?;
        }
        write_atomic(&config_path, config.to_toml()?.as_bytes(), Persist::Overwrite)?;

        info!(
            path = %root.display(),
            author = %config.default_author,
            "initialized circuit repository"
        );
        Ok(Self::assemble(root.to_path_buf(), config))
    }

    /// Open an existing repository
    pub fn open(location: impl AsRef<Path>) -> Result<Self> {
        let root = location.as_ref();
        let config_path = root.join(CONFIG_FILE);

        let text = match fs::read_to_string(&config_path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CircuitVcError::not_found(format!(
                    "no circuit repository at {}",
                    root.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let config = RepositoryConfig::from_toml(&text)?;

        for sub in [OBJECTS_DIR, COMMITS_DIR, REFS_DIR] {
            if !root.join(sub).is_dir() {
                return Err(CircuitVcError::integrity(format!(
                    "repository at {} is missing its {}/ directory",
                    root.display(),
                    sub
                )));
            }
        }

        debug!(path = %root.display(), "opened circuit repository");
        Ok(Self::assemble(root.to_path_buf(), config))
    }

    fn assemble(root: PathBuf, config: RepositoryConfig) -> Self {
        let objects = ObjectStore::new(root.join(OBJECTS_DIR));
        let commits = CommitGraph::new(
            root.join(COMMITS_DIR),
            RefStore::new(root.join(REFS_DIR)),
            objects.clone(),
            config.lock.retry_policy(),
        );
        Self {
            root,
            config,
            objects,
            commits,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Author used when an operation does not name one
    pub fn default_author(&self) -> &str {
        &self.config.default_author
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn commits(&self) -> &CommitGraph {
        &self.commits
    }
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
