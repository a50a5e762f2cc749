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

//! Circuitvc Storage Layer
//!
//! Filesystem-backed version control for named quantum circuits.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use circuitvc_storage::circuit_git::{Repository, VersionControl, VersionRef};
//!
//! let repo = Repository::init("/tmp/circuits", "Alice", false)?;
//! let vc = VersionControl::new(repo);
//! let c1 = vc.commit("bell", b"h q[0]; cx q[0],q[1];", "initial", None)?;
//! let payload = vc.get_version("bell", &VersionRef::id(&c1.id))?;
//! ```

pub mod circuit_git;

pub use circuit_git::{
    Commit, CommitSummary, ObjectId, Repository, VersionControl, VersionDiff, VersionRef,
};
