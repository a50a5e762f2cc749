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

//! Git-Like Circuit Versioning
//!
//! A content-addressable version control system for quantum circuit
//! sources, inspired by Git's object model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      VersionControl (facade)                    │
//! │   commit · list_versions · get_version · checkout · diff        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐        │
//! │  │ ObjectStore │◄────│ CommitGraph │────►│  RefStore   │        │
//! │  │  objects/   │     │  commits/   │     │ refs/ +lock │        │
//! │  └─────────────┘     └─────────────┘     └─────────────┘        │
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────────────────────────┐        │
//! │  │ Repository  │     │ DiffEngine (LCS over operations)│        │
//! │  │ init / open │     └─────────────────────────────────┘        │
//! │  └─────────────┘                                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Content-Addressable Storage**: Same payload = same BLAKE3 id
//! - **Tamper Evidence**: Commit ids cover every commit field
//! - **Linear History**: One parent per commit, gapless sequence numbers
//! - **Per-Circuit Locking**: Commits to different circuits never block each other
//! - **Structural Diffing**: Gate-level LCS instead of line diffs

mod atomic;
pub mod commits;
pub mod diff;
pub mod objects;
pub mod refs;
pub mod repository;
pub mod store;
pub mod version_control;

pub use commits::{CircuitInfo, CommitGraph};
pub use diff::{CircuitDiff, DiffConfig, DiffEngine, DiffSegment, DiffStats, SegmentKind};
pub use objects::{
    Clock, Commit, CommitSummary, FixedClock, ObjectId, SystemClock, VersionRef, MIN_PREFIX_LEN,
};
pub use refs::{validate_circuit_name, HeadLock, RefStore};
pub use repository::Repository;
pub use store::{ObjectStore, StoreStats};
pub use version_control::{RepositoryStats, VerifyReport, VersionControl, VersionDiff};
