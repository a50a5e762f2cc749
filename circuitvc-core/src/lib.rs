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

//! Circuitvc Core
//!
//! Shared types for circuit version control: the error taxonomy, repository
//! configuration, lock retry policy and the circuit statement parser.

pub mod circuit;
pub mod config;
pub mod error;
pub mod retry;

pub use circuit::{parse_circuit, parse_payload, GateOp, Operand, Operation};
pub use config::{LockConfig, RepositoryConfig, FORMAT_VERSION};
pub use error::{CircuitVcError, ErrorKind, Result};
pub use retry::RetryPolicy;
