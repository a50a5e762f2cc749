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

//! Error taxonomy shared by every circuitvc crate.
//!
//! All failures propagate unchanged to the version-control facade. Callers
//! branch on [`CircuitVcError::kind`] rather than on message text.

use thiserror::Error;

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, CircuitVcError>;

/// Errors produced by the version-control subsystem.
#[derive(Debug, Error)]
pub enum CircuitVcError {
    /// Malformed input: empty payload or message, bad circuit name, bad ref.
    #[error("validation error: {0}")]
    Validation(String),

    /// Repository, circuit name or version reference does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Another writer holds the head lock for this circuit. Retry later.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored content does not match its digest, or a commit id does not
    /// match its recomputed value. The repository is corrupt.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// `init` targeted a location that already holds a repository.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of [`CircuitVcError`], used for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integrity,
    AlreadyExists,
    Io,
}

impl ErrorKind {
    /// Process exit code for this kind (0 is reserved for success).
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Validation | ErrorKind::AlreadyExists => 1,
            ErrorKind::NotFound => 2,
            ErrorKind::Conflict => 3,
            ErrorKind::Integrity => 4,
            ErrorKind::Io => 5,
        }
    }
}

impl CircuitVcError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CircuitVcError::Validation(_) => ErrorKind::Validation,
            CircuitVcError::NotFound(_) => ErrorKind::NotFound,
            CircuitVcError::Conflict(_) => ErrorKind::Conflict,
            CircuitVcError::Integrity(_) => ErrorKind::Integrity,
            CircuitVcError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            CircuitVcError::Io(_) | CircuitVcError::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Only lock contention is worth retrying; everything else needs the
    /// caller to change something first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CircuitVcError::Conflict(_))
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

impl From<serde_json::Error> for CircuitVcError {
    fn from(err: serde_json::Error) -> Self {
        CircuitVcError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for CircuitVcError {
    fn from(err: bincode::Error) -> Self {
        CircuitVcError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for CircuitVcError {
    fn from(err: toml::ser::Error) -> Self {
        CircuitVcError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CircuitVcError::validation("x").exit_code(), 1);
        assert_eq!(CircuitVcError::not_found("x").exit_code(), 2);
        assert_eq!(CircuitVcError::conflict("x").exit_code(), 3);
        assert_eq!(CircuitVcError::integrity("x").exit_code(), 4);
        assert_eq!(CircuitVcError::AlreadyExists("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_io_errors_classified() {
        let err: CircuitVcError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(CircuitVcError::conflict("locked").is_retryable());
        assert!(!CircuitVcError::integrity("bad digest").is_retryable());
        assert!(!CircuitVcError::validation("empty").is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = CircuitVcError::not_found("circuit 'bell'");
        assert_eq!(err.to_string(), "not found: circuit 'bell'");
    }
}
