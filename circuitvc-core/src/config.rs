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

//! Repository configuration
//!
//! The `config` file at the repository root is a TOML document holding the
//! format version, the default author and the head-lock retry settings.
//! Every field is validated on load; a config that does not validate is
//! rejected rather than patched up.

use crate::error::{CircuitVcError, Result};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// On-disk format version written by this release.
pub const FORMAT_VERSION: u32 = 1;

/// Head-lock acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Attempts before giving up with a conflict (>= 1)
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_backoff_ms: u64,
    /// Relative jitter applied to each delay (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for LockConfig {
    fn default() -> Self {
        let policy = RetryPolicy::exponential();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_delay.as_millis() as u64,
            max_backoff_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl LockConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            multiplier: 2.0,
            jitter: self.jitter,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CircuitVcError::validation(
                "lock.max_attempts must be at least 1",
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(CircuitVcError::validation(
                "lock.initial_backoff_ms must not exceed lock.max_backoff_ms",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(CircuitVcError::validation(
                "lock.jitter must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}

/// Repository metadata stored in `<repo_root>/config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    pub format_version: u32,
    /// Author recorded on commits that do not name one
    pub default_author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub lock: LockConfig,
}

impl RepositoryConfig {
    pub fn new(default_author: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            default_author: default_author.into(),
            created_at: Utc::now(),
            lock: LockConfig::default(),
        }
    }

    /// Override the lock settings
    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(CircuitVcError::validation(format!(
                "unsupported repository format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        if self.default_author.trim().is_empty() {
            return Err(CircuitVcError::validation("default_author must not be empty"));
        }
        self.lock.validate()
    }

    /// Parse and validate a TOML config document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: RepositoryConfig = toml::from_str(text)
            .map_err(|e| CircuitVcError::validation(format!("malformed repository config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        self.validate()?;
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_roundtrip() {
        let config = RepositoryConfig::new("Alice");
        let text = config.to_toml().unwrap();
        assert!(text.contains("default_author = \"Alice\""));

        let parsed = RepositoryConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_lock_section_is_optional() {
        let text = r#"
format_version = 1
default_author = "Bob"
created_at = "2026-01-01T00:00:00Z"
"#;
        let config = RepositoryConfig::from_toml(text).unwrap();
        assert_eq!(config.lock, LockConfig::default());
    }

    #[test]
    fn test_rejects_missing_author() {
        let text = r#"
format_version = 1
created_at = "2026-01-01T00:00:00Z"
"#;
        let err = RepositoryConfig::from_toml(text).unwrap_err();
        assert!(matches!(err, CircuitVcError::Validation(_)));
    }

    #[test]
    fn test_rejects_blank_author() {
        let mut config = RepositoryConfig::new("Alice");
        config.default_author = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_format_version() {
        let text = r#"
format_version = 7
default_author = "Bob"
created_at = "2026-01-01T00:00:00Z"
"#;
        let err = RepositoryConfig::from_toml(text).unwrap_err();
        assert!(err.to_string().contains("format version 7"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let text = r#"
format_version = 1
default_author = "Bob"
created_at = "2026-01-01T00:00:00Z"
branch = "main"
"#;
        assert!(RepositoryConfig::from_toml(text).is_err());
    }

    #[test]
    fn test_lock_validation() {
        let config = RepositoryConfig::new("Alice").with_lock(LockConfig {
            max_attempts: 0,
            ..LockConfig::default()
        });
        assert!(config.validate().is_err());

        let config = RepositoryConfig::new("Alice").with_lock(LockConfig {
            initial_backoff_ms: 1000,
            max_backoff_ms: 10,
            ..LockConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_from_lock_config() {
        let lock = LockConfig {
            max_attempts: 3,
            initial_backoff_ms: 5,
            max_backoff_ms: 50,
            jitter: 0.0,
        };
        let policy = lock.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(5));
        assert_eq!(policy.max_delay, Duration::from_millis(50));
    }
}
