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

//! Head References
//!
//! `refs/<circuit_name>` holds the hex id of the circuit's head commit.
//! Moving a head is guarded by `refs/<circuit_name>.lock`, created with
//! exclusive-create semantics so that it works across processes. Each
//! circuit name has its own lock; there is no repository-wide lock.

use super::atomic::{write_atomic, Persist};
use super::objects::ObjectId;
use chrono::Utc;
use circuitvc_core::{CircuitVcError, Result, RetryPolicy};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

const LOCK_SUFFIX: &str = ".lock";
const MAX_NAME_LEN: usize = 255;

/// Distinguishes locks taken by different threads of one process
static LOCK_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Head pointer store
#[derive(Debug, Clone)]
pub struct RefStore {
    dir: PathBuf,
}

impl RefStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn head_path(&self, circuit_name: &str) -> PathBuf {
        self.dir.join(circuit_name)
    }

    fn lock_path(&self, circuit_name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", circuit_name, LOCK_SUFFIX))
    }

    /// Current head of a circuit, or None if it has never been committed
    pub fn read_head(&self, circuit_name: &str) -> Result<Option<ObjectId>> {
        validate_circuit_name(circuit_name)?;
        let text = match fs::read_to_string(self.head_path(circuit_name)) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ObjectId::from_hex(text.trim()).map(Some).map_err(|_| {
            CircuitVcError::validation(format!(
                "head reference for '{}' is malformed: {:?}",
                circuit_name,
                text.trim()
            ))
        })
    }

    /// Point a circuit's head at `id`. Callers must hold the [`HeadLock`].
    pub fn write_head(&self, lock: &HeadLock, id: &ObjectId) -> Result<()> {
        let path = self.head_path(&lock.circuit_name);
        write_atomic(&path, format!("{}\n", id.to_hex()).as_bytes(), Persist::Overwrite)?;
        Ok(())
    }

    /// Names of every circuit with a head, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_circuit_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Acquire the exclusive head lock for a circuit.
    ///
    /// Retries on contention following `policy`, never sleeping past
    /// `deadline`. Gives up with [`CircuitVcError::Conflict`].
    pub fn lock(
        &self,
        circuit_name: &str,
        policy: &RetryPolicy,
        deadline: Option<Instant>,
    ) -> Result<HeadLock> {
        validate_circuit_name(circuit_name)?;
        let path = self.lock_path(circuit_name);
        let attempts = policy.max_attempts.max(1);

        for attempt in 0..attempts {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let owner = format!(
                        "{} {} {}\n",
                        std::process::id(),
                        LOCK_SERIAL.fetch_add(1, Ordering::Relaxed),
                        Utc::now().to_rfc3339()
                    );
                    if let Err(e) = file.write_all(owner.as_bytes()) {
                        let _ = fs::remove_file(&path);
                        return Err(e.into());
                    }
                    debug!(circuit = %circuit_name, attempt, "acquired head lock");
                    return Ok(HeadLock {
                        path,
                        circuit_name: circuit_name.to_string(),
                        owner,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt + 1 == attempts {
                        break;
                    }
                    let mut delay = policy.delay_for_attempt(attempt);
                    if let Some(deadline) = deadline {
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        delay = delay.min(deadline - now);
                    }
                    debug!(circuit = %circuit_name, attempt, ?delay, "head lock busy, backing off");
                    thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CircuitVcError::conflict(format!(
            "circuit '{}' is being committed by another writer (lock file {}, \
             waited up to {:?}); retry later",
            circuit_name,
            path.display(),
            policy.max_total_wait()
        )))
    }
}

/// Exclusive right to move one circuit's head. Released on drop.
///
/// The lock file holds an owner line (pid, serial, acquisition time). Drop
/// only removes a file that still carries this guard's line, so a lock that
/// was deleted by hand and re-taken by another writer is left alone.
#[derive(Debug)]
pub struct HeadLock {
    path: PathBuf,
    circuit_name: String,
    owner: String,
}

impl Drop for HeadLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents == self.owner => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(lock = %self.path.display(), error = %e, "failed to release head lock");
                }
            }
            Ok(_) => {
                warn!(
                    circuit = %self.circuit_name,
                    lock = %self.path.display(),
                    "head lock was taken over by another writer; leaving it in place"
                );
            }
            Err(e) => {
                warn!(lock = %self.path.display(), error = %e, "head lock vanished before release");
            }
        }
    }
}

/// Validate a circuit name (git ref-name rules, single path component)
pub fn validate_circuit_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(CircuitVcError::validation(format!(
            "invalid circuit name '{}': {}",
            name.escape_default(),
            reason
        )))
    };

    if name.is_empty() {
        return invalid("empty name");
    }

    if name.len() > MAX_NAME_LEN {
        return invalid("longer than 255 bytes");
    }

    if name.starts_with('.') || name.ends_with('.') {
        return invalid("cannot start or end with '.'");
    }

    if name.contains("..") {
        return invalid("cannot contain '..'");
    }

    if name.ends_with(LOCK_SUFFIX) {
        return invalid("cannot end with '.lock'");
    }

    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return invalid("cannot contain whitespace or control characters");
    }

    let invalid_chars = ['/', '\\', '~', '^', ':', '?', '*', '['];
    for c in invalid_chars {
        if name.contains(c) {
            return invalid(&format!("cannot contain '{}'", c));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn refs() -> (tempfile::TempDir, RefStore) {
        let dir = tempfile::tempdir().unwrap();
        let refs = RefStore::new(dir.path());
        (dir, refs)
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_head_roundtrip() {
        let (_dir, refs) = refs();
        assert_eq!(refs.read_head("bell").unwrap(), None);

        let id = ObjectId::from_content(b"commit");
        let lock = refs.lock("bell", &quick_policy(1), None).unwrap();
        refs.write_head(&lock, &id).unwrap();
        drop(lock);

        assert_eq!(refs.read_head("bell").unwrap(), Some(id));
        assert_eq!(refs.list().unwrap(), vec!["bell".to_string()]);
    }

    #[test]
    fn test_lock_is_exclusive_per_name() {
        let (dir, refs) = refs();

        let held = refs.lock("bell", &quick_policy(1), None).unwrap();
        assert!(dir.path().join("bell.lock").exists());

        let err = refs.lock("bell", &quick_policy(3), None).unwrap_err();
        assert!(matches!(err, CircuitVcError::Conflict(_)));

        // A different circuit is unaffected
        let other = refs.lock("ghz", &quick_policy(1), None).unwrap();
        drop(other);

        drop(held);
        assert!(!dir.path().join("bell.lock").exists());
        assert!(refs.lock("bell", &quick_policy(1), None).is_ok());
    }

    #[test]
    fn test_lock_respects_deadline() {
        let (_dir, refs) = refs();
        let _held = refs.lock("bell", &quick_policy(1), None).unwrap();

        let slow = RetryPolicy {
            max_attempts: 100,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.0,
        };
        let start = Instant::now();
        let deadline = start + Duration::from_millis(50);
        let err = refs.lock("bell", &slow, Some(deadline)).unwrap_err();

        assert!(err.is_retryable());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_drop_leaves_a_lock_it_no_longer_owns() {
        let (dir, refs) = refs();
        let lock_path = dir.path().join("bell.lock");

        let stale = refs.lock("bell", &quick_policy(1), None).unwrap();
        // An operator clears the lock and another writer takes it
        fs::remove_file(&lock_path).unwrap();
        let current = refs.lock("bell", &quick_policy(1), None).unwrap();

        drop(stale);
        assert!(lock_path.exists());
        assert!(refs.lock("bell", &quick_policy(1), None).is_err());

        drop(current);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_lock_files_are_not_listed() {
        let (_dir, refs) = refs();
        let _held = refs.lock("bell", &quick_policy(1), None).unwrap();
        assert!(refs.list().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_head_is_validation_error() {
        let (dir, refs) = refs();
        fs::write(dir.path().join("bell"), "not-a-commit-id").unwrap();
        assert!(matches!(
            refs.read_head("bell"),
            Err(CircuitVcError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_circuit_name() {
        assert!(validate_circuit_name("bell").is_ok());
        assert!(validate_circuit_name("ghz_5-qubit.v2").is_ok());

        assert!(validate_circuit_name("").is_err());
        assert!(validate_circuit_name(".hidden").is_err());
        assert!(validate_circuit_name("trailing.").is_err());
        assert!(validate_circuit_name("a..b").is_err());
        assert!(validate_circuit_name("a/b").is_err());
        assert!(validate_circuit_name("a\\b").is_err());
        assert!(validate_circuit_name("with space").is_err());
        assert!(validate_circuit_name("tab\there").is_err());
        assert!(validate_circuit_name("what?").is_err());
        assert!(validate_circuit_name("head.lock").is_err());
        assert!(validate_circuit_name(&"x".repeat(256)).is_err());
    }
}
