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

//! Write-temp-then-rename helpers
//!
//! Readers never observe a partially written file: content goes to a
//! temporary file in the destination directory, is synced, then renamed
//! into place.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// What to do when the destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Persist {
    /// Replace the destination (head pointers, config, checkout targets)
    Overwrite,
    /// Leave the destination untouched (immutable records)
    NoClobber,
}

/// Atomically write `data` to `path`.
///
/// Returns `Ok(false)` when `mode` is [`Persist::NoClobber`] and the
/// destination already existed; the temporary file is discarded.
pub(crate) fn write_atomic(path: &Path, data: &[u8], mode: Persist) -> io::Result<bool> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    match mode {
        Persist::Overwrite => {
            temp.persist(path).map_err(|e| e.error)?;
            Ok(true)
        }
        Persist::NoClobber => match temp.persist_noclobber(path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error),
        },
    }
}
