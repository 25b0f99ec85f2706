//! Filesystem-based cursor storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use forward_types::Cursor;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::store::{CursorStore, StoredCursor};

/// Filesystem implementation of CursorStore trait.
///
/// Stores cursors as JSON lines, one file per state key. Each write appends a
/// line, so the file is the full advancement history of the key.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Path of the history file for `state_key`.
    ///
    /// The key is percent-encoded, so distinct keys never share a file and no
    /// key can name a path outside `dir`.
    pub fn path_for(&self, state_key: &str) -> PathBuf {
        let name = urlencoding::encode(state_key);
        self.dir.join(format!("cursor_{name}.jsonl"))
    }

    /// Every cursor written for `state_key`, oldest first.
    ///
    /// Lines that fail to parse (e.g. a write torn by a crash) are skipped.
    pub fn history(&self, state_key: &str) -> Result<Vec<StoredCursor>> {
        let path = self.path_for(state_key);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cursor file {}", path.display()))?;

        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredCursor>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    "Skipping unreadable cursor entry at {}:{}: {}",
                    path.display(),
                    lineno + 1,
                    e
                ),
            }
        }
        Ok(entries)
    }
}

/// Whether a non-empty file lacks a trailing newline.
fn ends_mid_line(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl CursorStore for FilesystemStore {
    async fn store_cursor(&self, state_key: &str, cursor: &Cursor) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create cursor directory {}", self.dir.display())
        })?;

        let path = self.path_for(state_key);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open cursor file {}", path.display()))?;

        let mut line = String::new();
        if ends_mid_line(&mut file)? {
            // Terminate a torn entry so it stays a line of its own.
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(&StoredCursor::now(cursor.clone()))?);
        line.push('\n');
        // One write call per entry keeps concurrent appends from interleaving.
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        tracing::debug!("Appended cursor for '{}' to {}", state_key, path.display());
        Ok(())
    }

    async fn read_cursor(&self, state_key: &str) -> Result<Option<StoredCursor>> {
        Ok(self.history(state_key)?.pop())
    }
}
