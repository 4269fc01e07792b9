//! Rotating backups of files the program is about to rewrite destructively.

use crate::{utils, Result};
use anyhow::Context;
use chrono::Local;
use std::path::PathBuf;
use tracing::debug;

/// The name of the directory, next to the backed up file, that holds its backups.
pub const BACKUPS_DIR: &str = "backups";

/// How many backups of a file are kept.
pub const DEFAULT_BACKUP_COPIES: u32 = 5;

/// Manages backup file creation and rotation for one file.
///
/// Backups are named `{stem}.YYYY-MM-DD-NNN.{extension}`, where NNN is a sequence number within the
/// day, so they sort oldest to newest by name.
#[derive(Debug, Clone)]
pub struct Backup {
    source: PathBuf,
    backups_dir: PathBuf,
    backup_copies: u32,
    stem: String,
    extension: String,
}

impl Backup {
    /// Backups of `source` kept in a `backups` directory beside it.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let backups_dir = utils::parent_dir(&source).join(BACKUPS_DIR);
        Self::with_dir(source, backups_dir, DEFAULT_BACKUP_COPIES)
    }

    pub fn with_dir(
        source: impl Into<PathBuf>,
        backups_dir: impl Into<PathBuf>,
        backup_copies: u32,
    ) -> Self {
        let source = source.into();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "backup".to_string());
        let extension = source
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            source,
            backups_dir: backups_dir.into(),
            backup_copies: backup_copies.max(1),
            stem,
            extension,
        }
    }

    /// Copies the source file into the backups directory and deletes the oldest backups beyond
    /// `backup_copies`. Returns the path of the new backup.
    pub async fn save(&self) -> Result<PathBuf> {
        utils::make_dir(&self.backups_dir).await?;
        let date = today();
        let seq = self.next_sequence_number(&date).await?;
        let path = self.backups_dir.join(self.file_name(&date, seq));

        utils::copy(&self.source, &path)
            .await
            .with_context(|| format!("Unable to back up {}", self.source.display()))?;
        debug!("Backed up {} to {}", self.source.display(), path.display());

        self.rotate().await?;
        Ok(path)
    }

    fn file_name(&self, date: &str, seq: u32) -> String {
        if self.extension.is_empty() {
            format!("{}.{date}-{seq:03}", self.stem)
        } else {
            format!("{}.{date}-{seq:03}.{}", self.stem, self.extension)
        }
    }

    /// The sequence number that follows the highest one used today.
    async fn next_sequence_number(&self, date: &str) -> Result<u32> {
        let mut max_seq: u32 = 0;
        for name in self.backup_names().await? {
            if let Some((d, seq)) = parse_backup_name(&name, &self.stem, &self.extension) {
                if d == date {
                    max_seq = max_seq.max(seq);
                }
            }
        }
        Ok(max_seq + 1)
    }

    /// Deletes the oldest backups so that at most `backup_copies` remain.
    async fn rotate(&self) -> Result<()> {
        let mut names = self.backup_names().await?;
        names.sort();
        let to_delete = names.len().saturating_sub(self.backup_copies as usize);
        for name in names.into_iter().take(to_delete) {
            utils::remove(self.backups_dir.join(&name)).await?;
            debug!("Removed old backup {name}");
        }
        Ok(())
    }

    async fn backup_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if parse_backup_name(&name, &self.stem, &self.extension).is_some() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Returns today's date in YYYY-MM-DD format.
fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Splits `{stem}.{YYYY-MM-DD}-{NNN}[.{extension}]` into its date and sequence number.
fn parse_backup_name<'a>(name: &'a str, stem: &str, extension: &str) -> Option<(&'a str, u32)> {
    let rest = name.strip_prefix(stem)?.strip_prefix('.')?;
    let rest = if extension.is_empty() {
        rest
    } else {
        rest.strip_suffix(extension)?.strip_suffix('.')?
    };
    // The date itself contains dashes, so split on the last one.
    let (date, seq) = rest.rsplit_once('-')?;
    if date.len() != 10 || seq.len() != 3 {
        return None;
    }
    Some((date, seq.parse().ok()?))
}
