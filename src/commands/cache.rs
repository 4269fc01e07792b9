use crate::backup::Backup;
use crate::cache::CacheStore;
use crate::commands::Out;
use crate::model::Categories;
use crate::Result;
use anyhow::ensure;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// What the cache holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub path: PathBuf,
    pub entries: usize,
    pub by_category: BTreeMap<String, usize>,
    /// Entries holding the fallback category at the fallback confidence. These stay put until
    /// they are pruned.
    pub fallback: usize,
}

/// What `cache_prune` did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneReport {
    pub path: PathBuf,
    pub removed: usize,
    pub remaining: usize,
    pub backup: Option<PathBuf>,
}

/// Summarizes the cache at `path`.
pub async fn cache_stats(path: &Path, categories: &Categories) -> Result<Out<CacheStats>> {
    let cache = CacheStore::load(path).await?;
    let mut stats = CacheStats {
        path: path.to_path_buf(),
        entries: cache.len(),
        ..CacheStats::default()
    };
    for (_, entry) in cache.iter() {
        *stats.by_category.entry(entry.category.clone()).or_default() += 1;
        if entry.category == categories.fallback()
            && entry.confidence == categories.fallback_confidence()
        {
            stats.fallback += 1;
        }
    }

    let mut message = format!("{} entries in {}", stats.entries, path.display());
    for (category, count) in &stats.by_category {
        message.push_str(&format!("\n  {category}: {count}"));
    }
    if stats.fallback > 0 {
        message.push_str(&format!(
            "\n{} entries are fallbacks and will not be retried until pruned",
            stats.fallback
        ));
    }
    Ok(Out::new(message, stats))
}

/// Removes cache entries with a confidence below `below`, after backing up the cache file.
pub async fn cache_prune(path: &Path, below: f64) -> Result<Out<PruneReport>> {
    ensure!(
        (0.0..=1.0).contains(&below),
        "The confidence threshold must be between 0 and 1, got {below}"
    );
    if !path.exists() {
        return Ok(Out::new(
            format!("There is no cache at {}, nothing to prune", path.display()),
            PruneReport {
                path: path.to_path_buf(),
                ..PruneReport::default()
            },
        ));
    }

    let mut cache = CacheStore::load(path).await?;
    let removed = cache.retain(|_, entry| entry.confidence >= below);
    if removed == 0 {
        return Ok(Out::new(
            format!("No entries below {below} in {}", path.display()),
            PruneReport {
                path: path.to_path_buf(),
                removed,
                remaining: cache.len(),
                backup: None,
            },
        ));
    }

    let backup = Backup::new(path).save().await?;
    info!("Backed up the cache to {}", backup.display());
    cache.save().await?;
    let report = PruneReport {
        path: path.to_path_buf(),
        removed,
        remaining: cache.len(),
        backup: Some(backup),
    };
    Ok(Out::new(
        format!(
            "Removed {removed} entries below {below}, {} remain",
            report.remaining
        ),
        report,
    ))
}
