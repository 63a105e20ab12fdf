//! Merge phase: flattens the sharded intermediate tree into the flat final
//! output tree, atomically.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::model::{CanonicalPolicy, Family};

pub struct Merger {
    intermediate_dir: PathBuf,
    final_dir: PathBuf,
}

impl Merger {
    #[must_use]
    pub fn new(intermediate_dir: PathBuf, final_dir: PathBuf) -> Self {
        Self {
            intermediate_dir,
            final_dir,
        }
    }

    /// For every `(policy, family)` pair, read every intermediate shard,
    /// take the sorted set-union, and write it to the final tree. The final
    /// tree is staged in a shadow directory next to `final_dir` and swapped
    /// into place with a single `rename` once every file is written, so
    /// readers never observe a partially-replaced final tree (§7's
    /// `WriteError` row).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`]/[`SyncError::Write`] if reading shards or
    /// staging/swapping the final tree fails.
    pub async fn merge(&self) -> Result<(), SyncError> {
        let staging_dir = self.shadow_dir();
        if tokio::fs::try_exists(&staging_dir).await? {
            tokio::fs::remove_dir_all(&staging_dir).await?;
        }
        tokio::fs::create_dir_all(&staging_dir).await?;

        for policy in CanonicalPolicy::ALL {
            for family in Family::ALL {
                let lines = self.read_shards(policy, family).await?;
                if lines.is_empty() {
                    continue;
                }
                let mut contents = String::new();
                for line in &lines {
                    contents.push_str(line);
                    contents.push('\n');
                }
                let file_name = format!("{}_{}.txt", policy.dir_name(), family.as_str());
                tokio::fs::write(staging_dir.join(file_name), contents.as_bytes()).await?;
            }
        }

        self.swap_in(&staging_dir).await
    }

    async fn read_shards(
        &self,
        policy: CanonicalPolicy,
        family: Family,
    ) -> Result<BTreeSet<String>, SyncError> {
        let dir = self
            .intermediate_dir
            .join(policy.dir_name())
            .join(family.as_str());

        let mut lines = BTreeSet::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(lines),
            Err(err) => return Err(SyncError::Io(err)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("list") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() {
                    lines.insert(line.to_string());
                }
            }
        }
        Ok(lines)
    }

    fn shadow_dir(&self) -> PathBuf {
        let file_name = self
            .final_dir
            .file_name()
            .map(|n| format!("{}.staging-{}", n.to_string_lossy(), std::process::id()))
            .unwrap_or_else(|| format!("staging-{}", std::process::id()));
        let mut path = self.final_dir.clone();
        path.set_file_name(file_name);
        path
    }

    async fn swap_in(&self, staging_dir: &Path) -> Result<(), SyncError> {
        if tokio::fs::try_exists(&self.final_dir).await? {
            let stale = self.stale_dir();
            tokio::fs::rename(&self.final_dir, &stale).await?;
            tokio::fs::rename(staging_dir, &self.final_dir)
                .await
                .map_err(|e| SyncError::Write(e.to_string()))?;
            tokio::fs::remove_dir_all(&stale).await.ok();
        } else {
            if let Some(parent) = self.final_dir.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(staging_dir, &self.final_dir)
                .await
                .map_err(|e| SyncError::Write(e.to_string()))?;
        }
        Ok(())
    }

    fn stale_dir(&self) -> PathBuf {
        let file_name = self
            .final_dir
            .file_name()
            .map(|n| format!("{}.stale-{}", n.to_string_lossy(), std::process::id()))
            .unwrap_or_else(|| format!("stale-{}", std::process::id()));
        let mut path = self.final_dir.clone();
        path.set_file_name(file_name);
        path
    }
}
