//! Durable cursor storage.

use crate::traits::CursorStore;
use crate::types::MentionId;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const CURSOR_FILE_NAME: &str = "last_mention_id.txt";

/// Cursor kept in a single text file, overwritten on every commit.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
        Self::new(state_dir.as_ref().join(CURSOR_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CURSOR_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self) -> Result<Option<MentionId>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow!("read cursor {}: {e}", self.path.display()));
            }
        };
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match MentionId::parse(trimmed) {
            Some(id) => Ok(Some(id)),
            None => {
                tracing::warn!(
                    path = %self.path.display(),
                    contents = %trimmed,
                    "cursor file holds a malformed id; treating cursor as absent"
                );
                Ok(None)
            }
        }
    }

    async fn store(&self, id: &MentionId) -> Result<()> {
        if !id.is_well_formed() {
            return Err(anyhow!("refusing to persist malformed cursor {id:?}"));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("create cursor dir {}", parent.display()))?;
            }
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, id.as_str())
            .await
            .with_context(|| format!("write cursor {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("commit cursor {}", self.path.display()))?;
        Ok(())
    }
}

/// In-process cursor, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    value: RwLock<Option<MentionId>>,
}

impl MemoryCursorStore {
    pub fn new(initial: Option<MentionId>) -> Self {
        Self {
            value: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<Option<MentionId>> {
        Ok(self.value.read().await.clone())
    }

    async fn store(&self, id: &MentionId) -> Result<()> {
        *self.value.write().await = Some(id.clone());
        Ok(())
    }
}
