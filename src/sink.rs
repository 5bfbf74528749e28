//! Save and abort collaborators used by the CLI.

use crate::flow::collaborators::{AbortNotifier, ArtifactSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes the accepted artifact to a file, creating parent directories.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ArtifactSink for FileSink {
    async fn save(&self, artifact: &str) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let mut content = artifact.to_string();
        if !content.ends_with('\n') {
            content.push('\n');
        }

        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!("Saved CSM list to {}", self.path.display());
        Ok(())
    }
}

/// Reports an abort on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AbortNotifier for ConsoleNotifier {
    async fn notify(&self, reason: &str) -> Result<()> {
        warn!("Exit on failure: {}", reason);
        eprintln!("{} {}", "Aborted:".red().bold(), reason);
        Ok(())
    }
}
