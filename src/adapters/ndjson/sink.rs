//! Filesystem sink writing one NDJSON file per batch

use crate::adapters::sink::RecordSink;
use crate::domain::{Result, SinkError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Parameters of `[dest]` with `type = "filesystem"`
#[derive(Debug, Clone, Deserialize)]
pub struct FilesystemSinkParams {
    /// Output directory, created if missing
    pub directory: PathBuf,
}

/// Writes each batch to `<name_hint or uuid>.ndjson` in a directory
pub struct FilesystemSink {
    directory: PathBuf,
}

impl FilesystemSink {
    /// Creates a sink
    pub fn new(params: FilesystemSinkParams) -> Self {
        Self {
            directory: params.directory,
        }
    }

    /// Output directory
    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    fn batch_path(&self, name_hint: Option<&str>) -> PathBuf {
        let name = name_hint
            .map(sanitize)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.directory.join(format!("{name}.ndjson"))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl RecordSink for FilesystemSink {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    async fn test_connection(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| {
                SinkError::ConnectionFailed(format!(
                    "cannot create {}: {e}",
                    self.directory.display()
                ))
            })?;
        Ok(())
    }

    async fn write_batch(&self, records: &[String], name_hint: Option<&str>) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| SinkError::WriteFailed(format!("{}: {e}", self.directory.display())))?;

        let path = self.batch_path(name_hint);
        let mut contents = String::with_capacity(records.iter().map(|r| r.len() + 1).sum());
        for record in records {
            contents.push_str(record);
            contents.push('\n');
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| SinkError::WriteFailed(format!("{}: {e}", path.display())))?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| SinkError::WriteFailed(format!("{}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| SinkError::WriteFailed(format!("{}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), records = records.len(), "Batch written");
        Ok(())
    }
}
