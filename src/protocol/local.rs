//! Local filesystem protocol client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::FileAttributes;

use super::{ProtocolClient, RemoteFileInfo};

pub struct LocalFileClient;

impl LocalFileClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalFileClient {
    fn default() -> Self {
        Self::new()
    }
}

fn io_err(e: std::io::Error, path: &str) -> FileHorizonError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FileHorizonError::FileNotFound {
            path: path.to_string(),
        }
    } else {
        FileHorizonError::Io {
            source: e,
            path: Some(path.to_string()),
        }
    }
}

#[async_trait]
impl ProtocolClient for LocalFileClient {
    async fn list(&self, path: &str) -> FileHorizonResult<Vec<RemoteFileInfo>> {
        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            let entries = std::fs::read_dir(&path).map_err(|e| io_err(e, &path))?;
            for entry in entries {
                let entry = entry.map_err(|e| io_err(e, &path))?;
                let metadata = entry.metadata().map_err(|e| io_err(e, &path))?;
                let modified_utc = metadata
                    .modified()
                    .ok()
                    .map(DateTime::<Utc>::from);
                out.push(RemoteFileInfo {
                    path: entry.path().to_string_lossy().into_owned(),
                    is_dir: metadata.is_dir(),
                    size: metadata.len(),
                    modified_utc,
                });
            }
            Ok(out)
        })
        .await
        .map_err(|e| FileHorizonError::Unspecified(e.to_string()))?
    }

    async fn stat(&self, path: &str) -> FileHorizonResult<FileAttributes> {
        let path_owned = path.to_string();
        let metadata = tokio::task::spawn_blocking(move || std::fs::metadata(&path_owned))
            .await
            .map_err(|e| FileHorizonError::Unspecified(e.to_string()))?
            .map_err(|e| io_err(e, path))?;
        let last_write_utc = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(FileAttributes {
            size: metadata.len(),
            last_write_utc,
            hash: None,
        })
    }

    async fn read(&self, path: &str) -> FileHorizonResult<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| io_err(e, path))
    }

    async fn write(&self, path: &str, content: &[u8], create_dirs: bool) -> FileHorizonResult<()> {
        if create_dirs {
            if let Some(parent) = std::path::Path::new(path).parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|_| FileHorizonError::DirectoryCreateFailed {
                        path: parent.to_path_buf(),
                    })?;
            }
        }
        let tmp_path = format!("{path}.filehorizon-tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| io_err(e, &tmp_path))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| io_err(e, path))
    }

    async fn delete(&self, path: &str) -> FileHorizonResult<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| io_err(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> FileHorizonResult<()> {
        if let Some(parent) = std::path::Path::new(to).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|_| FileHorizonError::DirectoryCreateFailed {
                    path: parent.to_path_buf(),
                })?;
        }
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| io_err(e, from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let client = LocalFileClient::new();
        client
            .write(path.to_str().unwrap(), b"hello", false)
            .await
            .unwrap();
        let content = client.read(path.to_str().unwrap()).await.unwrap();
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn stat_missing_file_is_file_not_found() {
        let client = LocalFileClient::new();
        let err = client.stat("/does/not/exist").await.unwrap_err();
        assert!(matches!(err, FileHorizonError::FileNotFound { .. }));
    }
}
