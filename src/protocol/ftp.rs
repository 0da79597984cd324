//! FTP protocol client, backed by `suppaftp`'s tokio async driver.
//!
//! Each operation opens a fresh control connection. Poll intervals in this
//! pipeline are measured in seconds, so the per-call connection setup cost
//! is not a bottleneck, and it sidesteps keeping a control channel alive
//! across an idle poll interval.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use suppaftp::list::File as FtpListFile;
use suppaftp::tokio::AsyncFtpStream;
use tokio::io::AsyncReadExt;

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::FileAttributes;
use crate::secrets::Credential;

use super::{ProtocolClient, RemoteFileInfo};

pub struct FtpClient {
    host: String,
    port: u16,
    credential: Credential,
    connect_timeout: Duration,
}

impl FtpClient {
    pub fn new(host: impl Into<String>, port: u16, credential: Credential) -> Self {
        Self {
            host: host.into(),
            port,
            credential,
            connect_timeout: Duration::from_secs(15),
        }
    }

    async fn connect(&self) -> FileHorizonResult<AsyncFtpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = tokio::time::timeout(self.connect_timeout, AsyncFtpStream::connect(&addr))
            .await
            .map_err(|_| FileHorizonError::Transport {
                message: format!("ftp connect to {addr} timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| FileHorizonError::Transport {
                message: format!("ftp connect to {addr} failed: {e}"),
            })?;
        stream
            .login(self.credential.username.as_str(), self.credential.expose_password())
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("ftp login failed: {e}"),
            })?;
        Ok(stream)
    }
}

fn to_attrs(file: &FtpListFile) -> FileAttributes {
    let modified: chrono::DateTime<Utc> = file
        .modified()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .and_then(|d| Utc.timestamp_opt(d.as_secs() as i64, 0).single())
        .unwrap_or_else(Utc::now);
    FileAttributes {
        size: file.size() as u64,
        last_write_utc: modified,
        hash: None,
    }
}

#[async_trait]
impl ProtocolClient for FtpClient {
    async fn list(&self, path: &str) -> FileHorizonResult<Vec<RemoteFileInfo>> {
        let mut stream = self.connect().await?;
        let lines = stream
            .list(Some(path))
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("ftp list {path} failed: {e}"),
            })?;
        let _ = stream.quit().await;

        let mut out = Vec::with_capacity(lines.len());
        for line in &lines {
            let Ok(file) = FtpListFile::from_str(line) else {
                continue;
            };
            if file.name() == "." || file.name() == ".." {
                continue;
            }
            let full_path = format!("{}/{}", path.trim_end_matches('/'), file.name());
            out.push(RemoteFileInfo {
                path: full_path,
                is_dir: file.is_directory(),
                size: file.size() as u64,
                modified_utc: Some(to_attrs(&file).last_write_utc),
            });
        }
        Ok(out)
    }

    async fn stat(&self, path: &str) -> FileHorizonResult<FileAttributes> {
        let mut stream = self.connect().await?;
        let size = stream
            .size(path)
            .await
            .map_err(|_| FileHorizonError::FileNotFound {
                path: path.to_string(),
            })?;
        let modified = stream.mdtm(path).await.ok();
        let _ = stream.quit().await;

        let last_write_utc = modified
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_else(Utc::now);

        Ok(FileAttributes {
            size: size as u64,
            last_write_utc,
            hash: None,
        })
    }

    async fn read(&self, path: &str) -> FileHorizonResult<Vec<u8>> {
        let mut stream = self.connect().await?;
        let bytes = stream
            .retr(path, |mut reader| {
                Box::pin(async move {
                    let mut buf = Vec::new();
                    reader
                        .read_to_end(&mut buf)
                        .await
                        .map_err(suppaftp::FtpError::ConnectionError)?;
                    Ok((buf, reader))
                })
            })
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("ftp retr {path} failed: {e}"),
            })?;
        let _ = stream.quit().await;
        Ok(bytes)
    }

    async fn write(&self, path: &str, content: &[u8], create_dirs: bool) -> FileHorizonResult<()> {
        let mut stream = self.connect().await?;
        if create_dirs {
            if let Some(parent) = std::path::Path::new(path).parent() {
                let _ = stream.mkdir(parent.to_string_lossy().as_ref()).await;
            }
        }
        let mut cursor = std::io::Cursor::new(content);
        stream
            .put_file(path, &mut cursor)
            .await
            .map_err(|e| FileHorizonError::SinkWrite {
                sink: "ftp".to_string(),
                reason: e.to_string(),
            })?;
        let _ = stream.quit().await;
        Ok(())
    }

    async fn delete(&self, path: &str) -> FileHorizonResult<()> {
        let mut stream = self.connect().await?;
        stream
            .rm(path)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("ftp rm {path} failed: {e}"),
            })?;
        let _ = stream.quit().await;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> FileHorizonResult<()> {
        let mut stream = self.connect().await?;
        stream
            .rename(from, to)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("ftp rename {from} -> {to} failed: {e}"),
            })?;
        let _ = stream.quit().await;
        Ok(())
    }
}
