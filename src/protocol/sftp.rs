//! SFTP protocol client, backed by `russh` for the transport and
//! `russh-sftp` for the filesystem-shaped subsystem API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use russh::client::{self, Handle};
use russh::keys::PublicKey;
use russh_sftp::client::SftpSession;

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::FileAttributes;
use crate::secrets::Credential;

use super::{ProtocolClient, RemoteFileInfo};

/// Accepts any host key. Host key pinning is out of scope for this
/// pipeline's deployment model (private network, trusted hosts).
struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SftpClient {
    host: String,
    port: u16,
    credential: Credential,
}

impl SftpClient {
    pub fn new(host: impl Into<String>, port: u16, credential: Credential) -> Self {
        Self {
            host: host.into(),
            port,
            credential,
        }
    }

    async fn session(&self) -> FileHorizonResult<SftpSession> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let addr = format!("{}:{}", self.host, self.port);
        let mut handle: Handle<AcceptingHandler> =
            client::connect(config, &addr, AcceptingHandler)
                .await
                .map_err(|e| FileHorizonError::Transport {
                    message: format!("sftp connect to {addr} failed: {e}"),
                })?;

        let authenticated = handle
            .authenticate_password(&self.credential.username, self.credential.expose_password())
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("sftp authentication error: {e}"),
            })?;
        if !authenticated.success() {
            return Err(FileHorizonError::Transport {
                message: "sftp authentication rejected".to_string(),
            });
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("sftp channel open failed: {e}"),
            })?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("sftp subsystem request failed: {e}"),
            })?;

        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("sftp session init failed: {e}"),
            })
    }
}

fn mtime_to_utc(mtime: Option<u32>) -> chrono::DateTime<Utc> {
    mtime
        .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl ProtocolClient for SftpClient {
    async fn list(&self, path: &str) -> FileHorizonResult<Vec<RemoteFileInfo>> {
        let session = self.session().await?;
        let entries = session
            .read_dir(path)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("sftp read_dir {path} failed: {e}"),
            })?;

        let mut out = Vec::new();
        for entry in entries {
            let metadata = entry.metadata();
            out.push(RemoteFileInfo {
                path: entry.path(),
                is_dir: metadata.is_dir(),
                size: metadata.size.unwrap_or(0),
                modified_utc: Some(mtime_to_utc(metadata.mtime)),
            });
        }
        let _ = session.close().await;
        Ok(out)
    }

    async fn stat(&self, path: &str) -> FileHorizonResult<FileAttributes> {
        let session = self.session().await?;
        let metadata = session
            .metadata(path)
            .await
            .map_err(|_| FileHorizonError::FileNotFound {
                path: path.to_string(),
            })?;
        let _ = session.close().await;
        Ok(FileAttributes {
            size: metadata.size.unwrap_or(0),
            last_write_utc: mtime_to_utc(metadata.mtime),
            hash: None,
        })
    }

    async fn read(&self, path: &str) -> FileHorizonResult<Vec<u8>> {
        let session = self.session().await?;
        let content = session
            .read(path)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("sftp read {path} failed: {e}"),
            })?;
        let _ = session.close().await;
        Ok(content)
    }

    async fn write(&self, path: &str, content: &[u8], create_dirs: bool) -> FileHorizonResult<()> {
        let session = self.session().await?;
        if create_dirs {
            if let Some(parent) = std::path::Path::new(path).parent() {
                let _ = session.create_dir(parent.to_string_lossy().into_owned()).await;
            }
        }
        session
            .write(path, content)
            .await
            .map_err(|e| FileHorizonError::SinkWrite {
                sink: "sftp".to_string(),
                reason: e.to_string(),
            })?;
        let _ = session.close().await;
        Ok(())
    }

    async fn delete(&self, path: &str) -> FileHorizonResult<()> {
        let session = self.session().await?;
        session
            .remove_file(path)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("sftp remove {path} failed: {e}"),
            })?;
        let _ = session.close().await;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> FileHorizonResult<()> {
        let session = self.session().await?;
        session
            .rename(from, to)
            .await
            .map_err(|e| FileHorizonError::Transport {
                message: format!("sftp rename {from} -> {to} failed: {e}"),
            })?;
        let _ = session.close().await;
        Ok(())
    }
}
