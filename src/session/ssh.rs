// Copyright 2025 The mssh Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! russh-backed [`RemoteSession`].
//!
//! One TCP connection per host carries every channel the session opens: a
//! fresh `exec` channel per command, and a single SFTP subsystem channel that
//! is opened on first use and reused for every file operation afterwards.
//!
//! Some sshd_config does not enable sftp by default. A line like
//! `Subsystem sftp internal-sftp` is needed on the remote side for transfers.

use async_trait::async_trait;
use russh::client::Handle;
use russh::keys::PrivateKeyWithHashAlg;
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::OnceCell;

use super::handler::{ClientHandler, HostKeyCheck};
use super::{CommandOutput, RemoteEntry, RemoteMetadata, RemoteSession};
use crate::error::{Error, Result, Side};
use crate::host::{Credentials, HostConfig};
use crate::pool::Connector;
use crate::utils::path::{join_remote, normalize_remote, remote_ancestors};

/// Dial timeout applied when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Initial capacity for collected command output.
const SSH_CMD_BUFFER_SIZE: usize = 8192;

/// An authenticated connection to one host.
pub struct SshSession {
    address: String,
    handle: Handle<ClientHandler>,
    sftp: OnceCell<SftpSession>,
}

impl SshSession {
    /// Dial, handshake and authenticate.
    ///
    /// The dial and handshake are bounded by `connect_timeout`. Every failure
    /// is reported as [`Error::Connection`] naming the host.
    pub async fn connect(
        host: &HostConfig,
        host_key_check: HostKeyCheck,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let address = host.address();
        let config = Arc::new(russh::client::Config::default());
        let handler = ClientHandler::new(host.host().to_string(), host.port(), host_key_check);

        tracing::debug!("Connecting to {}", host);

        let dial = russh::client::connect(config, (host.host(), host.port()), handler);
        let mut handle = match tokio::time::timeout(connect_timeout, dial).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let reason = match e {
                    russh::Error::UnknownKey => "host key verification failed".to_string(),
                    russh::Error::IO(ref io) => io.to_string(),
                    other => other.to_string(),
                };
                return Err(Error::Connection { address, reason });
            }
            Err(_) => {
                return Err(Error::Connection {
                    address,
                    reason: format!(
                        "connection timeout after {}ms",
                        connect_timeout.as_millis()
                    ),
                });
            }
        };

        if let Err(reason) = authenticate(&mut handle, host).await {
            return Err(Error::Connection { address, reason });
        }

        tracing::debug!("Authenticated to {} as {}", address, host.username());

        Ok(Self {
            address,
            handle,
            sftp: OnceCell::new(),
        })
    }

    async fn sftp(&self) -> Result<&SftpSession> {
        self.sftp
            .get_or_try_init(|| async {
                let channel = self.handle.channel_open_session().await.map_err(|e| {
                    Error::Transport(format!("failed to open SFTP channel on {}: {e}", self.address))
                })?;
                channel.request_subsystem(true, "sftp").await.map_err(|e| {
                    Error::Transport(format!(
                        "failed to request SFTP subsystem on {}: {e}",
                        self.address
                    ))
                })?;
                SftpSession::new(channel.into_stream()).await.map_err(|e| {
                    Error::Transport(format!("failed to create SFTP client on {}: {e}", self.address))
                })
            })
            .await
    }
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    host: &HostConfig,
) -> std::result::Result<(), String> {
    match host.credentials() {
        Credentials::Password(password) => {
            let auth = handle
                .authenticate_password(host.username(), password.as_str())
                .await
                .map_err(|e| format!("password authentication error: {e}"))?;
            if !auth.success() {
                return Err("password authentication rejected".to_string());
            }
        }
        Credentials::PrivateKeyFile(path) => {
            let key = russh::keys::load_secret_key(path, None)
                .map_err(|e| format!("failed to load private key {path:?}: {e}"))?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| format!("failed to negotiate key hash: {e}"))?
                .flatten();
            let auth = handle
                .authenticate_publickey(
                    host.username(),
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(|e| format!("public key authentication error: {e}"))?;
            if !auth.success() {
                return Err("public key authentication rejected".to_string());
            }
        }
    }
    Ok(())
}

fn to_metadata(attrs: &FileAttributes) -> RemoteMetadata {
    RemoteMetadata {
        is_dir: attrs.is_dir(),
        size: attrs.size.unwrap_or(0),
        permissions: attrs.permissions.map(|mode| mode & 0o7777),
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn address(&self) -> &str {
        &self.address
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Transport(format!("failed to create session, {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Transport(format!("failed to start command, {e}")))?;

        let mut combined = Vec::with_capacity(SSH_CMD_BUFFER_SIZE);
        let mut exit_status: Option<u32> = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => combined.extend_from_slice(&data[..]),
                // ext == 1 is stderr
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    combined.extend_from_slice(&data[..])
                }
                ChannelMsg::ExitStatus {
                    exit_status: status,
                } => exit_status = Some(status),
                _ => {}
            }
        }

        match exit_status {
            Some(exit_status) => Ok(CommandOutput {
                combined,
                exit_status,
            }),
            None => Err(Error::Transport(format!(
                "command '{command}' ended without an exit status"
            ))),
        }
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteMetadata>> {
        let sftp = self.sftp().await?;
        if !sftp
            .try_exists(path)
            .await
            .map_err(|e| Error::sftp(path, e))?
        {
            return Ok(None);
        }
        let attrs = sftp.metadata(path).await.map_err(|e| Error::sftp(path, e))?;
        Ok(Some(to_metadata(&attrs)))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let sftp = self.sftp().await?;
        let mut file = sftp
            .open_with_flags(path, OpenFlags::READ)
            .await
            .map_err(|e| Error::sftp(path, e))?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .await
            .map_err(|e| Error::Transport(format!("failed to read remote file {path}: {e}")))?;
        Ok(contents)
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let sftp = self.sftp().await?;
        let mut file = sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| Error::sftp(path, e))?;

        let write_err =
            |e: std::io::Error| Error::Transport(format!("failed to write remote file {path}: {e}"));
        file.write_all(contents).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        file.shutdown().await.map_err(write_err)?;
        Ok(())
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let sftp = self.sftp().await?;

        for dir in remote_ancestors(path) {
            if sftp
                .try_exists(dir.as_str())
                .await
                .map_err(|e| Error::sftp(dir.as_str(), e))?
            {
                let attrs = sftp
                    .metadata(dir.as_str())
                    .await
                    .map_err(|e| Error::sftp(dir.as_str(), e))?;
                if !attrs.is_dir() {
                    return Err(Error::Conflict {
                        side: Side::Remote,
                        path: dir,
                    });
                }
                continue;
            }
            sftp.create_dir(dir.as_str())
                .await
                .map_err(|e| Error::sftp(dir.as_str(), e))?;
        }
        Ok(())
    }

    async fn walk(&self, root: &str) -> Result<Vec<RemoteEntry>> {
        let root = normalize_remote(root);
        let metadata = self
            .stat(&root)
            .await?
            .ok_or_else(|| Error::RemotePathMissing { path: root.clone() })?;
        let sftp = self.sftp().await?;

        let mut entries = Vec::new();
        let mut pending = vec![RemoteEntry {
            path: root,
            metadata,
        }];

        while let Some(entry) = pending.pop() {
            if !entry.metadata.is_dir {
                entries.push(entry);
                continue;
            }

            let listing = sftp
                .read_dir(entry.path.as_str())
                .await
                .map_err(|e| Error::sftp(entry.path.as_str(), e))?;
            let mut children: Vec<RemoteEntry> = listing
                .filter(|child| {
                    let name = child.file_name();
                    name != "." && name != ".."
                })
                .map(|child| RemoteEntry {
                    path: join_remote(&entry.path, &child.file_name()),
                    metadata: to_metadata(&child.metadata()),
                })
                .collect();

            // Popped from the back, so reverse order yields ascending names.
            children.sort_by(|a, b| b.path.cmp(&a.path));
            entries.push(entry);
            pending.extend(children);
        }

        Ok(entries)
    }

    async fn close(&self) -> Result<()> {
        if let Some(sftp) = self.sftp.get() {
            if let Err(e) = sftp.close().await {
                tracing::debug!("Failed to close SFTP session on {}: {}", self.address, e);
            }
        }
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(|e| Error::Transport(format!("failed to disconnect, {e}")))
    }
}

/// Opens [`SshSession`]s for a [`ConnectionPool`](crate::pool::ConnectionPool).
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
    host_key_check: HostKeyCheck,
}

impl SshConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            host_key_check: HostKeyCheck::default(),
        }
    }

    pub fn with_host_key_check(mut self, check: HostKeyCheck) -> Self {
        self.host_key_check = check;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, host: &HostConfig) -> Result<SshSession> {
        SshSession::connect(host, self.host_key_check.clone(), self.connect_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_connector_timeout() {
        assert_eq!(SshConnector::default().connect_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_metadata_strips_file_type_bits() {
        let attrs = FileAttributes {
            size: Some(4096),
            uid: Some(0),
            user: None,
            gid: Some(0),
            group: None,
            permissions: Some(0o040755),
            atime: None,
            mtime: None,
        };
        assert!(attrs.is_dir());
        let meta = to_metadata(&attrs);
        assert_eq!(meta.permissions, Some(0o755));
        assert_eq!(meta.size, 4096);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop a listener so the port is very likely closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let host = HostConfig::new(&format!("127.0.0.1:{port}"), "root", Some("pw"), None).unwrap();
        let err = SshConnector::default()
            .connect(&host)
            .await
            .err()
            .unwrap();
        match err {
            Error::Connection { address, .. } => assert_eq!(address, format!("127.0.0.1:{port}")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
