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

//! In-memory [`RemoteSession`] and [`Connector`].
//!
//! The remote filesystem is a map of normalized paths to nodes, with `/`
//! always present. Commands answer from a table of canned responses, so the
//! engines, the pool and the dispatcher can be exercised without an SSH server.
//!
//! ```
//! use mssh::session::{MemorySession, RemoteSession};
//!
//! # tokio_test_block(async {
//! let session = MemorySession::new("10.0.0.1:22")
//!     .with_file("/etc/motd", b"hello")
//!     .with_command("uptime", "up 3 days\n", 0);
//!
//! assert!(session.stat("/etc").await.unwrap().unwrap().is_dir);
//! assert_eq!(session.run_command("uptime").await.unwrap().exit_status, 0);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{CommandOutput, RemoteEntry, RemoteMetadata, RemoteSession};
use crate::error::{Error, Result, Side};
use crate::host::HostConfig;
use crate::pool::Connector;
use crate::utils::path::{normalize_remote, remote_ancestors, remote_parent};

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone)]
enum Node {
    File { contents: Vec<u8>, mode: u32 },
    Dir { mode: u32 },
}

impl Node {
    fn metadata(&self) -> RemoteMetadata {
        match self {
            Node::File { contents, mode } => RemoteMetadata {
                is_dir: false,
                size: contents.len() as u64,
                permissions: Some(*mode),
            },
            Node::Dir { mode } => RemoteMetadata {
                is_dir: true,
                size: 0,
                permissions: Some(*mode),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    TransportFailure(String),
    Panic,
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<String, Node>,
    replies: HashMap<String, Reply>,
    fallback: CommandOutput,
    executed: Vec<String>,
    fail_close: bool,
    close_count: usize,
}

impl State {
    fn insert_dirs(&mut self, path: &str, mode: u32) {
        for dir in remote_ancestors(path) {
            self.nodes.entry(dir).or_insert(Node::Dir { mode });
        }
    }

    fn children(&self, dir: &str) -> Vec<RemoteEntry> {
        let mut children: Vec<RemoteEntry> = self
            .nodes
            .iter()
            .filter(|(path, _)| path.as_str() != dir)
            .filter(|(path, _)| remote_parent(path).as_deref() == Some(dir))
            .map(|(path, node)| RemoteEntry {
                path: path.clone(),
                metadata: node.metadata(),
            })
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        children
    }
}

/// A remote host whose filesystem and shell live in memory.
#[derive(Debug)]
pub struct MemorySession {
    address: String,
    state: Mutex<State>,
}

impl MemorySession {
    /// An empty host with only `/` and the login directory `.` present.
    /// Relative paths live under `.`. Unknown commands exit 127.
    pub fn new(address: impl Into<String>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir { mode: DIR_MODE });
        nodes.insert(".".to_string(), Node::Dir { mode: DIR_MODE });

        Self {
            address: address.into(),
            state: Mutex::new(State {
                nodes,
                replies: HashMap::new(),
                fallback: CommandOutput {
                    combined: b"command not found\n".to_vec(),
                    exit_status: 127,
                },
                executed: Vec::new(),
                fail_close: false,
                close_count: 0,
            }),
        }
    }

    /// Add a file, creating its parent directories.
    pub fn with_file(self, path: &str, contents: impl AsRef<[u8]>) -> Self {
        {
            let mut state = self.lock();
            let path = normalize_remote(path);
            if let Some(parent) = remote_parent(&path) {
                state.insert_dirs(&parent, DIR_MODE);
            }
            state.nodes.insert(
                path,
                Node::File {
                    contents: contents.as_ref().to_vec(),
                    mode: FILE_MODE,
                },
            );
        }
        self
    }

    /// Add a directory and its ancestors.
    pub fn with_dir(self, path: &str) -> Self {
        self.lock().insert_dirs(path, DIR_MODE);
        self
    }

    /// Add a directory with a specific permission mode.
    pub fn with_dir_mode(self, path: &str, mode: u32) -> Self {
        {
            let mut state = self.lock();
            let path = normalize_remote(path);
            if let Some(parent) = remote_parent(&path) {
                state.insert_dirs(&parent, DIR_MODE);
            }
            state.nodes.insert(path, Node::Dir { mode });
        }
        self
    }

    /// Answer `command` with `output` and `exit_status`.
    pub fn with_command(self, command: &str, output: &str, exit_status: u32) -> Self {
        self.lock().replies.insert(
            command.to_string(),
            Reply::Output(CommandOutput {
                combined: output.as_bytes().to_vec(),
                exit_status,
            }),
        );
        self
    }

    /// Answer every command without a specific reply.
    pub fn with_default_command(self, output: &str, exit_status: u32) -> Self {
        self.lock().fallback = CommandOutput {
            combined: output.as_bytes().to_vec(),
            exit_status,
        };
        self
    }

    /// Fail `command` at the transport level.
    pub fn with_failing_command(self, command: &str, reason: &str) -> Self {
        self.lock().replies.insert(
            command.to_string(),
            Reply::TransportFailure(reason.to_string()),
        );
        self
    }

    /// Panic while running `command`.
    pub fn with_panicking_command(self, command: &str) -> Self {
        self.lock()
            .replies
            .insert(command.to_string(), Reply::Panic);
        self
    }

    /// Make [`RemoteSession::close`] fail.
    pub fn with_failing_close(self) -> Self {
        self.lock().fail_close = true;
        self
    }

    /// Contents of a remote file, if it exists and is a file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(&normalize_remote(path)) {
            Some(Node::File { contents, .. }) => Some(contents.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.lock().nodes.get(&normalize_remote(path)),
            Some(Node::Dir { .. })
        )
    }

    /// Every path on the host, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().nodes.keys().cloned().collect()
    }

    /// Commands run so far, in order.
    pub fn executed_commands(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// How many times [`RemoteSession::close`] was called.
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    fn address(&self) -> &str {
        &self.address
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let reply = {
            let mut state = self.lock();
            state.executed.push(command.to_string());
            state
                .replies
                .get(command)
                .cloned()
                .unwrap_or_else(|| Reply::Output(state.fallback.clone()))
        };

        match reply {
            Reply::Output(output) => Ok(output),
            Reply::TransportFailure(reason) => Err(Error::Transport(reason)),
            Reply::Panic => panic!("simulated failure running '{command}' on {}", self.address),
        }
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteMetadata>> {
        Ok(self
            .lock()
            .nodes
            .get(&normalize_remote(path))
            .map(Node::metadata))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_remote(path);
        match self.lock().nodes.get(&path) {
            Some(Node::File { contents, .. }) => Ok(contents.clone()),
            Some(Node::Dir { .. }) => Err(Error::NotAFile { path }),
            None => Err(Error::RemotePathMissing { path }),
        }
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let path = normalize_remote(path);
        let mut state = self.lock();

        if let Some(parent) = remote_parent(&path) {
            if !matches!(state.nodes.get(&parent), Some(Node::Dir { .. })) {
                return Err(Error::Transport(format!(
                    "no such directory {parent} on {}",
                    self.address
                )));
            }
        }

        let mode = match state.nodes.get(&path) {
            Some(Node::Dir { .. }) => return Err(Error::NotAFile { path }),
            Some(Node::File { mode, .. }) => *mode,
            None => FILE_MODE,
        };
        state.nodes.insert(
            path,
            Node::File {
                contents: contents.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let mut state = self.lock();
        for dir in remote_ancestors(path) {
            match state.nodes.get(&dir) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(Error::Conflict {
                        side: Side::Remote,
                        path: dir,
                    })
                }
                None => {
                    state.nodes.insert(dir, Node::Dir { mode: DIR_MODE });
                }
            }
        }
        Ok(())
    }

    async fn walk(&self, root: &str) -> Result<Vec<RemoteEntry>> {
        let root = normalize_remote(root);
        let state = self.lock();
        let metadata = state
            .nodes
            .get(&root)
            .map(Node::metadata)
            .ok_or_else(|| Error::RemotePathMissing { path: root.clone() })?;

        let mut entries = Vec::new();
        let mut pending = vec![RemoteEntry {
            path: root,
            metadata,
        }];

        while let Some(entry) = pending.pop() {
            if entry.metadata.is_dir {
                let mut children = state.children(&entry.path);
                children.reverse();
                pending.extend(children);
            }
            entries.push(entry);
        }

        Ok(entries)
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.lock();
        state.close_count += 1;
        if state.fail_close {
            return Err(Error::Transport(format!(
                "failed to disconnect {}",
                self.address
            )));
        }
        Ok(())
    }
}

/// Hands out pre-built [`MemorySession`]s by address.
///
/// Addresses without a registered session get an empty one; addresses
/// registered with [`MemoryConnector::with_unreachable`] fail to connect.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    sessions: Mutex<HashMap<String, MemorySession>>,
    unreachable: HashMap<String, String>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the session returned for its own address.
    pub fn with_session(self, session: MemorySession) -> Self {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.address.clone(), session);
        self
    }

    /// Make connecting to `address` fail with `reason`.
    pub fn with_unreachable(mut self, address: &str, reason: &str) -> Self {
        self.unreachable
            .insert(address.to_string(), reason.to_string());
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Session = MemorySession;

    async fn connect(&self, host: &HostConfig) -> Result<MemorySession> {
        let address = host.address();
        if let Some(reason) = self.unreachable.get(&address) {
            return Err(Error::Connection {
                address,
                reason: reason.clone(),
            });
        }

        let session = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&address);
        Ok(session.unwrap_or_else(|| MemorySession::new(address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_walk_is_document_order() {
        let session = MemorySession::new("h:22")
            .with_file("/srv/app/z.txt", b"z")
            .with_file("/srv/app/a/b.txt", b"b")
            .with_dir("/srv/app/a-empty")
            .with_file("/srv/app-other/x", b"x");

        let paths: Vec<String> = session
            .walk("/srv/app/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();

        assert_eq!(
            paths,
            vec![
                "/srv/app",
                "/srv/app/a",
                "/srv/app/a/b.txt",
                "/srv/app/a-empty",
                "/srv/app/z.txt",
            ]
        );
    }

    #[tokio::test]
    async fn test_write_requires_parent() {
        let session = MemorySession::new("h:22");
        let err = session.write_file("/missing/a.txt", b"x").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        session.mkdir_all("/missing").await.unwrap();
        session.write_file("/missing/a.txt", b"x").await.unwrap();
        assert_eq!(session.file("/missing/a.txt"), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_mkdir_all_through_file_is_conflict() {
        let session = MemorySession::new("h:22").with_file("/data", b"x");
        let err = session.mkdir_all("/data/sub").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict {
                side: Side::Remote,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_commands_are_recorded() {
        let session = MemorySession::new("h:22").with_command("hostname", "h\n", 0);
        assert_eq!(
            session.run_command("hostname").await.unwrap().combined_string(),
            "h\n"
        );
        assert_eq!(session.run_command("nope").await.unwrap().exit_status, 127);
        assert_eq!(session.executed_commands(), vec!["hostname", "nope"]);
    }

    #[tokio::test]
    async fn test_connector_unreachable() {
        let connector = MemoryConnector::new().with_unreachable("10.0.0.9:22", "no route to host");
        let host = HostConfig::new("10.0.0.9", "root", Some("pw"), None).unwrap();
        let err = connector.connect(&host).await.unwrap_err();
        assert!(err.to_string().contains("no route to host"));
    }
}
