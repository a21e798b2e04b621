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

//! Authenticated per-host sessions.
//!
//! The transfer and exec engines only talk to a host through the
//! [`RemoteSession`] trait, which exposes the handful of capabilities they
//! need instead of the full SSH client API:
//!
//! - run a command and collect its combined output
//! - stat, read, create and mkdir-all over SFTP
//! - walk a remote tree in document order
//!
//! [`ssh::SshSession`] is the russh-backed implementation;
//! [`memory::MemorySession`] keeps a remote filesystem in memory.

use async_trait::async_trait;

use crate::error::Result;

pub mod handler;
pub mod memory;
pub mod ssh;

pub use handler::{ClientHandler, HostKeyCheck};
pub use memory::{MemoryConnector, MemorySession};
pub use ssh::{SshConnector, SshSession};

/// Attributes of a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub is_dir: bool,
    pub size: u64,
    /// Unix permission bits, when the server reports them.
    pub permissions: Option<u32>,
}

/// One entry yielded by [`RemoteSession::walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub metadata: RemoteMetadata,
}

/// Raw result of a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Stdout and stderr interleaved in arrival order.
    pub combined: Vec<u8>,
    pub exit_status: u32,
}

impl CommandOutput {
    pub fn combined_string(&self) -> String {
        String::from_utf8_lossy(&self.combined).to_string()
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Capabilities of one authenticated connection to one host.
///
/// A session is used by a single task at a time; calls on it are sequential.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// `host:port` this session is bound to.
    fn address(&self) -> &str;

    /// Run `command` in a fresh exec channel.
    ///
    /// Returns `Err(Error::Transport)` when the channel cannot be opened or
    /// the remote never reports an exit status. A non-zero exit status is
    /// not an error at this level.
    async fn run_command(&self, command: &str) -> Result<CommandOutput>;

    /// Metadata for `path`, or `None` if it does not exist.
    async fn stat(&self, path: &str) -> Result<Option<RemoteMetadata>>;

    /// Whole content of the remote file at `path`.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or truncate `path` and write `contents` to it.
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// Create `path` and every missing ancestor. Existing directories are fine.
    async fn mkdir_all(&self, path: &str) -> Result<()>;

    /// Every entry under `root`, including `root` itself, in document order:
    /// a directory always precedes its contents and siblings are sorted by name.
    async fn walk(&self, root: &str) -> Result<Vec<RemoteEntry>>;

    /// Tear the connection down.
    async fn close(&self) -> Result<()>;
}
