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

//! Error types for pool construction, transfers and remote execution.
//!
//! Errors fall into two groups:
//!
//! - Command-wide errors ([`Error::Config`], [`Error::PoolConstruction`]) abort
//!   the whole invocation before any per-host work starts.
//! - Per-host errors (everything else) are captured into that host's outcome
//!   and never affect sibling hosts.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure attributed to one host address.
#[derive(Debug)]
pub struct HostFailure {
    pub address: String,
    pub error: Error,
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address, self.error)
    }
}

/// Errors produced by the multi-host engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing credentials or a malformed host address.
    #[error("invalid host configuration '{address}': {reason}")]
    Config { address: String, reason: String },

    /// Dial, handshake or authentication failure for one host.
    #[error("failed to connect {address}: {reason}")]
    Connection { address: String, reason: String },

    /// Strict pool construction failed for at least one host.
    #[error("failed to connect {} host(s): {}", .failures.len(), join_failures(.failures))]
    PoolConstruction { failures: Vec<HostFailure> },

    #[error("local path {path:?} does not exist")]
    LocalPathMissing { path: PathBuf },

    #[error("remote path {path} does not exist")]
    RemotePathMissing { path: String },

    /// A single-file operation was pointed at a directory.
    #[error("{path} is a directory, require a file")]
    NotAFile { path: String },

    /// The transfer target already exists and overwriting was not requested.
    #[error("{side} file {path} already exists")]
    Conflict { side: Side, path: String },

    /// The exec channel or SFTP subsystem could not be used.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote process ran and exited with a non-zero status.
    #[error("failed to execute command '{command}', exited with status {exit_status}")]
    RemoteExec { command: String, exit_status: u32 },

    #[error("none of the interpreters '{}' exist on the remote host", .probed.join(","))]
    InterpreterNotFound { probed: Vec<String> },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("SFTP error on {path}: {source}")]
    Sftp {
        path: String,
        #[source]
        source: russh_sftp::client::error::Error,
    },

    /// The per-host task panicked or was cancelled.
    #[error("task for {address} failed: {reason}")]
    TaskFailed { address: String, reason: String },

    /// One or more sessions failed to close cleanly.
    #[error("failed to close {} session(s): {}", .failures.len(), join_failures(.failures))]
    Close { failures: Vec<HostFailure> },
}

/// Which side of a transfer an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn sftp(path: impl Into<String>, source: russh_sftp::client::error::Error) -> Self {
        Error::Sftp {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that abort the whole command rather than one host.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::PoolConstruction { .. })
    }
}

fn join_failures(failures: &[HostFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_construction_lists_every_host() {
        let err = Error::PoolConstruction {
            failures: vec![
                HostFailure {
                    address: "10.0.0.1:22".to_string(),
                    error: Error::Connection {
                        address: "10.0.0.1:22".to_string(),
                        reason: "connection refused".to_string(),
                    },
                },
                HostFailure {
                    address: "10.0.0.2:22".to_string(),
                    error: Error::Connection {
                        address: "10.0.0.2:22".to_string(),
                        reason: "timed out".to_string(),
                    },
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("failed to connect 2 host(s)"));
        assert!(msg.contains("10.0.0.1:22"));
        assert!(msg.contains("10.0.0.2:22"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_conflict_names_side() {
        let err = Error::Conflict {
            side: Side::Remote,
            path: "/tmp/a.txt".to_string(),
        };
        assert_eq!(err.to_string(), "remote file /tmp/a.txt already exists");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_interpreter_not_found_lists_probes() {
        let err = Error::InterpreterNotFound {
            probed: vec!["/bin/bash".to_string(), "/bin/sh".to_string()],
        };
        assert!(err.to_string().contains("/bin/bash,/bin/sh"));
    }
}
