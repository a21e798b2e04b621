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

//! Server host key verification for outgoing connections.

use russh::client::Handler;
use std::path::PathBuf;
use std::str::FromStr;

/// How the server's host key is verified during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyCheck {
    /// Accept any host key.
    #[default]
    NoCheck,
    /// Check against `~/.ssh/known_hosts`.
    DefaultKnownHostsFile,
    /// Check against the given known_hosts file.
    KnownHostsFile(PathBuf),
}

impl FromStr for HostKeyCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" | "off" => Ok(HostKeyCheck::NoCheck),
            "yes" | "known-hosts" => Ok(HostKeyCheck::DefaultKnownHostsFile),
            other if !other.is_empty() => Ok(HostKeyCheck::KnownHostsFile(PathBuf::from(other))),
            _ => Err("host key check mode cannot be empty".to_string()),
        }
    }
}

/// russh client handler carrying the target identity for host key checks.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    check: HostKeyCheck,
}

impl ClientHandler {
    pub fn new(hostname: String, port: u16, check: HostKeyCheck) -> Self {
        Self {
            hostname,
            port,
            check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.check {
            HostKeyCheck::NoCheck => Ok(true),
            HostKeyCheck::DefaultKnownHostsFile => {
                match russh::keys::check_known_hosts(&self.hostname, self.port, server_public_key)
                {
                    Ok(known) => Ok(known),
                    Err(e) => {
                        tracing::warn!("Host key verification failed for {}: {}", self.hostname, e);
                        Ok(false)
                    }
                }
            }
            HostKeyCheck::KnownHostsFile(path) => {
                match russh::keys::check_known_hosts_path(
                    &self.hostname,
                    self.port,
                    server_public_key,
                    path,
                ) {
                    Ok(known) => Ok(known),
                    Err(e) => {
                        tracing::warn!("Host key verification failed for {}: {}", self.hostname, e);
                        Ok(false)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_key_check() {
        assert_eq!("no".parse::<HostKeyCheck>().unwrap(), HostKeyCheck::NoCheck);
        assert_eq!(
            "yes".parse::<HostKeyCheck>().unwrap(),
            HostKeyCheck::DefaultKnownHostsFile
        );
        assert_eq!(
            "/etc/ssh/ssh_known_hosts".parse::<HostKeyCheck>().unwrap(),
            HostKeyCheck::KnownHostsFile(PathBuf::from("/etc/ssh/ssh_known_hosts"))
        );
        assert!("".parse::<HostKeyCheck>().is_err());
    }

    #[test]
    fn test_default_is_no_check() {
        assert_eq!(HostKeyCheck::default(), HostKeyCheck::NoCheck);
    }
}
