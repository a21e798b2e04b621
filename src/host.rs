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

use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// How a host authenticates. Password wins when both are supplied.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(Zeroizing<String>),
    PrivateKeyFile(PathBuf),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Password(***)"),
            Credentials::PrivateKeyFile(path) => f.debug_tuple("PrivateKeyFile").field(path).finish(),
        }
    }
}

/// One remote host to connect to. Immutable once built.
#[derive(Debug, Clone)]
pub struct HostConfig {
    host: String,
    port: u16,
    username: String,
    credentials: Credentials,
}

impl HostConfig {
    /// Validate and build a host configuration.
    ///
    /// Accepts `host` or `host:port`; anything with more than one colon is
    /// rejected. Empty password and key path strings count as absent.
    pub fn new(
        address: &str,
        username: &str,
        password: Option<&str>,
        private_key_path: Option<PathBuf>,
    ) -> Result<Self> {
        let (host, port) = parse_address(address)?;

        if username.is_empty() {
            return Err(Error::config(address, "username cannot be empty"));
        }

        let password = password.filter(|p| !p.is_empty());
        let private_key_path = private_key_path.filter(|p| !p.as_os_str().is_empty());

        let credentials = match (password, private_key_path) {
            (Some(password), _) => Credentials::Password(Zeroizing::new(password.to_string())),
            (None, Some(path)) => Credentials::PrivateKeyFile(path),
            (None, None) => {
                return Err(Error::config(
                    address,
                    "provide the password or privateKeyPath",
                ))
            }
        };

        Ok(Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            credentials,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Normalized `host:port` form used to label sessions and outcomes.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for HostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

fn parse_address(address: &str) -> Result<(&str, u16)> {
    let parts: Vec<&str> = address.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, DEFAULT_SSH_PORT)),
        [host, port] if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| Error::config(address, format!("invalid port number '{port}'")))?;
            Ok((*host, port))
        }
        [""] | ["", _] => Err(Error::config(address, "host cannot be empty")),
        _ => Err(Error::config(address, "host addr is incorrect")),
    }
}
