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

//! Host inventory from `--addrs` or a YAML file.
//!
//! ```yaml
//! username: deploy
//! privateKeyPath: ~/.ssh/id_ed25519
//! connectTimeout: 5
//! addrs:
//!   - addr: 10.0.0.1
//!   - addr: 10.0.0.2:2222
//!     username: admin
//!     password: secret
//! ```
//!
//! Entry fields override the file's top-level fields, which override the
//! command-line defaults. Credentials resolve per level: the most specific
//! level that sets a password or a `privateKeyPath` supplies both, so an
//! entry's key is never displaced by a top-level or `-p` password. Within a
//! level the password wins. Empty values count as unset.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host::HostConfig;
use crate::session::ssh::DEFAULT_CONNECT_TIMEOUT;

/// Top level of the YAML host file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
    /// Dial timeout in seconds.
    pub connect_timeout: Option<u64>,
    #[serde(default)]
    pub addrs: Vec<AddrEntry>,
}

/// One host in the YAML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddrEntry {
    pub addr: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
}

/// Credentials given on the command line, used where the file is silent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDefaults {
    pub username: String,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
}

/// Where the host list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSource {
    Addrs(Vec<String>),
    File(PathBuf),
}

/// Validated hosts plus the dial timeout to use for them.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub hosts: Vec<HostConfig>,
    pub connect_timeout: Duration,
}

impl FileConfig {
    /// Load a YAML host file. The file must exist.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        let content = tokio::fs::read_to_string(&expanded_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read host file at {}. Please check the path and file permissions.",
                    expanded_path.display()
                )
            })?;

        Self::from_yaml(&content).with_context(|| {
            format!(
                "Failed to parse YAML host file at {}",
                expanded_path.display()
            )
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: FileConfig =
            serde_yaml::from_str(content).context("Invalid host file syntax")?;
        Ok(config)
    }

    /// Build one [`HostConfig`] per entry.
    pub fn hosts(&self, defaults: &HostDefaults) -> Result<Vec<HostConfig>> {
        let hosts = self
            .addrs
            .iter()
            .map(|entry| {
                let username = entry
                    .username
                    .as_deref()
                    .or(self.username.as_deref())
                    .unwrap_or(&defaults.username);
                let (password, key_path) = resolve_credentials(&[
                    (entry.password.as_deref(), entry.private_key_path.as_deref()),
                    (self.password.as_deref(), self.private_key_path.as_deref()),
                    (
                        defaults.password.as_deref(),
                        defaults.private_key_path.as_deref(),
                    ),
                ]);
                let key_path = key_path.map(expand_tilde);

                HostConfig::new(&entry.addr, username, password, key_path)
                    .with_context(|| format!("Invalid entry for {} in host file", entry.addr))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(hosts)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }
}

/// Build hosts from a comma-separated `--addrs` list sharing one set of
/// credentials.
pub fn hosts_from_addrs(addrs: &[String], defaults: &HostDefaults) -> Result<Vec<HostConfig>> {
    let key_path = defaults.private_key_path.as_deref().map(expand_tilde);

    addrs
        .iter()
        .map(|addr| addr.trim())
        .filter(|addr| !addr.is_empty())
        .map(|addr| {
            HostConfig::new(
                addr,
                &defaults.username,
                defaults.password.as_deref(),
                key_path.clone(),
            )
            .with_context(|| format!("Invalid host '{addr}'"))
        })
        .collect()
}

/// Resolve the host source into a validated inventory.
///
/// The timeout is taken from `timeout_override`, then the host file, then
/// the built-in default.
pub async fn load_inventory(
    source: &HostSource,
    defaults: &HostDefaults,
    timeout_override: Option<Duration>,
) -> Result<Inventory> {
    let (hosts, file_timeout) = match source {
        HostSource::Addrs(addrs) => (hosts_from_addrs(addrs, defaults)?, None),
        HostSource::File(path) => {
            let config = FileConfig::load(path).await?;
            (config.hosts(defaults)?, config.connect_timeout())
        }
    };

    if hosts.is_empty() {
        bail!("No hosts given. Use --addrs or list them under 'addrs' in the host file.");
    }

    let mut seen = HashSet::new();
    for host in &hosts {
        if !seen.insert(host.address()) {
            bail!("Host {} is listed more than once", host.address());
        }
    }

    let connect_timeout = timeout_override
        .or(file_timeout)
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT);

    tracing::debug!(
        "Loaded {} host(s), connect timeout {:?}",
        hosts.len(),
        connect_timeout
    );

    Ok(Inventory {
        hosts,
        connect_timeout,
    })
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if path_str.starts_with("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(path_str.replacen('~', &home, 1));
            }
        }
    }
    path.to_path_buf()
}

type CredentialLevel<'a> = (Option<&'a str>, Option<&'a Path>);

/// Password and key path from the first level that sets either.
fn resolve_credentials<'a>(levels: &[CredentialLevel<'a>]) -> CredentialLevel<'a> {
    levels
        .iter()
        .copied()
        .map(|(password, key_path)| {
            (
                password.filter(|p| !p.is_empty()),
                key_path.filter(|k| !k.as_os_str().is_empty()),
            )
        })
        .find(|(password, key_path)| password.is_some() || key_path.is_some())
        .unwrap_or((None, None))
}
