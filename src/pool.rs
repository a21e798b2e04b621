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

//! Parallel connection setup and sequential teardown.
//!
//! Every host is dialed in its own task. What happens to the hosts that fail
//! is decided by a [`PoolPolicy`]:
//!
//! - [`PoolPolicy::Strict`] refuses to build a partial pool. All failures are
//!   reported together and the sessions that did connect are closed again.
//!   `rexec` uses this.
//! - [`PoolPolicy::BestEffort`] logs and drops failed hosts. `rcp` uses this.
//!
//! The two commands have always behaved differently here; the policy makes
//! that explicit instead of hiding it in each command.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

use crate::error::{Error, HostFailure, Result};
use crate::host::HostConfig;
use crate::session::RemoteSession;

/// Opens one session per host.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: RemoteSession;

    async fn connect(&self, host: &HostConfig) -> Result<Self::Session>;
}

/// What to do with hosts that fail to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPolicy {
    /// Any failure fails the whole pool.
    Strict,
    /// Keep whatever connected.
    BestEffort,
}

/// Live sessions for one command invocation.
pub struct ConnectionPool<S: RemoteSession> {
    sessions: Vec<Arc<S>>,
}

impl<S: RemoteSession> ConnectionPool<S> {
    /// Connect to every host concurrently and apply `policy` to the failures.
    pub async fn connect<C>(
        connector: Arc<C>,
        hosts: &[HostConfig],
        policy: PoolPolicy,
    ) -> Result<Self>
    where
        C: Connector<Session = S>,
    {
        let tasks = hosts.iter().cloned().map(|host| {
            let connector = Arc::clone(&connector);
            tokio::spawn(async move { connector.connect(&host).await })
        });
        let results = join_all(tasks).await;

        let mut sessions = Vec::with_capacity(hosts.len());
        let mut failures = Vec::new();

        for (host, joined) in hosts.iter().zip(results) {
            let address = host.address();
            match joined {
                Ok(Ok(session)) => sessions.push(Arc::new(session)),
                Ok(Err(error)) => failures.push(HostFailure { address, error }),
                Err(e) => {
                    tracing::error!("Connect task failed for {}: {}", address, e);
                    failures.push(HostFailure {
                        error: Error::TaskFailed {
                            address: address.clone(),
                            reason: e.to_string(),
                        },
                        address,
                    });
                }
            }
        }

        let pool = Self { sessions };

        if failures.is_empty() {
            tracing::info!("Connected to {} host(s)", pool.len());
            return Ok(pool);
        }

        match policy {
            PoolPolicy::Strict => {
                tracing::debug!(
                    "Strict pool: {} host(s) failed, closing {} connected session(s)",
                    failures.len(),
                    pool.len()
                );
                if let Err(e) = pool.close().await {
                    tracing::warn!("{}", e);
                }
                Err(Error::PoolConstruction { failures })
            }
            PoolPolicy::BestEffort => {
                for failure in &failures {
                    tracing::warn!("Skipping {}", failure);
                }
                tracing::info!(
                    "Connected to {} of {} host(s)",
                    pool.len(),
                    hosts.len()
                );
                Ok(pool)
            }
        }
    }

    /// Wrap sessions that are already connected.
    pub fn from_sessions(sessions: impl IntoIterator<Item = S>) -> Self {
        Self {
            sessions: sessions.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn sessions(&self) -> &[Arc<S>] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.sessions
            .iter()
            .map(|s| s.address().to_string())
            .collect()
    }

    /// Close every session once, in order. Failures are collected and
    /// reported together after all sessions were attempted.
    pub async fn close(self) -> Result<()> {
        let mut failures = Vec::new();

        for session in &self.sessions {
            if let Err(error) = session.close().await {
                tracing::warn!("{} close failed: {}", session.address(), error);
                failures.push(HostFailure {
                    address: session.address().to_string(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close { failures })
        }
    }
}
