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

use async_trait::async_trait;
use mssh::error::{Error, Result};
use mssh::session::{
    CommandOutput, MemoryConnector, MemorySession, RemoteEntry, RemoteMetadata, RemoteSession,
};
use mssh::{ConnectionPool, Connector, HostConfig, PoolPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn hosts(addresses: &[&str]) -> Vec<HostConfig> {
    addresses
        .iter()
        .map(|a| HostConfig::new(a, "root", Some("secret"), None).unwrap())
        .collect()
}

fn one_bad_of_four() -> MemoryConnector {
    MemoryConnector::new().with_unreachable("10.0.0.3:22", "connection refused")
}

#[tokio::test]
async fn test_strict_pool_fails_on_one_bad_host() {
    let err = ConnectionPool::connect(
        Arc::new(one_bad_of_four()),
        &hosts(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]),
        PoolPolicy::Strict,
    )
    .await
    .err()
    .expect("strict pool must fail");

    match &err {
        Error::PoolConstruction { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].address, "10.0.0.3:22");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_fatal());
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn test_best_effort_pool_keeps_reachable_hosts() {
    let pool = ConnectionPool::connect(
        Arc::new(one_bad_of_four()),
        &hosts(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]),
        PoolPolicy::BestEffort,
    )
    .await
    .unwrap();

    assert_eq!(pool.len(), 3);
    let mut addresses = pool.addresses();
    addresses.sort();
    assert_eq!(addresses, vec!["10.0.0.1:22", "10.0.0.2:22", "10.0.0.4:22"]);
    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_strict_pool_reports_every_failed_host() {
    let connector = MemoryConnector::new()
        .with_unreachable("a:22", "timed out")
        .with_unreachable("c:2222", "auth failed");

    let err = ConnectionPool::connect(
        Arc::new(connector),
        &hosts(&["a", "b", "c:2222"]),
        PoolPolicy::Strict,
    )
    .await
    .err()
    .unwrap();

    let message = err.to_string();
    assert!(message.contains("a:22"));
    assert!(message.contains("c:2222"));
    assert!(!message.contains("b:22"));
}

#[tokio::test]
async fn test_pool_uses_prepared_sessions() {
    let connector = MemoryConnector::new()
        .with_session(MemorySession::new("web1:22").with_file("/etc/role", b"web"));

    let pool = ConnectionPool::connect(Arc::new(connector), &hosts(&["web1"]), PoolPolicy::Strict)
        .await
        .unwrap();
    assert_eq!(pool.sessions()[0].file("/etc/role"), Some(b"web".to_vec()));
}

/// Counts closes across every session it hands out.
struct TrackedSession {
    inner: MemorySession,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteSession for TrackedSession {
    fn address(&self) -> &str {
        self.inner.address()
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        self.inner.run_command(command).await
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteMetadata>> {
        self.inner.stat(path).await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.inner.write_file(path, contents).await
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        self.inner.mkdir_all(path).await
    }

    async fn walk(&self, root: &str) -> Result<Vec<RemoteEntry>> {
        self.inner.walk(root).await
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

struct TrackingConnector {
    inner: MemoryConnector,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for TrackingConnector {
    type Session = TrackedSession;

    async fn connect(&self, host: &HostConfig) -> Result<TrackedSession> {
        Ok(TrackedSession {
            inner: self.inner.connect(host).await?,
            closes: Arc::clone(&self.closes),
        })
    }
}

#[tokio::test]
async fn test_strict_pool_closes_sessions_that_connected() {
    let closes = Arc::new(AtomicUsize::new(0));
    let connector = TrackingConnector {
        inner: one_bad_of_four(),
        closes: Arc::clone(&closes),
    };

    let result = ConnectionPool::connect(
        Arc::new(connector),
        &hosts(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]),
        PoolPolicy::Strict,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(closes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_close_attempts_every_session() {
    let closes = Arc::new(AtomicUsize::new(0));
    let sessions = ["a:22", "b:22", "c:22"].map(|address| TrackedSession {
        inner: if address == "a:22" {
            MemorySession::new(address).with_failing_close()
        } else {
            MemorySession::new(address)
        },
        closes: Arc::clone(&closes),
    });

    let pool = ConnectionPool::from_sessions(sessions);
    let err = pool.close().await.unwrap_err();

    assert_eq!(closes.load(Ordering::SeqCst), 3);
    assert!(matches!(err, Error::Close { ref failures } if failures.len() == 1));
    assert!(err.to_string().contains("a:22"));
}
