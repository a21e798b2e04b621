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

//! Fan-out of one operation over every session in a pool.
//!
//! Each session gets its own task and its own copy of the request. All tasks
//! run to completion; there is no early cancellation. The returned list has
//! exactly one outcome per session, including sessions whose task panicked.

use futures::future::join_all;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Error;
use crate::exec;
use crate::outcome::{ExecOutcome, TransferOutcome};
use crate::pool::ConnectionPool;
use crate::session::RemoteSession;
use crate::transfer;

/// Parameters of an upload or download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Overwrite existing remote files. Ignored by downloads.
    pub force: bool,
}

/// What to run on every host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecRequest {
    Command(String),
    /// Local script, staged on each host before running.
    Script(PathBuf),
}

/// Run `job` once per session concurrently and collect one result each.
///
/// A task that panics or is cancelled is turned into a result by
/// `on_failure` with [`Error::TaskFailed`].
pub async fn fan_out<S, T, F, Fut, E>(sessions: &[Arc<S>], job: F, on_failure: E) -> Vec<T>
where
    S: RemoteSession,
    F: Fn(Arc<S>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    E: Fn(String, Error) -> T,
{
    let (addresses, tasks): (Vec<String>, Vec<_>) = sessions
        .iter()
        .map(|session| {
            (
                session.address().to_string(),
                tokio::spawn(job(Arc::clone(session))),
            )
        })
        .unzip();

    let results = join_all(tasks).await;

    addresses
        .into_iter()
        .zip(results)
        .map(|(address, joined)| match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = if e.is_panic() {
                    format!("task panicked: {}", panic_message(e.into_panic()))
                } else {
                    "task was cancelled".to_string()
                };
                tracing::error!("Task failed for {}: {}", address, reason);
                on_failure(
                    address.clone(),
                    Error::TaskFailed { address, reason },
                )
            }
        })
        .collect()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn failed_transfer(address: String, error: Error) -> TransferOutcome {
    TransferOutcome {
        address,
        result: Err(error),
    }
}

impl<S: RemoteSession> ConnectionPool<S> {
    /// Upload `request.local_path` to `request.remote_path` on every host.
    pub async fn upload(&self, request: &TransferRequest) -> Vec<TransferOutcome> {
        fan_out(
            self.sessions(),
            |session| {
                let request = request.clone();
                async move {
                    transfer::upload(
                        session.as_ref(),
                        &request.local_path,
                        &request.remote_path,
                        request.force,
                    )
                    .await
                }
            },
            failed_transfer,
        )
        .await
    }

    /// Download `request.remote_path` from every host.
    ///
    /// Each host writes below its own `local_path/<address>`.
    pub async fn download(&self, request: &TransferRequest) -> Vec<TransferOutcome> {
        fan_out(
            self.sessions(),
            |session| {
                let local_base = request.local_path.join(session.address());
                let remote_path = request.remote_path.clone();
                async move { transfer::download(session.as_ref(), &local_base, &remote_path).await }
            },
            failed_transfer,
        )
        .await
    }

    /// Run a command or script on every host.
    pub async fn exec(&self, request: &ExecRequest) -> Vec<ExecOutcome> {
        fan_out(
            self.sessions(),
            |session| {
                let request = request.clone();
                async move {
                    match request {
                        ExecRequest::Command(command) => {
                            exec::exec_command(session.as_ref(), &command).await
                        }
                        ExecRequest::Script(path) => {
                            exec::exec_script(session.as_ref(), &path).await
                        }
                    }
                }
            },
            ExecOutcome::not_run,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;

    #[tokio::test]
    async fn test_fan_out_one_result_per_session() {
        let pool = ConnectionPool::from_sessions(
            ["a:22", "b:22", "c:22"].into_iter().map(MemorySession::new),
        );
        let mut addresses = fan_out(
            pool.sessions(),
            |session| async move { session.address().to_string() },
            |address, _| address,
        )
        .await;
        addresses.sort();
        assert_eq!(addresses, vec!["a:22", "b:22", "c:22"]);
    }

    #[tokio::test]
    async fn test_panicking_task_yields_failed_outcome() {
        let pool = ConnectionPool::from_sessions([
            MemorySession::new("a:22").with_command("id", "uid=0\n", 0),
            MemorySession::new("b:22").with_panicking_command("id"),
        ]);

        let outcomes = pool.exec(&ExecRequest::Command("id".to_string())).await;
        assert_eq!(outcomes.len(), 2);

        let a = outcomes.iter().find(|o| o.address == "a:22").unwrap();
        assert!(a.is_success());

        let b = outcomes.iter().find(|o| o.address == "b:22").unwrap();
        assert_eq!(b.exit_status, -1);
        match b.error() {
            Some(Error::TaskFailed { reason, .. }) => assert!(reason.contains("panicked")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
