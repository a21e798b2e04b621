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

//! Per-host results of a dispatched operation.

use std::path::PathBuf;

use crate::error::Error;
use crate::ui::OutputFormatter;

/// Exit status reported when the command never ran.
pub const EXIT_STATUS_NOT_RUN: i32 = -1;

/// One file or directory moved by a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Destination path, local or remote depending on direction.
    pub path: PathBuf,
    pub size: u64,
    pub is_dir: bool,
}

/// What a successful transfer did on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// `local -> address:remote` or `address:remote -> local`.
    pub description: String,
    pub entries: Vec<FileEntry>,
}

impl TransferSummary {
    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_dir).count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().filter(|e| !e.is_dir).map(|e| e.size).sum()
    }
}

/// Result of an upload or download on a single host.
#[derive(Debug)]
pub struct TransferOutcome {
    pub address: String,
    pub result: Result<TransferSummary, Error>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }

    pub fn print_summary(&self) {
        print!("{}", OutputFormatter::format_transfer_outcome(self));
    }
}

/// Result of a command or script on a single host.
#[derive(Debug)]
pub struct ExecOutcome {
    pub address: String,
    /// Remote exit status, or [`EXIT_STATUS_NOT_RUN`].
    pub exit_status: i32,
    /// Combined stdout and stderr on success.
    pub result: Result<String, Error>,
}

impl ExecOutcome {
    pub(crate) fn not_run(address: impl Into<String>, error: Error) -> Self {
        Self {
            address: address.into(),
            exit_status: EXIT_STATUS_NOT_RUN,
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }

    pub fn print_output(&self) {
        print!("{}", OutputFormatter::format_exec_outcome(self));
    }
}

/// Common view over outcomes for summaries and exit codes.
pub trait Outcome {
    fn address(&self) -> &str;
    fn is_success(&self) -> bool;
}

impl Outcome for TransferOutcome {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_success(&self) -> bool {
        TransferOutcome::is_success(self)
    }
}

impl Outcome for ExecOutcome {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_success(&self) -> bool {
        ExecOutcome::is_success(self)
    }
}

/// True when any outcome carries an error.
pub fn has_failures<O: Outcome>(outcomes: &[O]) -> bool {
    outcomes.iter().any(|o| !o.is_success())
}

/// `(succeeded, failed)` counts.
pub fn tally<O: Outcome>(outcomes: &[O]) -> (usize, usize) {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    (succeeded, outcomes.len() - succeeded)
}
