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

//! Single-host command and script execution.

use chrono::{DateTime, Local};
use std::path::Path;

use crate::error::{Error, Result};
use crate::outcome::ExecOutcome;
use crate::session::RemoteSession;
use crate::transfer::upload_file;
use crate::utils::path::join_remote;

/// Remote directory scripts are staged into before running.
pub const SCRIPT_STAGING_DIR: &str = "/tmp/scripts";

/// Interpreters probed for scripts, in order of preference.
pub const INTERPRETERS: [&str; 2] = ["/bin/bash", "/bin/sh"];

/// Run `command` on one host.
///
/// Output is kept only when the command exits 0; a non-zero exit becomes
/// [`Error::RemoteExec`] carrying the real status.
pub async fn exec_command<S>(session: &S, command: &str) -> ExecOutcome
where
    S: RemoteSession + ?Sized,
{
    let address = session.address().to_string();

    let output = match session.run_command(command).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("{}: failed to run '{}': {}", address, command, e);
            return ExecOutcome::not_run(address, e);
        }
    };

    if output.is_success() {
        tracing::info!("{}: '{}' exited 0", address, command);
        return ExecOutcome {
            address,
            exit_status: 0,
            result: Ok(output.combined_string()),
        };
    }

    tracing::debug!(
        "{}: '{}' exited {}, output: {}",
        address,
        command,
        output.exit_status,
        output.combined_string()
    );
    ExecOutcome {
        address,
        exit_status: i32::try_from(output.exit_status).unwrap_or(i32::MAX),
        result: Err(Error::RemoteExec {
            command: command.to_string(),
            exit_status: output.exit_status,
        }),
    }
}

/// Stage a local script on one host and run it with the first available
/// interpreter.
pub async fn exec_script<S>(session: &S, script_path: &Path) -> ExecOutcome
where
    S: RemoteSession + ?Sized,
{
    match stage_script(session, script_path, Local::now()).await {
        Ok(command) => exec_command(session, &command).await,
        Err(e) => {
            tracing::warn!(
                "{}: failed to stage {}: {}",
                session.address(),
                script_path.display(),
                e
            );
            ExecOutcome::not_run(session.address(), e)
        }
    }
}

/// Remote path a script is staged at: `/tmp/scripts/<YYYYmmddHHMMSS>_<name>`.
pub fn staged_script_path(basename: &str, at: DateTime<Local>) -> String {
    join_remote(
        SCRIPT_STAGING_DIR,
        &format!("{}_{}", at.format("%Y%m%d%H%M%S"), basename),
    )
}

/// First interpreter from [`INTERPRETERS`] present on the host.
pub async fn find_interpreter<S>(session: &S) -> Result<&'static str>
where
    S: RemoteSession + ?Sized,
{
    for interpreter in INTERPRETERS {
        if session.stat(interpreter).await?.is_some() {
            return Ok(interpreter);
        }
    }
    Err(Error::InterpreterNotFound {
        probed: INTERPRETERS.iter().map(|s| s.to_string()).collect(),
    })
}

async fn stage_script<S>(session: &S, script_path: &Path, at: DateTime<Local>) -> Result<String>
where
    S: RemoteSession + ?Sized,
{
    let basename = script_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| Error::NotAFile {
            path: script_path.display().to_string(),
        })?;

    let staged = staged_script_path(&basename, at);
    upload_file(session, script_path, &staged, true).await?;
    let interpreter = find_interpreter(session).await?;

    tracing::debug!("{}: staged {} at {}", session.address(), basename, staged);
    Ok(format!("{interpreter} {staged}"))
}
