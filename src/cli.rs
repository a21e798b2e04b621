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

use anyhow::{bail, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{HostDefaults, HostSource};
use crate::dispatch::{ExecRequest, TransferRequest};
use crate::session::HostKeyCheck;

/// Host selection and credentials shared by `rcp` and `rexec`.
#[derive(Args, Debug, Clone)]
pub struct HostArgs {
    #[arg(
        short = 'a',
        long,
        value_delimiter = ',',
        conflicts_with = "config",
        required_unless_present = "config",
        help = "Comma-separated list of hosts in hostname[:port] format\nPort defaults to 22. Example: '10.0.0.1,10.0.0.2:2222'"
    )]
    pub addrs: Vec<String>,

    #[arg(
        short = 'c',
        long,
        help = "YAML host file listing addrs with per-host credentials\nEntries inherit username, password and privateKeyPath from the top level"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'u',
        long,
        default_value = "root",
        help = "Username for hosts that do not set one"
    )]
    pub username: String,

    #[arg(
        short = 'p',
        long,
        help = "Password for hosts that do not set one\nTakes precedence over --identity"
    )]
    pub password: Option<String>,

    #[arg(short = 'i', long, help = "SSH private key file path")]
    pub identity: Option<PathBuf>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Connection timeout in seconds [default: 2, or connectTimeout from the host file]"
    )]
    pub connect_timeout: Option<u64>,

    #[arg(
        long,
        value_name = "MODE",
        default_value = "no",
        help = "Host key verification: 'no' (accept any), 'yes' (~/.ssh/known_hosts)\nor a path to a known_hosts file"
    )]
    pub host_key_check: HostKeyCheck,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,
}

impl HostArgs {
    pub fn source(&self) -> HostSource {
        match &self.config {
            Some(path) => HostSource::File(path.clone()),
            None => HostSource::Addrs(self.addrs.clone()),
        }
    }

    pub fn defaults(&self) -> HostDefaults {
        HostDefaults {
            username: self.username.clone(),
            password: self.password.clone(),
            private_key_path: self.identity.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rcp",
    version,
    about = "Copy files to or from many hosts over SFTP",
    long_about = "rcp uploads a local file or directory tree to every host, or downloads one from every host.\nHosts are contacted in parallel; a host that cannot be reached is skipped and the rest still run.",
    after_help = "EXAMPLES:\n  Upload a directory:        rcp -a 10.0.0.1,10.0.0.2 -p secret upload -l ./conf -r /etc/app\n  Overwrite existing files:  rcp -c hosts.yaml upload -l app.toml -r /etc/app --force\n  Download from every host:  rcp -c hosts.yaml download -l ./logs -r /var/log/app"
)]
pub struct RcpCli {
    #[command(flatten)]
    pub hosts: HostArgs,

    #[command(subcommand)]
    pub command: RcpCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RcpCommand {
    /// Upload a local file or directory to every host
    Upload(UploadArgs),
    /// Download a remote file or directory from every host into <local>/<host:port>
    Download(DownloadArgs),
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    #[arg(short = 'l', long = "localpath", help = "Local file or directory")]
    pub local_path: PathBuf,

    #[arg(short = 'r', long = "remotepath", help = "Remote destination path")]
    pub remote_path: String,

    #[arg(long, help = "Overwrite files that already exist on the remote side")]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[arg(short = 'l', long = "localpath", help = "Local destination directory")]
    pub local_path: PathBuf,

    #[arg(short = 'r', long = "remotepath", help = "Remote file or directory")]
    pub remote_path: String,
}

impl RcpCommand {
    pub fn request(&self) -> TransferRequest {
        match self {
            RcpCommand::Upload(args) => TransferRequest {
                local_path: args.local_path.clone(),
                remote_path: args.remote_path.clone(),
                force: args.force,
            },
            RcpCommand::Download(args) => TransferRequest {
                local_path: args.local_path.clone(),
                remote_path: args.remote_path.clone(),
                force: false,
            },
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rexec",
    version,
    about = "Run a command or script on many hosts over SSH",
    long_about = "rexec runs one command, or uploads and runs one local script, on every host in parallel.\nAll hosts must be reachable before anything runs.",
    after_help = "EXAMPLES:\n  Run a command:   rexec -a 10.0.0.1,10.0.0.2 -p secret --cmd 'uptime'\n  Run a script:    rexec -c hosts.yaml -f ./deploy.sh",
    group(ArgGroup::new("task").required(true).args(["cmd", "filename"]))
)]
pub struct RexecCli {
    #[command(flatten)]
    pub hosts: HostArgs,

    #[arg(long, help = "Command to run on every host")]
    pub cmd: Option<String>,

    #[arg(
        short = 'f',
        long,
        help = "Local script to stage under /tmp/scripts and run with /bin/bash or /bin/sh"
    )]
    pub filename: Option<PathBuf>,
}

impl RexecCli {
    pub fn request(&self) -> Result<ExecRequest> {
        match (&self.cmd, &self.filename) {
            (Some(cmd), None) => Ok(ExecRequest::Command(cmd.clone())),
            (None, Some(path)) => Ok(ExecRequest::Script(path.clone())),
            _ => bail!("Exactly one of --cmd or --filename is required"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_clap_definitions() {
        RcpCli::command().debug_assert();
        RexecCli::command().debug_assert();
    }

    #[test]
    fn test_rcp_upload() {
        let cli = RcpCli::try_parse_from([
            "rcp", "-a", "h1,h2:2222", "-p", "pw", "upload", "-l", "./conf", "-r", "/etc", "--force",
        ])
        .unwrap();

        assert_eq!(cli.hosts.addrs, vec!["h1", "h2:2222"]);
        assert_eq!(cli.hosts.username, "root");
        assert_eq!(
            cli.command.request(),
            TransferRequest {
                local_path: PathBuf::from("./conf"),
                remote_path: "/etc".to_string(),
                force: true,
            }
        );
    }

    #[test]
    fn test_rcp_download_has_no_force() {
        let result = RcpCli::try_parse_from([
            "rcp", "-a", "h1", "download", "-l", "out", "-r", "/var/log", "--force",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_addrs_and_config_conflict() {
        let result = RcpCli::try_parse_from([
            "rcp", "-a", "h1", "-c", "hosts.yaml", "download", "-l", "out", "-r", "/x",
        ]);
        assert!(result.is_err());

        let result = RcpCli::try_parse_from(["rcp", "download", "-l", "out", "-r", "/x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rexec_cmd_xor_filename() {
        let cli = RexecCli::try_parse_from(["rexec", "-c", "hosts.yaml", "--cmd", "uptime"]).unwrap();
        assert_eq!(
            cli.request().unwrap(),
            ExecRequest::Command("uptime".to_string())
        );
        assert_eq!(cli.hosts.source(), HostSource::File(PathBuf::from("hosts.yaml")));

        let cli = RexecCli::try_parse_from(["rexec", "-a", "h1", "-f", "run.sh"]).unwrap();
        assert_eq!(cli.request().unwrap(), ExecRequest::Script(PathBuf::from("run.sh")));

        assert!(RexecCli::try_parse_from(["rexec", "-a", "h1"]).is_err());
        assert!(
            RexecCli::try_parse_from(["rexec", "-a", "h1", "--cmd", "x", "-f", "y"]).is_err()
        );
    }

    #[test]
    fn test_host_key_check_flag() {
        let cli = RexecCli::try_parse_from([
            "rexec", "-a", "h1", "--host-key-check", "yes", "--cmd", "id",
        ])
        .unwrap();
        assert_eq!(cli.hosts.host_key_check, HostKeyCheck::DefaultKnownHostsFile);
        assert_eq!(cli.hosts.connect_timeout(), None);
    }

    #[test]
    fn test_verbosity_count() {
        let cli = RexecCli::try_parse_from(["rexec", "-a", "h1", "-vv", "--cmd", "id"]).unwrap();
        assert_eq!(cli.hosts.verbose, 2);
    }
}
