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

//! Single-host transfers: one file, or a whole tree mirrored in document order.
//!
//! Uploads walk the local tree and recreate it below the remote root; downloads
//! walk the remote tree and recreate it below the local root. If the
//! destination already exists as a directory, the source's basename is
//! appended first, so `upload ./conf /etc` lands in `/etc/conf`.
//!
//! The first failing entry aborts the rest of the walk for that host.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result, Side};
use crate::outcome::{FileEntry, TransferOutcome, TransferSummary};
use crate::session::RemoteSession;
use crate::utils::path::{
    join_local, join_remote, local_to_remote_suffix, normalize_remote, relative_local,
    relative_remote, remote_basename, remote_parent,
};

/// Mode used for local parent directories created by a download.
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Upload `local_path` (file or directory) to `remote_base` on one host.
pub async fn upload<S>(
    session: &S,
    local_path: &Path,
    remote_base: &str,
    force: bool,
) -> TransferOutcome
where
    S: RemoteSession + ?Sized,
{
    let result = upload_tree(session, local_path, remote_base, force).await;
    log_result(session.address(), "upload", &result);
    TransferOutcome {
        address: session.address().to_string(),
        result,
    }
}

/// Download `remote_path` (file or directory) from one host into `local_base`.
pub async fn download<S>(session: &S, local_base: &Path, remote_path: &str) -> TransferOutcome
where
    S: RemoteSession + ?Sized,
{
    let result = download_tree(session, local_base, remote_path).await;
    log_result(session.address(), "download", &result);
    TransferOutcome {
        address: session.address().to_string(),
        result,
    }
}

/// Upload a single regular file to exactly `remote_path`.
///
/// Refuses to overwrite an existing remote file unless `force` is set.
/// Missing remote parent directories are created.
pub async fn upload_file<S>(
    session: &S,
    local_path: &Path,
    remote_path: &str,
    force: bool,
) -> Result<FileEntry>
where
    S: RemoteSession + ?Sized,
{
    let metadata = local_metadata(local_path).await?;
    if metadata.is_dir() {
        return Err(Error::NotAFile {
            path: local_path.display().to_string(),
        });
    }

    let remote_path = normalize_remote(remote_path);
    match session.stat(&remote_path).await? {
        Some(existing) if existing.is_dir => {
            return Err(Error::NotAFile { path: remote_path });
        }
        Some(_) if !force => {
            return Err(Error::Conflict {
                side: Side::Remote,
                path: remote_path,
            });
        }
        _ => {}
    }

    if let Some(parent) = remote_parent(&remote_path) {
        session.mkdir_all(&parent).await?;
    }

    let contents = tokio::fs::read(local_path)
        .await
        .map_err(|e| Error::io(local_path, e))?;
    session.write_file(&remote_path, &contents).await?;

    tracing::debug!(
        "{}: {} -> {} ({} bytes)",
        session.address(),
        local_path.display(),
        remote_path,
        contents.len()
    );

    Ok(FileEntry {
        path: PathBuf::from(remote_path),
        size: contents.len() as u64,
        is_dir: false,
    })
}

/// Download a single remote file to exactly `local_path`.
///
/// An existing local file is always a conflict. Missing local parent
/// directories are created.
pub async fn download_file<S>(session: &S, remote_path: &str, local_path: &Path) -> Result<FileEntry>
where
    S: RemoteSession + ?Sized,
{
    let remote_path = normalize_remote(remote_path);
    match session.stat(&remote_path).await? {
        None => return Err(Error::RemotePathMissing { path: remote_path }),
        Some(metadata) if metadata.is_dir => {
            return Err(Error::NotAFile { path: remote_path });
        }
        Some(_) => {}
    }

    if local_exists(local_path).await? {
        return Err(Error::Conflict {
            side: Side::Local,
            path: local_path.display().to_string(),
        });
    }

    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_local_dir(parent, DEFAULT_DIR_MODE).await?;
    }

    let contents = session.read_file(&remote_path).await?;
    tokio::fs::write(local_path, &contents)
        .await
        .map_err(|e| Error::io(local_path, e))?;

    tracing::debug!(
        "{}: {} -> {} ({} bytes)",
        session.address(),
        remote_path,
        local_path.display(),
        contents.len()
    );

    Ok(FileEntry {
        path: local_path.to_path_buf(),
        size: contents.len() as u64,
        is_dir: false,
    })
}

async fn upload_tree<S>(
    session: &S,
    local_path: &Path,
    remote_base: &str,
    force: bool,
) -> Result<TransferSummary>
where
    S: RemoteSession + ?Sized,
{
    local_metadata(local_path).await?;

    let remote_root = match session.stat(remote_base).await? {
        Some(existing) if existing.is_dir => match local_basename(local_path).await {
            Some(name) => join_remote(remote_base, &name),
            None => normalize_remote(remote_base),
        },
        _ => normalize_remote(remote_base),
    };

    let mut entries = Vec::new();
    for local in walk_local(local_path).await? {
        let relative = relative_local(local_path, &local.path).ok_or_else(|| {
            Error::io(
                &local.path,
                io::Error::new(io::ErrorKind::InvalidInput, "path escapes the upload root"),
            )
        })?;
        let target = join_remote(&remote_root, &local_to_remote_suffix(&relative));

        if local.is_dir {
            session.mkdir_all(&target).await?;
            tracing::debug!("{}: created directory {}", session.address(), target);
            entries.push(FileEntry {
                path: PathBuf::from(target),
                size: 0,
                is_dir: true,
            });
        } else {
            entries.push(upload_file(session, &local.path, &target, force).await?);
        }
    }

    Ok(TransferSummary {
        description: format!(
            "{} -> {}:{}",
            local_path.display(),
            session.address(),
            remote_root
        ),
        entries,
    })
}

async fn download_tree<S>(
    session: &S,
    local_base: &Path,
    remote_path: &str,
) -> Result<TransferSummary>
where
    S: RemoteSession + ?Sized,
{
    let remote_root = normalize_remote(remote_path);
    if session.stat(&remote_root).await?.is_none() {
        return Err(Error::RemotePathMissing { path: remote_root });
    }

    let local_root = match tokio::fs::metadata(local_base).await {
        Ok(metadata) if metadata.is_dir() => match remote_basename(&remote_root) {
            Some(name) => local_base.join(name),
            None => local_base.to_path_buf(),
        },
        _ => local_base.to_path_buf(),
    };

    let mut entries = Vec::new();
    for remote in session.walk(&remote_root).await? {
        let relative = relative_remote(&remote_root, &remote.path).ok_or_else(|| {
            Error::Transport(format!(
                "remote walk returned {} outside of {}",
                remote.path, remote_root
            ))
        })?;
        let target = join_local(&local_root, &relative);

        if remote.metadata.is_dir {
            let mode = remote.metadata.permissions.unwrap_or(DEFAULT_DIR_MODE);
            create_local_dir(&target, mode).await?;
            tracing::debug!("{}: created directory {}", session.address(), target.display());
            entries.push(FileEntry {
                path: target,
                size: 0,
                is_dir: true,
            });
        } else {
            entries.push(download_file(session, &remote.path, &target).await?);
        }
    }

    Ok(TransferSummary {
        description: format!(
            "{}:{} -> {}",
            session.address(),
            remote_root,
            local_root.display()
        ),
        entries,
    })
}

struct LocalEntry {
    path: PathBuf,
    is_dir: bool,
}

/// Walk a local tree in document order with siblings sorted by name.
async fn walk_local(root: &Path) -> Result<Vec<LocalEntry>> {
    let root = root.to_path_buf();
    let walk_root = root.clone();

    tokio::task::spawn_blocking(move || {
        WalkDir::new(&walk_root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| {
                let entry = entry.map_err(|e| {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| walk_root.clone());
                    Error::io(path, io::Error::other(e))
                })?;
                Ok(LocalEntry {
                    is_dir: entry.file_type().is_dir(),
                    path: entry.into_path(),
                })
            })
            .collect::<Result<Vec<_>>>()
    })
    .await
    .map_err(|e| Error::io(root, io::Error::other(e)))?
}

async fn local_metadata(path: &Path) -> Result<std::fs::Metadata> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::LocalPathMissing {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(Error::io(path, e)),
    }
}

async fn local_exists(path: &Path) -> Result<bool> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Basename of a local path, resolving `.` and similar through the filesystem.
async fn local_basename(path: &Path) -> Option<String> {
    if let Some(name) = path.file_name() {
        return Some(name.to_string_lossy().to_string());
    }
    tokio::fs::canonicalize(path)
        .await
        .ok()?
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
}

#[cfg_attr(not(unix), allow(unused_variables))]
async fn create_local_dir(path: &Path, mode: u32) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    builder.create(path).await.map_err(|e| Error::io(path, e))
}

fn log_result(address: &str, operation: &str, result: &Result<TransferSummary>) {
    match result {
        Ok(summary) => tracing::info!(
            "{}: {} finished, {} file(s), {} bytes",
            address,
            operation,
            summary.file_count(),
            summary.total_bytes()
        ),
        Err(e) => tracing::warn!("{}: {} failed: {}", address, operation, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_file_rejects_local_directory() {
        let dir = TempDir::new().unwrap();
        let session = MemorySession::new("h:22");

        let err = upload_file(&session, dir.path(), "/tmp/x", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAFile { .. }));
    }

    #[tokio::test]
    async fn test_upload_file_rejects_remote_directory() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"a").unwrap();
        let session = MemorySession::new("h:22").with_dir("/srv/a.txt");

        let err = upload_file(&session, &local, "/srv/a.txt", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAFile { ref path } if path == "/srv/a.txt"));
    }

    #[tokio::test]
    async fn test_upload_file_force_overwrites() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"new").unwrap();
        let session = MemorySession::new("h:22").with_file("/srv/a.txt", b"old");

        let entry = upload_file(&session, &local, "/srv/a.txt", true).await.unwrap();
        assert_eq!(entry.size, 3);
        assert_eq!(session.file("/srv/a.txt"), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_upload_file_creates_remote_parents() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"a").unwrap();
        let session = MemorySession::new("h:22");

        upload_file(&session, &local, "/deep/er/a.txt", false).await.unwrap();
        assert!(session.is_dir("/deep/er"));
    }

    #[tokio::test]
    async fn test_upload_missing_local_path() {
        let dir = TempDir::new().unwrap();
        let session = MemorySession::new("h:22");

        let outcome = upload(&session, &dir.path().join("nope"), "/srv", false).await;
        assert!(matches!(
            outcome.error(),
            Some(Error::LocalPathMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_into_existing_dir_appends_basename() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("conf");
        std::fs::create_dir(&local).unwrap();
        std::fs::write(local.join("app.toml"), b"x = 1").unwrap();
        let session = MemorySession::new("h:22").with_dir("/etc");

        let outcome = upload(&session, &local, "/etc/", false).await;
        let summary = outcome.result.unwrap();
        assert_eq!(session.file("/etc/conf/app.toml"), Some(b"x = 1".to_vec()));
        assert!(summary.description.ends_with("h:22:/etc/conf"));
    }

    #[tokio::test]
    async fn test_download_missing_remote_path() {
        let dir = TempDir::new().unwrap();
        let session = MemorySession::new("h:22");

        let outcome = download(&session, dir.path(), "/nope").await;
        assert!(matches!(
            outcome.error(),
            Some(Error::RemotePathMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_download_file_rejects_remote_directory() {
        let dir = TempDir::new().unwrap();
        let session = MemorySession::new("h:22").with_dir("/var/log");

        let err = download_file(&session, "/var/log", &dir.path().join("log"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAFile { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_keeps_directory_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let session = MemorySession::new("h:22")
            .with_dir_mode("/srv/private", 0o700)
            .with_file("/srv/private/key", b"k");

        let target = dir.path().join("out");
        let outcome = download(&session, &target, "/srv/private").await;
        assert!(outcome.is_success());

        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
        assert_eq!(std::fs::read(target.join("key")).unwrap(), b"k");
    }
}
