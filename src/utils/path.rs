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

//! Path helpers for mirroring trees between the local filesystem and a
//! remote POSIX filesystem.
//!
//! Remote paths are plain `/`-separated strings (SFTP does not know about the
//! local platform's separator). Both roots are normalized before a relative
//! suffix is computed, so `dir`, `dir/` and `./dir/.` map identically.

use std::path::{Component, Path, PathBuf};

/// Collapse repeated separators and `.` segments and drop any trailing `/`.
///
/// `..` segments are kept verbatim; the remote side resolves them.
pub fn normalize_remote(path: &str) -> String {
    let absolute = path.starts_with('/');
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    match (absolute, segments.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => ".".to_string(),
        (true, false) => format!("/{}", segments.join("/")),
        (false, false) => segments.join("/"),
    }
}

/// Join a relative suffix onto a remote base.
pub fn join_remote(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return normalize_remote(base);
    }
    let base = normalize_remote(base);
    if base == "/" {
        format!("/{}", normalize_remote(relative))
    } else if base == "." {
        normalize_remote(relative)
    } else {
        format!("{base}/{}", normalize_remote(relative))
    }
}

/// Final segment of a remote path, if any.
pub fn remote_basename(path: &str) -> Option<String> {
    let normalized = normalize_remote(path);
    match normalized.rsplit('/').next() {
        Some("") | Some(".") | None => None,
        Some(name) => Some(name.to_string()),
    }
}

/// Parent of a remote path, if it has one.
pub fn remote_parent(path: &str) -> Option<String> {
    let normalized = normalize_remote(path);
    if normalized == "/" || normalized == "." {
        return None;
    }
    match normalized.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(normalized[..idx].to_string()),
        None => Some(".".to_string()),
    }
}

/// Every prefix of `path` from the outermost directory down to `path` itself.
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn remote_ancestors(path: &str) -> Vec<String> {
    let normalized = normalize_remote(path);
    let absolute = normalized.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();

    for segment in normalized.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(segment);
        prefixes.push(current.clone());
    }

    prefixes
}

/// Suffix of `path` below `root`, without a leading `/`.
///
/// Returns an empty string when `path` is the root itself and `None` when
/// `path` is not inside `root`. A `.` root is the login directory, whose
/// entries are plain relative paths.
pub fn relative_remote(root: &str, path: &str) -> Option<String> {
    let root = normalize_remote(root);
    let path = normalize_remote(path);

    if path == root {
        return Some(String::new());
    }
    match root.as_str() {
        "/" => path.strip_prefix('/').map(str::to_string),
        "." => {
            let escapes = path.starts_with('/') || path == ".." || path.starts_with("../");
            (!escapes).then_some(path)
        }
        _ => path.strip_prefix(&format!("{root}/")).map(str::to_string),
    }
}

/// Suffix of a local `path` below `root`, compared component-wise.
pub fn relative_local(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = normalize_local(root);
    let path = normalize_local(path);
    path.strip_prefix(&root).ok().map(Path::to_path_buf)
}

/// Convert a local relative path into a `/`-separated remote suffix.
pub fn local_to_remote_suffix(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Map a `/`-separated remote suffix onto a local base directory.
pub fn join_local(base: &Path, remote_suffix: &str) -> PathBuf {
    remote_suffix
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .fold(base.to_path_buf(), |acc, segment| acc.join(segment))
}

fn normalize_local(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
