// Copyright 2025 eraflo
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

//! Path normalization for the resource cache.
//!
//! Every path handed to the cache goes through [`normalize_path`] before it is
//! hashed, so `textures/../textures/a.png` and `./textures/a.png` share one cache
//! slot. When an assets directory is configured, normalization also acts as a
//! sandbox: absolute paths and `..` traversals that leave the directory are
//! rejected.
//!
//! Normalization is purely lexical. The filesystem is never consulted, so a
//! missing file still yields a key (and later a stub).

use std::path::{Component, Path, PathBuf};

/// Normalizes `raw` into an absolute, `.`/`..`-free path.
///
/// Returns `None` when:
/// - `raw` is empty,
/// - `base_dir` is set and `raw` is absolute,
/// - `base_dir` is set and the normalized result falls outside of it,
/// - the current directory cannot be determined for a relative path.
///
/// Containment is checked component by component, so `assets_other/x` is not
/// considered to be inside `assets`.
pub fn normalize_path(raw: &Path, base_dir: Option<&Path>) -> Option<PathBuf> {
    if raw.as_os_str().is_empty() {
        return None;
    }

    match base_dir {
        Some(base) => {
            if raw.is_absolute() || raw.has_root() {
                log::warn!(
                    "VFS: rejecting absolute path '{}' while an assets directory is set",
                    raw.display()
                );
                return None;
            }
            let base = lexically_normal(&absolute(base)?);
            let candidate = lexically_normal(&base.join(raw));
            if candidate.starts_with(&base) {
                Some(candidate)
            } else {
                log::warn!(
                    "VFS: path '{}' escapes assets directory '{}'",
                    raw.display(),
                    base.display()
                );
                None
            }
        }
        None => Some(lexically_normal(&absolute(raw)?)),
    }
}

/// Returns the cache key of an already normalized path.
///
/// The key is the path relative to `base_dir` when it lies inside it, the full
/// path otherwise, with `/` separators on every platform.
pub fn relative_key(canonical: &Path, base_dir: Option<&Path>) -> String {
    let relative = base_dir
        .and_then(|base| canonical.strip_prefix(base).ok())
        .unwrap_or(canonical);
    relative.to_string_lossy().replace('\\', "/")
}

/// Resolves `.` and `..` components without touching the filesystem.
///
/// A `..` that would climb above the root is dropped; on a relative path it is
/// kept.
pub fn lexically_normal(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn absolute(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    match std::env::current_dir() {
        Ok(cwd) => Some(cwd.join(path)),
        Err(e) => {
            log::error!("VFS: cannot resolve '{}': {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PathBuf {
        std::env::temp_dir().join("khora_assets")
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(normalize_path(Path::new(""), None).is_none());
        assert!(normalize_path(Path::new(""), Some(&base())).is_none());
    }

    #[test]
    fn traversal_outside_base_is_rejected() {
        assert!(normalize_path(Path::new("../secret.txt"), Some(&base())).is_none());
        assert!(normalize_path(Path::new("textures/../../secret.txt"), Some(&base())).is_none());
    }

    #[test]
    fn absolute_path_is_rejected_with_base() {
        let absolute = std::env::temp_dir().join("khora_assets").join("a.png");
        assert!(normalize_path(&absolute, Some(&base())).is_none());
    }

    #[test]
    fn sibling_with_common_prefix_is_rejected() {
        assert!(normalize_path(Path::new("../khora_assets_other/a.png"), Some(&base())).is_none());
    }

    #[test]
    fn base_itself_is_allowed() {
        assert_eq!(normalize_path(Path::new("."), Some(&base())), Some(base()));
    }

    #[test]
    fn equivalent_paths_share_a_key() {
        let base = base();
        let a = normalize_path(Path::new("textures/a.png"), Some(&base)).unwrap();
        let b = normalize_path(Path::new("./textures/../textures/a.png"), Some(&base)).unwrap();
        assert_eq!(a, b);
        assert_eq!(relative_key(&a, Some(&base)), "textures/a.png");
        assert_eq!(relative_key(&b, Some(&base)), "textures/a.png");
    }

    #[test]
    fn relative_path_without_base_becomes_absolute() {
        let normalized = normalize_path(Path::new("a/./b/../c.png"), None).unwrap();
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("a/c.png"));
    }

    #[test]
    fn key_without_base_is_full_path() {
        let path = std::env::temp_dir().join("x.png");
        assert_eq!(
            relative_key(&path, None),
            path.to_string_lossy().replace('\\', "/")
        );
    }

    #[test]
    fn lexical_normalization() {
        assert_eq!(lexically_normal(Path::new("a/b/../c")), PathBuf::from("a/c"));
        assert_eq!(lexically_normal(Path::new("../a")), PathBuf::from("../a"));
        assert_eq!(lexically_normal(Path::new("/../a")), PathBuf::from("/a"));
    }
}
