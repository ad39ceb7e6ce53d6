/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;

#[derive(Debug, thiserror::Error)]
enum PackagePathError {
    #[error("Package path `{0}` must be relative to the build root, not absolute")]
    Absolute(String),
    #[error("Package path `{0}` must not contain `.` or `..` segments")]
    DotSegment(String),
    #[error("Package path `{0}` must use `/` separators with no empty or `\\` segments")]
    MalformedSegment(String),
}

/// A normalized directory path relative to the build root.
///
/// The empty path is the build root itself. Segments are `/`-separated with
/// no leading or trailing separator, and no `.`/`..` traversal.
#[derive(Debug, Clone, Dupe, Eq, PartialEq, Hash, PartialOrd, Ord, Allocative)]
pub struct PackagePath(Arc<str>);

impl PackagePath {
    pub fn root() -> PackagePath {
        PackagePath(Arc::from(""))
    }

    pub fn new(path: &str) -> anyhow::Result<PackagePath> {
        if path.is_empty() {
            return Ok(PackagePath::root());
        }
        if path.starts_with('/') {
            return Err(PackagePathError::Absolute(path.to_owned()).into());
        }
        for segment in path.split('/') {
            match segment {
                "" => return Err(PackagePathError::MalformedSegment(path.to_owned()).into()),
                "." | ".." => return Err(PackagePathError::DotSegment(path.to_owned()).into()),
                _ if segment.contains('\\') => {
                    return Err(PackagePathError::MalformedSegment(path.to_owned()).into());
                }
                _ => {}
            }
        }
        Ok(PackagePath(Arc::from(path)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The final path segment, or the empty string at the build root.
    pub fn basename(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((_, base)) => base,
            None => &self.0,
        }
    }

    pub fn parent(&self) -> Option<PackagePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some((dir, _)) => Some(PackagePath(Arc::from(dir))),
            None => Some(PackagePath::root()),
        }
    }

    /// Join a path onto this directory, producing a build-root-relative path.
    pub fn join(&self, name: &str) -> String {
        if self.is_root() {
            name.to_owned()
        } else {
            format!("{}/{}", self.0, name)
        }
    }

    /// The remainder of `path` below this directory, if it is below it.
    pub fn relativize<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_root() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.as_str())?;
        rest.strip_prefix('/')
    }

    /// True if `dir` is this directory or a subdirectory of it.
    pub fn is_ancestor_or_equal(&self, dir: &PackagePath) -> bool {
        self.relativize(dir.as_str()).is_some() || self == dir
    }
}

impl Display for PackagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("//")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Split a build-root-relative file path into its directory and file name.
pub fn split_file_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use crate::package_path::split_file_path;
    use crate::package_path::PackagePath;

    #[test]
    fn test_new_rejects_malformed_paths() {
        assert!(PackagePath::new("/abs/path").is_err());
        assert!(PackagePath::new("a//b").is_err());
        assert!(PackagePath::new("a/./b").is_err());
        assert!(PackagePath::new("a/../b").is_err());
        assert!(PackagePath::new("a\\b").is_err());
        assert!(PackagePath::new("a/b/").is_err());
    }

    #[test]
    fn test_root_join_and_basename() {
        let root = PackagePath::root();
        assert!(root.is_root());
        assert_eq!(root.join("f.txt"), "f.txt");
        assert_eq!(root.basename(), "");
        assert_eq!(root.parent(), None);

        let dir = PackagePath::new("a/b").unwrap();
        assert_eq!(dir.join("f.txt"), "a/b/f.txt");
        assert_eq!(dir.basename(), "b");
        assert_eq!(dir.parent(), Some(PackagePath::new("a").unwrap()));
    }

    #[test]
    fn test_relativize() {
        let dir = PackagePath::new("a/b").unwrap();
        assert_eq!(dir.relativize("a/b/c/f.txt"), Some("c/f.txt"));
        assert_eq!(dir.relativize("a/bc/f.txt"), None);
        assert_eq!(dir.relativize("other/f.txt"), None);
        assert_eq!(PackagePath::root().relativize("f.txt"), Some("f.txt"));
    }

    #[test]
    fn test_ancestor_or_equal() {
        let a = PackagePath::new("a").unwrap();
        let ab = PackagePath::new("a/b").unwrap();
        assert!(a.is_ancestor_or_equal(&ab));
        assert!(a.is_ancestor_or_equal(&a));
        assert!(PackagePath::root().is_ancestor_or_equal(&ab));
        assert!(!ab.is_ancestor_or_equal(&a));
    }

    #[test]
    fn test_split_file_path() {
        assert_eq!(split_file_path("a/b/f.txt"), ("a/b", "f.txt"));
        assert_eq!(split_file_path("f.txt"), ("", "f.txt"));
    }
}
