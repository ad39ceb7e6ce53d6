/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The capability surface the execution engine provides to the graph:
//! glob hydration into content-addressed snapshots, and file reads.
//!
//! The graph core never touches the filesystem itself; everything routes
//! through the async [`FileOps`] trait so that the engine can memoize and
//! parallelize hydration.

use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use allocative::Allocative;
use async_trait::async_trait;
use dupe::Dupe;
use globset::GlobBuilder;
use globset::GlobMatcher;

/// What to do when an explicit include glob matches no files.
#[derive(Copy, Clone, Debug, Dupe, Eq, PartialEq, Hash, Allocative)]
pub enum GlobMatchErrorBehavior {
    Ignore,
    Warn,
    Error,
}

/// Whether every include glob must match, or any may.
#[derive(Copy, Clone, Debug, Dupe, Eq, PartialEq, Hash, Allocative)]
pub enum GlobExpansionConjunction {
    AllMatch,
    AnyMatch,
}

/// A set of build-root-relative glob patterns to hydrate. Entries prefixed
/// with `!` are exclusions.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Allocative)]
pub struct PathGlobs {
    pub globs: Vec<String>,
    pub conjunction: GlobExpansionConjunction,
    pub error_behavior: GlobMatchErrorBehavior,
    pub description_of_origin: Option<String>,
}

impl PathGlobs {
    pub fn new(globs: Vec<String>) -> PathGlobs {
        PathGlobs {
            globs,
            conjunction: GlobExpansionConjunction::AnyMatch,
            error_behavior: GlobMatchErrorBehavior::Ignore,
            description_of_origin: None,
        }
    }

    pub fn with_conjunction(mut self, conjunction: GlobExpansionConjunction) -> PathGlobs {
        self.conjunction = conjunction;
        self
    }

    pub fn with_error_behavior(mut self, error_behavior: GlobMatchErrorBehavior) -> PathGlobs {
        self.error_behavior = error_behavior;
        self
    }

    pub fn with_description_of_origin(mut self, origin: String) -> PathGlobs {
        self.description_of_origin = Some(origin);
        self
    }

    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.globs
            .iter()
            .map(|g| g.as_str())
            .filter(|g| !g.starts_with('!'))
    }

    pub fn excludes(&self) -> impl Iterator<Item = &str> {
        self.globs
            .iter()
            .filter_map(|g| g.as_str().strip_prefix('!'))
    }
}

/// A content hash of a snapshot, supplied by the engine.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Digest([u8; 32]);

impl Dupe for Digest {}

impl Digest {
    pub fn from_bytes(bytes: [u8; 32]) -> Digest {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

/// The result of hydrating a set of globs: a digest plus the sorted list of
/// matched build-root-relative files.
#[derive(Clone, Debug, Dupe, Eq, PartialEq, Hash, Allocative)]
pub struct Snapshot {
    #[allocative(skip)]
    digest: Digest,
    files: Arc<[String]>,
}

impl Snapshot {
    pub fn new(digest: Digest, mut files: Vec<String>) -> Snapshot {
        files.sort();
        files.dedup();
        Snapshot {
            digest,
            files: files.into(),
        }
    }

    pub fn empty() -> Snapshot {
        Snapshot {
            digest: Digest([0; 32]),
            files: Arc::from(Vec::new()),
        }
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Async filesystem capability provided by the execution engine. All graph
/// suspension points that need file data go through this trait.
#[async_trait]
pub trait FileOps: Send + Sync {
    /// Expand globs against the workspace into a snapshot.
    async fn hydrate(&self, globs: &PathGlobs) -> anyhow::Result<Snapshot>;

    /// Read the contents of one file, e.g. for dependency inference.
    async fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, thiserror::Error)]
enum FilespecError {
    #[error("Invalid glob pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// An engine-independent include/exclude matcher over build-root-relative
/// paths. `*` does not cross directory separators; `**` recurses.
pub struct FilespecMatcher {
    includes: Vec<(String, GlobMatcher)>,
    excludes: Vec<(String, GlobMatcher)>,
}

impl FilespecMatcher {
    pub fn new<I, E>(includes: I, excludes: E) -> anyhow::Result<FilespecMatcher>
    where
        I: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        fn compile(pattern: String) -> anyhow::Result<(String, GlobMatcher)> {
            let matcher = GlobBuilder::new(&pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| FilespecError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?
                .compile_matcher();
            Ok((pattern, matcher))
        }
        Ok(FilespecMatcher {
            includes: includes
                .into_iter()
                .map(compile)
                .collect::<anyhow::Result<_>>()?,
            excludes: excludes
                .into_iter()
                .map(compile)
                .collect::<anyhow::Result<_>>()?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.includes.iter().any(|(_, m)| m.is_match(path))
            && !self.excludes.iter().any(|(_, m)| m.is_match(path))
    }

    /// The include patterns that matched none of `paths`.
    pub fn unmatched_includes(&self, paths: &[impl AsRef<str>]) -> Vec<&str> {
        self.includes
            .iter()
            .filter(|(_, m)| !paths.iter().any(|p| m.is_match(p.as_ref())))
            .map(|(pattern, _)| pattern.as_str())
            .collect()
    }
}

pub mod testing {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::fs::Digest;
    use crate::fs::FileOps;
    use crate::fs::FilespecMatcher;
    use crate::fs::GlobExpansionConjunction;
    use crate::fs::GlobMatchErrorBehavior;
    use crate::fs::PathGlobs;
    use crate::fs::Snapshot;

    #[derive(Debug, thiserror::Error)]
    enum InMemoryFileOpsError {
        #[error("Unmatched glob `{glob}` from {origin}")]
        UnmatchedGlob { glob: String, origin: String },
        #[error("No such file `{0}` in the test workspace")]
        NoSuchFile(String),
    }

    /// A deterministic in-process stand-in for the engine's snapshot
    /// capability, backed by a sorted map of file contents.
    #[derive(Default)]
    pub struct InMemoryFileOps {
        files: BTreeMap<String, Arc<[u8]>>,
    }

    impl InMemoryFileOps {
        pub fn new<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> InMemoryFileOps {
            InMemoryFileOps {
                files: files
                    .into_iter()
                    .map(|(name, content)| (name.to_owned(), Arc::from(content.as_bytes())))
                    .collect(),
            }
        }

        fn snapshot_of(&self, files: Vec<String>) -> Snapshot {
            let mut hasher = blake3::Hasher::new();
            for file in &files {
                hasher.update(file.as_bytes());
                hasher.update(b"\0");
                if let Some(content) = self.files.get(file) {
                    hasher.update(content);
                }
                hasher.update(b"\0");
            }
            Snapshot::new(Digest::from_bytes(*hasher.finalize().as_bytes()), files)
        }
    }

    #[async_trait]
    impl FileOps for InMemoryFileOps {
        async fn hydrate(&self, globs: &PathGlobs) -> anyhow::Result<Snapshot> {
            let matcher = FilespecMatcher::new(
                globs.includes().map(str::to_owned),
                globs.excludes().map(str::to_owned),
            )?;
            let matched: Vec<String> = self
                .files
                .keys()
                .filter(|f| matcher.matches(f))
                .cloned()
                .collect();

            if globs.conjunction == GlobExpansionConjunction::AllMatch {
                let all_files: Vec<&String> = self.files.keys().collect();
                for unmatched in matcher.unmatched_includes(&all_files) {
                    let origin = globs
                        .description_of_origin
                        .as_deref()
                        .unwrap_or("<unknown origin>");
                    match globs.error_behavior {
                        GlobMatchErrorBehavior::Ignore => {}
                        GlobMatchErrorBehavior::Warn => {
                            tracing::warn!(glob = %unmatched, origin = %origin, "unmatched glob");
                        }
                        GlobMatchErrorBehavior::Error => {
                            return Err(InMemoryFileOpsError::UnmatchedGlob {
                                glob: unmatched.to_owned(),
                                origin: origin.to_owned(),
                            }
                            .into());
                        }
                    }
                }
            }

            Ok(self.snapshot_of(matched))
        }

        async fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>> {
            match self.files.get(path) {
                Some(content) => Ok(content.to_vec()),
                None => Err(InMemoryFileOpsError::NoSuchFile(path.to_owned()).into()),
            }
        }
    }
}
