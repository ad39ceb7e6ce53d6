/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Ownership queries: which targets own a set of file paths. Candidates
//! are the targets declared in each path's directory or an ancestor of
//! it; matching is by the declared sources filespec, so deleted files
//! (still covered by a glob) resolve to their declaring target.

use dupe::Dupe;
use futures::future::try_join_all;
use gantry_core::address::Address;
use gantry_core::fs::PathGlobs;
use gantry_core::package_path::split_file_path;
use gantry_core::package_path::PackagePath;
use gantry_node::field::FieldSchema;
use starlark_map::small_set::SmallSet;

use crate::graph::TargetGraph;

/// What to do for paths with no owning target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OwnersNotFoundBehavior {
    Ignore,
    Warn,
    Error,
}

/// A request for the owners of a set of build-root-relative file paths.
#[derive(Debug, Clone)]
pub struct OwnersRequest {
    pub sources: Vec<String>,
    pub owners_not_found_behavior: OwnersNotFoundBehavior,
}

impl OwnersRequest {
    pub fn new(sources: Vec<String>) -> OwnersRequest {
        OwnersRequest {
            sources,
            owners_not_found_behavior: OwnersNotFoundBehavior::Ignore,
        }
    }

    pub fn with_not_found_behavior(mut self, behavior: OwnersNotFoundBehavior) -> OwnersRequest {
        self.owners_not_found_behavior = behavior;
        self
    }
}

/// The owning addresses, sorted. Live files resolve to file-level
/// sub-target addresses; deleted files resolve to the declaring target.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Owners(pub Vec<Address>);

#[derive(Debug, thiserror::Error)]
#[error(
    "No owning targets could be found for the files {files:?}. Please check that there is a \
     BUILD declaration in each file's directory (or an ancestor) with a target whose `sources` \
     field includes the file."
)]
pub struct NoOwnerError {
    pub files: Vec<String>,
}

impl TargetGraph {
    /// Find the owners of each path in the request.
    pub async fn owners(&self, request: &OwnersRequest) -> anyhow::Result<Owners> {
        // Determine which of the requested paths currently exist: live
        // files get file-level owners, deleted ones resolve against the
        // declared globs of unexpanded targets.
        let live_snapshot = self
            .file_ops()
            .hydrate(&PathGlobs::new(request.sources.clone()))
            .await?;

        let mut matching: SmallSet<Address> = SmallSet::new();
        let mut unmatched: Vec<String> = Vec::new();

        for source in &request.sources {
            let is_live = live_snapshot.files().iter().any(|f| f == source);
            let dir = PackagePath::new(split_file_path(source).0)?;
            let candidates = self.declared().candidates_in_ancestors(&dir);
            let candidate_targets =
                try_join_all(candidates.iter().map(|a| self.resolve_target(a))).await?;

            let mut found = false;
            for target in &candidate_targets {
                let sources_field = target
                    .field_values()
                    .iter()
                    .find(|f| f.field_type().schema == FieldSchema::Sources);
                let sources_field = match sources_field {
                    Some(field) => field,
                    None => continue,
                };
                let view = gantry_node::sources::SourcesField::new(sources_field)?;
                if !view.filespec().matcher()?.matches(source) {
                    continue;
                }
                found = true;
                let has_dependencies = target
                    .field_values()
                    .iter()
                    .any(|f| f.field_type().schema == FieldSchema::Dependencies);
                // Live files owned by a splittable target resolve with
                // file-level precision.
                if is_live && has_dependencies {
                    matching.insert(target.address().subtarget_address(source)?);
                } else {
                    matching.insert(target.address().dupe());
                }
            }
            if !found {
                unmatched.push(source.clone());
            }
        }

        if !unmatched.is_empty() {
            match request.owners_not_found_behavior {
                OwnersNotFoundBehavior::Ignore => {}
                OwnersNotFoundBehavior::Warn => {
                    tracing::warn!(files = ?unmatched, "no owning targets found");
                }
                OwnersNotFoundBehavior::Error => {
                    unmatched.sort();
                    return Err(NoOwnerError { files: unmatched }.into());
                }
            }
        }

        let mut owners: Vec<Address> = matching.into_iter().collect();
        owners.sort();
        Ok(Owners(owners))
    }
}

#[cfg(test)]
mod tests {
    use gantry_node::raw::RawFieldValue;

    use crate::owners::NoOwnerError;
    use crate::owners::OwnersNotFoundBehavior;
    use crate::owners::OwnersRequest;
    use crate::testing::addr;
    use crate::testing::decl;
    use crate::testing::file_addr;
    use crate::testing::simple_target_graph;

    fn graph() -> crate::graph::TargetGraph {
        simple_target_graph(
            &[("a/f1.txt", ""), ("a/f2.txt", "")],
            vec![
                (
                    addr("a", "t"),
                    decl("generator").with("sources", RawFieldValue::strings(["*.txt"])),
                ),
                (
                    addr("", "top"),
                    decl("generator").with("sources", RawFieldValue::strings(["**/*.md"])),
                ),
            ],
        )
    }

    #[tokio::test]
    async fn test_live_file_owned_at_file_level() {
        let owners = graph()
            .owners(&OwnersRequest::new(vec!["a/f1.txt".to_owned()]))
            .await
            .unwrap();
        assert_eq!(owners.0, [file_addr("a", "t", "f1.txt")]);
    }

    #[tokio::test]
    async fn test_deleted_file_owned_by_declared_glob() {
        // The file does not exist, but the declared glob still covers it.
        let owners = graph()
            .owners(&OwnersRequest::new(vec!["a/deleted.txt".to_owned()]))
            .await
            .unwrap();
        assert_eq!(owners.0, [addr("a", "t")]);
    }

    #[tokio::test]
    async fn test_ancestor_targets_are_candidates() {
        let owners = graph()
            .owners(&OwnersRequest::new(vec!["a/b/doc.md".to_owned()]))
            .await
            .unwrap();
        assert_eq!(owners.0, [addr("", "top")]);
    }

    #[tokio::test]
    async fn test_unowned_files_honor_behavior() {
        let request = OwnersRequest::new(vec!["a/unowned.py".to_owned()]);
        let owners = graph().owners(&request).await.unwrap();
        assert!(owners.0.is_empty());

        let err = graph()
            .owners(&request.with_not_found_behavior(OwnersNotFoundBehavior::Error))
            .await
            .unwrap_err();
        let err = err.downcast_ref::<NoOwnerError>().unwrap();
        assert_eq!(err.files, ["a/unowned.py"]);
    }
}
