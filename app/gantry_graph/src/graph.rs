/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The resolution context: the frozen registry, the engine's filesystem
//! capability, and the declared-target store, tied together behind async
//! resolution methods.
//!
//! Every method is a deterministic function of its inputs; repeated queries
//! are expected to be memoized by the external engine, not cached here.

use std::sync::Arc;

use dupe::Dupe;
use futures::future::try_join_all;
use gantry_core::address::Address;
use gantry_core::fs::FileOps;
use gantry_core::fs::GlobMatchErrorBehavior;
use gantry_core::package_path::split_file_path;
use gantry_node::field::Field;
use gantry_node::field::FieldSchema;
use gantry_node::registry::RuleRegistry;
use gantry_node::sources::SourcesField;
use gantry_node::target::generate_subtarget;
use gantry_node::target::Target;
use gantry_node::target::TargetType;
use starlark_map::small_set::SmallSet;

use crate::store::DeclaredTargets;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("The address {0} does not exist in the workspace")]
    UnknownAddress(Address),
    #[error(
        "Target type `{alias}` for address {address} is not registered. \
         Registered target types: {valid:?}"
    )]
    UnrecognizedTargetType {
        alias: String,
        address: Address,
        valid: Vec<&'static str>,
    },
    #[error("Cannot generate file-level targets for non-base address {0}")]
    NotABaseTarget(Address),
}

/// A base target together with its generated file-level sub-targets, one
/// per resolved source file.
#[derive(Debug)]
pub struct Subtargets {
    pub base: Target,
    pub subtargets: Vec<Target>,
}

/// The resolved file names of a sources field, without file contents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SourcesPaths {
    pub files: Vec<String>,
    pub dirs: Vec<String>,
}

/// The entry point for graph queries. Holds only frozen, shareable state,
/// so it can be used from arbitrarily many concurrent queries.
pub struct TargetGraph {
    registry: Arc<RuleRegistry>,
    file_ops: Arc<dyn FileOps>,
    declared: DeclaredTargets,
    unmatched_glob_behavior: GlobMatchErrorBehavior,
}

impl TargetGraph {
    pub fn new(
        registry: Arc<RuleRegistry>,
        file_ops: Arc<dyn FileOps>,
        declared: DeclaredTargets,
    ) -> TargetGraph {
        TargetGraph {
            registry,
            file_ops,
            declared,
            unmatched_glob_behavior: GlobMatchErrorBehavior::Warn,
        }
    }

    /// Configure how explicit sources globs that match nothing are treated.
    pub fn with_unmatched_glob_behavior(
        mut self,
        behavior: GlobMatchErrorBehavior,
    ) -> TargetGraph {
        self.unmatched_glob_behavior = behavior;
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn file_ops(&self) -> &dyn FileOps {
        self.file_ops.as_ref()
    }

    pub fn declared(&self) -> &DeclaredTargets {
        &self.declared
    }

    pub(crate) fn unmatched_glob_behavior(&self) -> GlobMatchErrorBehavior {
        self.unmatched_glob_behavior
    }

    fn resolve_declared(&self, address: &Address) -> anyhow::Result<Target> {
        let decl = self
            .declared
            .get(address)
            .ok_or_else(|| ResolveError::UnknownAddress(address.dupe()))?;
        let target_type: &'static TargetType = self
            .registry
            .target_type(&decl.type_alias)
            .ok_or_else(|| ResolveError::UnrecognizedTargetType {
                alias: decl.type_alias.clone(),
                address: address.dupe(),
                valid: self.registry.target_type_aliases(),
            })?;
        Target::new(target_type, &decl.values, address.dupe(), &self.registry)
    }

    /// Resolve one address to its target. File-level addresses resolve via
    /// their base target, narrowed to the single file.
    pub async fn resolve_target(&self, address: &Address) -> anyhow::Result<Target> {
        match address.relative_file_path() {
            Some(relative_file) => {
                let base = self.resolve_declared(&address.base_address())?;
                let full_file_name = address.spec_path().join(relative_file);
                generate_subtarget(&base, &full_file_name)
            }
            None => self.resolve_declared(address),
        }
    }

    /// Generate one sub-target per resolved source file of a base target.
    /// Target types without both a dependencies and a sources field do not
    /// split, so that the declared target can still be depended on.
    pub async fn subtargets(&self, address: &Address) -> anyhow::Result<Subtargets> {
        if !address.is_base_target() {
            return Err(ResolveError::NotABaseTarget(address.dupe()).into());
        }
        let base = self.resolve_declared(address)?;

        let has_dependencies = base
            .field_values()
            .iter()
            .any(|f| f.field_type().schema == FieldSchema::Dependencies);
        let sources = base
            .field_values()
            .iter()
            .find(|f| f.field_type().schema == FieldSchema::Sources);
        let sources = match (sources, has_dependencies) {
            (Some(sources), true) => sources,
            _ => {
                return Ok(Subtargets {
                    base,
                    subtargets: Vec::new(),
                });
            }
        };

        let paths = self.sources_paths(sources).await?;
        let subtargets = paths
            .files
            .iter()
            .map(|file| generate_subtarget(&base, file))
            .collect::<anyhow::Result<Vec<Target>>>()?;
        Ok(Subtargets { base, subtargets })
    }

    /// Resolve addresses to targets without expanding base targets into
    /// their file-level sub-targets.
    pub async fn unexpanded_targets(
        &self,
        addresses: &[Address],
    ) -> anyhow::Result<Vec<Target>> {
        try_join_all(addresses.iter().map(|a| self.resolve_target(a))).await
    }

    /// Resolve addresses to targets, expanding each base target into its
    /// file-level sub-targets when it has any.
    pub async fn targets(&self, addresses: &[Address]) -> anyhow::Result<Vec<Target>> {
        let unexpanded = self.unexpanded_targets(addresses).await?;

        let expansions = try_join_all(unexpanded.iter().map(|target| async {
            if target.address().is_base_target() {
                let subtargets = self.subtargets(target.address()).await?;
                Ok::<_, anyhow::Error>(Some(subtargets))
            } else {
                Ok(None)
            }
        }))
        .await?;

        let mut seen: SmallSet<Address> = SmallSet::new();
        let mut result: Vec<Target> = Vec::new();
        for (target, expansion) in unexpanded.into_iter().zip(expansions) {
            let expanded: Vec<Target> = match expansion {
                Some(subtargets) if !subtargets.subtargets.is_empty() => subtargets.subtargets,
                _ => vec![target],
            };
            for target in expanded {
                if seen.insert(target.address().dupe()) {
                    result.push(target);
                }
            }
        }
        Ok(result)
    }

    /// Hydrate a sources field to its file names only, validating the
    /// field's declarative constraints.
    pub async fn sources_paths(&self, field: &Field) -> anyhow::Result<SourcesPaths> {
        let view = SourcesField::new(field)?;
        let snapshot = self
            .file_ops
            .hydrate(&view.path_globs(self.unmatched_glob_behavior))
            .await?;
        view.validate_resolved_files(snapshot.files())?;

        let files: Vec<String> = snapshot.files().to_vec();
        let mut dirs: Vec<String> = files
            .iter()
            .map(|f| split_file_path(f).0.to_owned())
            .collect();
        dirs.sort();
        dirs.dedup();
        Ok(SourcesPaths { files, dirs })
    }
}
