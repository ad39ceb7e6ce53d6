/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! FieldSets: narrowed, statically-typed views over a subset of a target's
//! fields, used by downstream goals to select applicable targets and pull
//! out only the fields they need.

use gantry_core::address::Address;

use crate::field::FieldType;
use crate::registry::RuleRegistry;
use crate::target::Target;

/// A static field-set descriptor: a goal-side projection is applicable to
/// exactly the targets carrying all of its required fields.
#[derive(Debug)]
pub struct FieldSetType {
    pub name: &'static str,
    pub required_fields: &'static [&'static FieldType],
}

impl FieldSetType {
    pub const fn new(
        name: &'static str,
        required_fields: &'static [&'static FieldType],
    ) -> FieldSetType {
        FieldSetType {
            name,
            required_fields,
        }
    }

    pub fn is_applicable(&self, target: &Target) -> bool {
        self.required_fields.iter().all(|ft| target.has_field(ft))
    }

    /// The registered target types this field set can apply to.
    pub fn applicable_target_types(&self, registry: &RuleRegistry) -> Vec<&'static str> {
        let mut aliases: Vec<&'static str> = registry
            .target_types()
            .filter(|tt| {
                let field_types = registry.field_types(*tt);
                self.required_fields.iter().all(|required| {
                    field_types.iter().any(|ft| ft.is_subtype_of(required))
                })
            })
            .map(|tt| tt.alias)
            .collect();
        aliases.sort_unstable();
        aliases
    }
}

/// A typed projection constructed from a target. `create` may assume
/// `is_applicable` was checked; a missing required field surfaces as the
/// target's missing-field error, never a silent default.
pub trait FieldSet: Sized {
    const TYPE: &'static FieldSetType;

    fn create(target: &Target) -> anyhow::Result<Self>;

    fn is_applicable(target: &Target) -> bool {
        Self::TYPE.is_applicable(target)
    }
}

/// Whether a batch query treats zero applicable targets as fine, advisory,
/// or fatal. "No applicable targets" is often a legitimate empty result for
/// optional goals, unlike ambiguity, which usually indicates a plugin
/// conflict.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NoApplicableTargetsBehavior {
    Ignore,
    Warn,
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum FieldSetError {
    #[error(
        "No applicable files or targets matched. {goal} works with these target types: \
         {applicable_aliases:?}, but it was given these target types: {given_aliases:?}"
    )]
    NoApplicableTargets {
        goal: String,
        applicable_aliases: Vec<&'static str>,
        given_aliases: Vec<&'static str>,
    },
    #[error(
        "{goal} only works with one valid target, but was given multiple: {addresses:?}. \
         Please select one of these targets."
    )]
    TooManyTargets { goal: String, addresses: Vec<String> },
    #[error(
        "Multiple registered implementations for {goal} work for {address} (target type \
         `{target_type}`). It is ambiguous which implementation to use. Possible \
         implementations: {field_sets:?}"
    )]
    AmbiguousFieldSetImplementations {
        goal: String,
        address: Address,
        target_type: &'static str,
        field_sets: Vec<&'static str>,
    },
}

/// Batch query over a set of root targets: which registered field-set types
/// apply to each.
pub struct TargetRootsToFieldSetsRequest<'a> {
    pub field_set_types: &'a [&'static FieldSetType],
    pub goal_description: &'a str,
    pub no_applicable_targets_behavior: NoApplicableTargetsBehavior,
    pub expect_single_field_set: bool,
}

/// The applicable field-set types per root target, preserving input order
/// and omitting targets with no applicable field set.
#[derive(Debug)]
pub struct TargetRootsToFieldSets {
    pub mapping: Vec<(Target, Vec<&'static FieldSetType>)>,
}

impl TargetRootsToFieldSets {
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.mapping.iter().map(|(target, _)| target)
    }

    pub fn field_set_types(&self) -> impl Iterator<Item = &'static FieldSetType> + '_ {
        self.mapping
            .iter()
            .flat_map(|(_, field_sets)| field_sets.iter().copied())
    }
}

/// The applicable field-set types for each target, in input order.
pub fn field_set_types_per_target(
    field_set_types: &[&'static FieldSetType],
    targets: &[Target],
) -> Vec<Vec<&'static FieldSetType>> {
    targets
        .iter()
        .map(|target| {
            field_set_types
                .iter()
                .copied()
                .filter(|fst| fst.is_applicable(target))
                .collect()
        })
        .collect()
}

/// Match field-set types against root targets, reporting
/// zero-applicable-targets and ambiguity as distinct, named conditions.
pub fn target_roots_to_field_set_types(
    request: &TargetRootsToFieldSetsRequest<'_>,
    targets: &[Target],
    registry: &RuleRegistry,
) -> anyhow::Result<TargetRootsToFieldSets> {
    let per_target = field_set_types_per_target(request.field_set_types, targets);
    let mapping: Vec<(Target, Vec<&'static FieldSetType>)> = targets
        .iter()
        .zip(per_target)
        .filter(|(_, field_sets)| !field_sets.is_empty())
        .map(|(target, field_sets)| (target.clone(), field_sets))
        .collect();

    if mapping.is_empty() {
        let mut applicable_aliases: Vec<&'static str> = request
            .field_set_types
            .iter()
            .flat_map(|fst| fst.applicable_target_types(registry))
            .collect();
        applicable_aliases.sort_unstable();
        applicable_aliases.dedup();
        let mut given_aliases: Vec<&'static str> =
            targets.iter().map(|t| t.alias()).collect();
        given_aliases.sort_unstable();
        given_aliases.dedup();
        let error = FieldSetError::NoApplicableTargets {
            goal: request.goal_description.to_owned(),
            applicable_aliases,
            given_aliases,
        };
        match request.no_applicable_targets_behavior {
            NoApplicableTargetsBehavior::Ignore => {}
            NoApplicableTargetsBehavior::Warn => tracing::warn!("{}", error),
            NoApplicableTargetsBehavior::Error => return Err(error.into()),
        }
    }

    let result = TargetRootsToFieldSets { mapping };
    if !request.expect_single_field_set {
        return Ok(result);
    }
    if result.mapping.len() > 1 {
        return Err(FieldSetError::TooManyTargets {
            goal: request.goal_description.to_owned(),
            addresses: {
                let mut addresses: Vec<String> =
                    result.targets().map(|t| t.address().to_string()).collect();
                addresses.sort();
                addresses
            },
        }
        .into());
    }
    if let Some((target, field_sets)) = result.mapping.first() {
        if field_sets.len() > 1 {
            return Err(FieldSetError::AmbiguousFieldSetImplementations {
                goal: request.goal_description.to_owned(),
                address: target.address().clone(),
                target_type: target.alias(),
                field_sets: field_sets.iter().map(|fst| fst.name).collect(),
            }
            .into());
        }
    }
    Ok(result)
}
