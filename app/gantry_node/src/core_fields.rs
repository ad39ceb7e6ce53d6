/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The built-in base field types. Language backends subclass `SOURCES` and
//! `DEPENDENCIES` via the `parent` chain; queries against the base types
//! resolve transparently to the subclasses.

use crate::field::FieldSchema;
use crate::field::FieldType;

/// Addresses of other targets this target depends on. `!`-prefixed entries
/// are per-target ignores; `!!`-prefixed entries are transitive excludes on
/// subtypes that opt in via `supports_transitive_excludes`.
pub static DEPENDENCIES: FieldType =
    FieldType::new("Dependencies", "dependencies", FieldSchema::Dependencies);

/// Glob patterns, relative to the target's directory, for the files the
/// target owns. `!`-prefixed entries are exclusions.
pub static SOURCES: FieldType = FieldType::new("Sources", "sources", FieldSchema::Sources);

/// Dependency-like addresses that are excluded from default transitive
/// walks and plain dependency resolution; consumers opt in explicitly.
pub static SPECIAL_CASED_DEPENDENCIES: FieldType = FieldType::new(
    "SpecialCasedDependencies",
    "special_cased_dependencies",
    FieldSchema::SpecialCasedDependencies,
);

/// Arbitrary strings for filtering targets, e.g. `["integration_test"]`.
pub static TAGS: FieldType = FieldType::new("Tags", "tags", FieldSchema::StringSequence);

/// A human-readable description of the target.
pub static DESCRIPTION: FieldType =
    FieldType::new("Description", "description", FieldSchema::String);
