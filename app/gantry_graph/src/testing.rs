/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Shared fixtures for graph tests: a small family of target and field
//! types plus constructors for an in-memory graph.

use std::sync::Arc;

use gantry_core::address::Address;
use gantry_core::address::TargetName;
use gantry_core::fs::testing::InMemoryFileOps;
use gantry_core::package_path::PackagePath;
use gantry_node::core_fields::DEPENDENCIES;
use gantry_node::core_fields::SOURCES;
use gantry_node::core_fields::SPECIAL_CASED_DEPENDENCIES;
use gantry_node::core_fields::TAGS;
use gantry_node::field::FieldSchema;
use gantry_node::field::FieldType;
use gantry_node::raw::RawFieldValue;
use gantry_node::registry::RuleRegistry;
use gantry_node::registry::RuleRegistryBuilder;
use gantry_node::target::TargetType;

use crate::graph::TargetGraph;
use crate::store::DeclaredTargets;
use crate::store::TargetDecl;

pub static TEST_DEPENDENCIES: FieldType = FieldType {
    parent: Some(&DEPENDENCIES),
    supports_transitive_excludes: true,
    ..FieldType::new(
        "TestDependencies",
        "dependencies",
        FieldSchema::Dependencies,
    )
};

pub static TEST_SOURCES: FieldType = FieldType {
    parent: Some(&SOURCES),
    ..FieldType::new("TestSources", "sources", FieldSchema::Sources)
};

pub static PACKAGES: FieldType = FieldType {
    parent: Some(&SPECIAL_CASED_DEPENDENCIES),
    ..FieldType::new(
        "Packages",
        "packages",
        FieldSchema::SpecialCasedDependencies,
    )
};

pub static AVRO_SOURCES: FieldType = FieldType {
    parent: Some(&SOURCES),
    ..FieldType::new("AvroSources", "sources", FieldSchema::Sources)
};

pub static SMALLTALK_SOURCES: FieldType = FieldType {
    parent: Some(&SOURCES),
    ..FieldType::new("SmalltalkSources", "sources", FieldSchema::Sources)
};

pub static MOCK_TARGET: TargetType = TargetType::new(
    "target",
    &[&TEST_DEPENDENCIES, &TEST_SOURCES, &TAGS],
);

/// Same shape as `MOCK_TARGET` under a second alias, for scenarios that
/// exercise file-level sub-target generation.
pub static GENERATOR_TARGET: TargetType =
    TargetType::new("generator", &[&TEST_DEPENDENCIES, &TEST_SOURCES]);

pub static ARCHIVE_TARGET: TargetType =
    TargetType::new("archive", &[&TEST_DEPENDENCIES, &PACKAGES]);

pub static AVRO_LIBRARY: TargetType =
    TargetType::new("avro_library", &[&TEST_DEPENDENCIES, &AVRO_SOURCES]);

/// A builder with the fixture target types pre-registered; tests add their
/// injectors, inferrers, and generators before building.
pub fn registry_builder() -> RuleRegistryBuilder {
    let mut builder = RuleRegistry::builder();
    builder.register_target_type(&MOCK_TARGET).unwrap();
    builder.register_target_type(&GENERATOR_TARGET).unwrap();
    builder.register_target_type(&ARCHIVE_TARGET).unwrap();
    builder.register_target_type(&AVRO_LIBRARY).unwrap();
    builder
}

pub fn addr(path: &str, name: &str) -> Address {
    Address::new(
        PackagePath::new(path).unwrap(),
        TargetName::new(name).unwrap(),
    )
}

pub fn file_addr(path: &str, name: &str, relative_file: &str) -> Address {
    let base = addr(path, name);
    let full = base.spec_path().join(relative_file);
    base.subtarget_address(&full).unwrap()
}

pub fn decl(type_alias: &str) -> TargetDecl {
    TargetDecl::new(type_alias)
}

pub fn decl_with_deps(type_alias: &str, deps: &[&str]) -> TargetDecl {
    TargetDecl::new(type_alias).with(
        "dependencies",
        RawFieldValue::strings(deps.iter().copied()),
    )
}

pub fn target_graph(
    registry: RuleRegistry,
    files: &[(&str, &str)],
    decls: Vec<(Address, TargetDecl)>,
) -> TargetGraph {
    TargetGraph::new(
        Arc::new(registry),
        Arc::new(InMemoryFileOps::new(files.iter().copied())),
        decls.into_iter().collect::<DeclaredTargets>(),
    )
}

/// The common case: fixture registry with no plugin handlers.
pub fn simple_target_graph(
    files: &[(&str, &str)],
    decls: Vec<(Address, TargetDecl)>,
) -> TargetGraph {
    target_graph(registry_builder().build().unwrap(), files, decls)
}
