/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The declared-target store: the already-parsed output of BUILD files,
//! keyed by address. This component does not parse BUILD syntax.

use dupe::Dupe;
use gantry_core::address::Address;
use gantry_node::raw::RawFieldValue;
use starlark_map::small_map::SmallMap;

#[derive(Debug, thiserror::Error)]
enum StoreError {
    #[error("Attempted to register target {0} twice")]
    RegisteredTargetTwice(Address),
}

/// One parsed BUILD declaration: the target type's alias and the raw
/// `(field alias -> value)` map.
#[derive(Debug, Clone)]
pub struct TargetDecl {
    pub type_alias: String,
    pub values: SmallMap<String, RawFieldValue>,
}

impl TargetDecl {
    pub fn new(type_alias: &str) -> TargetDecl {
        TargetDecl {
            type_alias: type_alias.to_owned(),
            values: SmallMap::new(),
        }
    }

    pub fn with(mut self, field_alias: &str, value: RawFieldValue) -> TargetDecl {
        self.values.insert(field_alias.to_owned(), value);
        self
    }
}

/// All declared targets of the build, in declaration order. Registering the
/// same address twice is an error.
#[derive(Debug, Default)]
pub struct DeclaredTargets {
    map: SmallMap<Address, TargetDecl>,
}

impl DeclaredTargets {
    pub fn new() -> DeclaredTargets {
        DeclaredTargets {
            map: SmallMap::new(),
        }
    }

    pub fn record(&mut self, address: Address, decl: TargetDecl) -> anyhow::Result<()> {
        if self.map.contains_key(&address) {
            return Err(StoreError::RegisteredTargetTwice(address).into());
        }
        self.map.insert(address, decl);
        Ok(())
    }

    pub fn get(&self, address: &Address) -> Option<&TargetDecl> {
        self.map.get(address)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.map.keys()
    }

    /// Base-target addresses declared in `dir` or any of its ancestor
    /// directories, sorted. These are the ownership candidates for a file
    /// in `dir`.
    pub fn candidates_in_ancestors(&self, dir: &gantry_core::package_path::PackagePath) -> Vec<Address> {
        let mut candidates: Vec<Address> = self
            .map
            .keys()
            .filter(|a| a.is_base_target() && a.spec_path().is_ancestor_or_equal(dir))
            .map(|a| a.dupe())
            .collect();
        candidates.sort();
        candidates
    }
}

impl FromIterator<(Address, TargetDecl)> for DeclaredTargets {
    fn from_iter<T: IntoIterator<Item = (Address, TargetDecl)>>(iter: T) -> DeclaredTargets {
        let mut declared = DeclaredTargets::new();
        for (address, decl) in iter {
            // For tests.
            declared.record(address, decl).unwrap();
        }
        declared
    }
}
