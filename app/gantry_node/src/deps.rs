/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A typed view over a dependencies-schema field, including the explicit
//! parser for the `!` (per-target ignore) and `!!` (transitive exclude)
//! prefixes on address-like strings.

use std::sync::Arc;

use dupe::Dupe;
use gantry_core::address::Address;
use gantry_core::address::AddressInput;

use crate::field::Field;
use crate::field::FieldSchema;
use crate::registry::RuleRegistry;

#[derive(Debug, thiserror::Error)]
enum DepsViewError {
    #[error("Field `{0}` does not have a dependencies schema")]
    NotADependenciesField(&'static str),
    #[error("Dependencies field `{0}` has no owning address")]
    NoAddress(&'static str),
}

#[derive(Debug, thiserror::Error)]
#[error(
    "Bad value `{bad_value}` in the `{alias}` field for {address}. Transitive excludes with \
     `!!` are not supported for this target type. Did you mean to use a single `!` for a \
     direct exclude?\n\nTransitive excludes work with these target types: {supported:?}"
)]
pub struct TransitiveExcludesNotSupportedError {
    pub bad_value: String,
    pub alias: &'static str,
    pub address: Address,
    pub supported: Vec<&'static str>,
}

/// How one entry of a dependencies field modifies the resolved set.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DepModifier {
    Include,
    /// `!`: removed from this target's resolved set only.
    Ignore,
    /// `!!`: removed from the entire downstream closure.
    TransitiveExclude,
}

/// Split the `!`/`!!` prefix off a dependency spec.
pub fn split_dep_spec(spec: &str) -> (DepModifier, &str) {
    if let Some(rest) = spec.strip_prefix("!!") {
        (DepModifier::TransitiveExclude, rest)
    } else if let Some(rest) = spec.strip_prefix('!') {
        (DepModifier::Ignore, rest)
    } else {
        (DepModifier::Include, spec)
    }
}

/// The entries of a dependencies field, parsed but not yet resolved.
/// Transitive excludes also appear as ignores: a `!!` entry always removes
/// the address from the declaring target's own edges.
#[derive(Debug, Default)]
pub struct ParsedDependencies {
    pub includes: Vec<AddressInput>,
    pub ignores: Vec<AddressInput>,
    pub transitive_excludes: Vec<AddressInput>,
}

/// A borrowed, schema-checked view over a dependencies field.
pub struct DependenciesField<'a> {
    field: &'a Field,
    address: &'a Address,
}

impl<'a> DependenciesField<'a> {
    pub fn new(field: &'a Field) -> anyhow::Result<DependenciesField<'a>> {
        if field.field_type().schema != FieldSchema::Dependencies {
            return Err(DepsViewError::NotADependenciesField(field.field_type().name).into());
        }
        let address = field
            .address()
            .ok_or(DepsViewError::NoAddress(field.field_type().name))?;
        Ok(DependenciesField { field, address })
    }

    pub fn field(&self) -> &'a Field {
        self.field
    }

    pub fn address(&self) -> &'a Address {
        self.address
    }

    pub fn values(&self) -> &'a [Arc<str>] {
        self.field.value().as_string_sequence().unwrap_or(&[])
    }

    pub fn supports_transitive_excludes(&self) -> bool {
        self.field.field_type().supports_transitive_excludes
    }

    /// Parse every entry, classifying by modifier. `!!` entries on a field
    /// type that does not opt into transitive excludes are an error.
    pub fn parsed(&self, registry: &RuleRegistry) -> anyhow::Result<ParsedDependencies> {
        let origin = format!("the `{}` field of {}", self.field.alias(), self.address);
        let mut parsed = ParsedDependencies::default();
        for value in self.values() {
            let (modifier, spec) = split_dep_spec(value);
            if modifier == DepModifier::TransitiveExclude && !self.supports_transitive_excludes()
            {
                return Err(TransitiveExcludesNotSupportedError {
                    bad_value: value.as_ref().to_owned(),
                    alias: self.field.alias(),
                    address: self.address.dupe(),
                    supported: registry.target_types_supporting_transitive_excludes(),
                }
                .into());
            }
            let input = AddressInput::parse(spec, self.address.spec_path(), &origin)?;
            match modifier {
                DepModifier::Include => parsed.includes.push(input),
                DepModifier::Ignore => parsed.ignores.push(input),
                DepModifier::TransitiveExclude => {
                    parsed.ignores.push(input.clone());
                    parsed.transitive_excludes.push(input);
                }
            }
        }
        Ok(parsed)
    }

    /// The raw `!!` entries, unparsed. Empty unless the field type opts in.
    pub fn unevaluated_transitive_excludes(&self) -> Vec<&'a str> {
        if !self.supports_transitive_excludes() {
            return Vec::new();
        }
        self.values()
            .iter()
            .filter_map(|v| v.as_ref().strip_prefix("!!"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use gantry_core::address::Address;
    use gantry_core::address::TargetName;
    use gantry_core::package_path::PackagePath;

    use crate::deps::split_dep_spec;
    use crate::deps::DepModifier;
    use crate::deps::DependenciesField;
    use crate::deps::TransitiveExcludesNotSupportedError;
    use crate::field::Field;
    use crate::field::FieldSchema;
    use crate::field::FieldType;
    use crate::raw::RawFieldValue;
    use crate::registry::RuleRegistry;
    use crate::target::TargetType;

    static DEPENDENCIES: FieldType =
        FieldType::new("Dependencies", "dependencies", FieldSchema::Dependencies);

    static EXCLUDABLE_DEPENDENCIES: FieldType = FieldType {
        parent: Some(&DEPENDENCIES),
        supports_transitive_excludes: true,
        ..FieldType::new(
            "ExcludableDependencies",
            "dependencies",
            FieldSchema::Dependencies,
        )
    };

    static PLAIN_TARGET: TargetType = TargetType::new("plain", &[&DEPENDENCIES]);
    static EXCLUDABLE_TARGET: TargetType =
        TargetType::new("excludable", &[&EXCLUDABLE_DEPENDENCIES]);

    fn addr() -> Address {
        Address::new(
            PackagePath::new("a").unwrap(),
            TargetName::new("t").unwrap(),
        )
    }

    fn registry() -> RuleRegistry {
        let mut builder = RuleRegistry::builder();
        builder.register_target_type(&PLAIN_TARGET).unwrap();
        builder.register_target_type(&EXCLUDABLE_TARGET).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_split_dep_spec() {
        assert_eq!(split_dep_spec(":t"), (DepModifier::Include, ":t"));
        assert_eq!(split_dep_spec("!:t"), (DepModifier::Ignore, ":t"));
        assert_eq!(
            split_dep_spec("!!a/b:t"),
            (DepModifier::TransitiveExclude, "a/b:t")
        );
    }

    #[test]
    fn test_parsed_classifies_entries() {
        let raw = RawFieldValue::strings([":one", "!:two", "!!:three"]);
        let field = Field::new(&EXCLUDABLE_DEPENDENCIES, Some(&raw), &addr()).unwrap();
        let view = DependenciesField::new(&field).unwrap();
        let parsed = view.parsed(&registry()).unwrap();
        assert_eq!(parsed.includes.len(), 1);
        // The transitive exclude is also a local ignore.
        assert_eq!(parsed.ignores.len(), 2);
        assert_eq!(parsed.transitive_excludes.len(), 1);
        assert_eq!(view.unevaluated_transitive_excludes(), [":three"]);
    }

    #[test]
    fn test_transitive_excludes_require_opt_in() {
        let raw = RawFieldValue::strings(["!!:other"]);
        let field = Field::new(&DEPENDENCIES, Some(&raw), &addr()).unwrap();
        let view = DependenciesField::new(&field).unwrap();
        let err = view.parsed(&registry()).unwrap_err();
        let err = err
            .downcast_ref::<TransitiveExcludesNotSupportedError>()
            .unwrap();
        assert_eq!(err.bad_value, "!!:other");
        assert_eq!(err.supported, ["excludable"]);
    }
}
