/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The target model: an address-bound, immutable bundle of field instances,
//! constructed once from raw BUILD values plus the frozen registry of
//! plugin-contributed fields.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::ptr;
use std::sync::Arc;

use dupe::Dupe;
use gantry_core::address::Address;
use starlark_map::small_map::SmallMap;

use crate::field::Field;
use crate::field::FieldSchema;
use crate::field::FieldType;
use crate::raw::RawFieldValue;
use crate::registry::RuleRegistry;
use crate::sources::single_file_value;
use crate::sources::SourcesField;

/// A static target-type descriptor: the BUILD alias, the statically declared
/// field types, and an optional cross-field validation hook run once at
/// construction. Identity is pointer identity.
#[derive(Debug)]
pub struct TargetType {
    pub alias: &'static str,
    pub core_fields: &'static [&'static FieldType],
    pub validate: Option<fn(&Target) -> anyhow::Result<()>>,
}

impl TargetType {
    pub const fn new(
        alias: &'static str,
        core_fields: &'static [&'static FieldType],
    ) -> TargetType {
        TargetType {
            alias,
            core_fields,
            validate: None,
        }
    }

    pub fn id(&'static self) -> TargetTypeId {
        TargetTypeId(self as *const TargetType as usize)
    }
}

/// Interned identity of a target type, usable as a map key.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Hash)]
pub struct TargetTypeId(usize);

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error(
        "Unrecognized field `{alias}` in target {address} of type `{target_type}`. \
         Valid fields: {valid:?}"
    )]
    UnrecognizedField {
        address: Address,
        target_type: &'static str,
        alias: String,
        valid: Vec<&'static str>,
    },
    #[error("Target {address} of type `{target_type}` has no `{field}` field")]
    MissingField {
        address: Address,
        target_type: &'static str,
        field: &'static str,
    },
    #[error("Invalid target {address}: {message}")]
    InvalidTarget { address: Address, message: String },
    #[error(
        "Target {address} cannot generate file-level sub-targets: its type \
         `{target_type}` does not have both a dependencies and a sources field"
    )]
    CannotGenerateSubtargets {
        address: Address,
        target_type: &'static str,
    },
    #[error(
        "Cannot generate a sub-target of {address} for `{file}`: the file does not match \
         the target's `{alias}` field"
    )]
    FileNotInSources {
        address: Address,
        alias: &'static str,
        file: String,
    },
}

#[derive(Debug)]
struct TargetData {
    target_type: &'static TargetType,
    address: Address,
    fields: Box<[Field]>,
}

/// An immutable target: a target type bound to an address with every known
/// field's value computed eagerly. Cheap to clone and shareable across
/// concurrent queries.
#[derive(Clone, Dupe)]
pub struct Target(Arc<TargetData>);

impl Target {
    /// Construct a target from the raw values of its BUILD declaration. For
    /// every field type known to this target's type (core plus
    /// plugin-registered), either consume a matching raw value or apply the
    /// field's default. Unrecognized aliases are a hard error naming the
    /// valid alias set.
    pub fn new(
        target_type: &'static TargetType,
        raw_values: &SmallMap<String, RawFieldValue>,
        address: Address,
        registry: &RuleRegistry,
    ) -> anyhow::Result<Target> {
        let field_types = registry.field_types(target_type);

        for alias in raw_values.keys() {
            if !field_types.iter().any(|ft| ft.alias == alias) {
                let mut valid: Vec<&'static str> =
                    field_types.iter().map(|ft| ft.alias).collect();
                valid.sort_unstable();
                return Err(TargetError::UnrecognizedField {
                    address,
                    target_type: target_type.alias,
                    alias: alias.clone(),
                    valid,
                }
                .into());
            }
        }

        let fields = field_types
            .iter()
            .map(|ft| Field::new(ft, raw_values.get(ft.alias), &address))
            .collect::<anyhow::Result<Box<[Field]>>>()?;

        let target = Target(Arc::new(TargetData {
            target_type,
            address,
            fields,
        }));
        target.run_validate()?;
        Ok(target)
    }

    fn run_validate(&self) -> anyhow::Result<()> {
        if let Some(validate) = self.0.target_type.validate {
            validate(self).map_err(|e| TargetError::InvalidTarget {
                address: self.address().dupe(),
                message: format!("{:#}", e),
            })?;
        }
        Ok(())
    }

    pub fn target_type(&self) -> &'static TargetType {
        self.0.target_type
    }

    pub fn alias(&self) -> &'static str {
        self.0.target_type.alias
    }

    pub fn address(&self) -> &Address {
        &self.0.address
    }

    /// Every field instance, in registration order.
    pub fn field_values(&self) -> &[Field] {
        &self.0.fields
    }

    /// Find the field registered as `requested` or as a subtype of it.
    /// Exact matches win over subtype matches.
    fn find(&self, requested: &'static FieldType) -> Option<&Field> {
        self.0
            .fields
            .iter()
            .find(|f| ptr::eq(f.field_type(), requested))
            .or_else(|| {
                self.0
                    .fields
                    .iter()
                    .find(|f| f.field_type().is_subtype_of(requested))
            })
    }

    pub fn has_field(&self, requested: &'static FieldType) -> bool {
        self.find(requested).is_some()
    }

    /// Fetch a field, synthesizing a default instance when the target's
    /// type does not register the field. Fails only if the field is
    /// required and absent.
    pub fn get(&self, requested: &'static FieldType) -> anyhow::Result<Field> {
        match self.find(requested) {
            Some(field) => Ok(field.dupe()),
            None => Field::new(requested, None, &self.0.address),
        }
    }

    /// Fetch a field that must be registered on this target's type, e.g.
    /// after an `is_applicable` check. Absence is a contract violation.
    pub fn field(&self, requested: &'static FieldType) -> anyhow::Result<&Field> {
        self.find(requested).ok_or_else(|| {
            TargetError::MissingField {
                address: self.0.address.dupe(),
                target_type: self.0.target_type.alias,
                field: requested.name,
            }
            .into()
        })
    }

    fn field_with_schema(&self, schema: FieldSchema) -> Option<&Field> {
        self.0
            .fields
            .iter()
            .find(|f| f.field_type().schema == schema)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("type", &self.0.target_type.alias)
            .field("address", &self.0.address)
            .field("fields", &self.0.fields)
            .finish()
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Target) -> bool {
        ptr::eq(self.0.target_type, other.0.target_type)
            && self.0.address == other.0.address
            && self.0.fields == other.0.fields
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.target_type.id().hash(state);
        self.0.address.hash(state);
        self.0.fields.hash(state);
    }
}

/// Clone a base target into a file-level sub-target owning exactly
/// `full_file_name`. Every field value is copied verbatim except the
/// sources field, which is narrowed to the single file (validated against
/// the base field's globs); async fields are rebound to the derived
/// address.
pub fn generate_subtarget(base: &Target, full_file_name: &str) -> anyhow::Result<Target> {
    let sources = base.field_with_schema(FieldSchema::Sources);
    let has_dependencies = base.field_with_schema(FieldSchema::Dependencies).is_some();
    let sources = match (sources, has_dependencies) {
        (Some(sources), true) => sources,
        _ => {
            return Err(TargetError::CannotGenerateSubtargets {
                address: base.address().dupe(),
                target_type: base.target_type().alias,
            }
            .into());
        }
    };

    let sources_view = SourcesField::new(sources)?;
    if !sources_view.filespec().matcher()?.matches(full_file_name) {
        return Err(TargetError::FileNotInSources {
            address: base.address().dupe(),
            alias: sources.alias(),
            file: full_file_name.to_owned(),
        }
        .into());
    }

    let address = base.address().subtarget_address(full_file_name)?;
    let relative_file = address
        .relative_file_path()
        .unwrap_or(full_file_name)
        .to_owned();

    let fields = base
        .field_values()
        .iter()
        .map(|field| {
            let value = if ptr::eq(field.field_type(), sources.field_type()) {
                single_file_value(&relative_file)
            } else {
                field.value().dupe()
            };
            let field_address = field.field_type().is_async().then(|| address.dupe());
            Field::from_parts(field.field_type(), value, field_address)
        })
        .collect::<Box<[Field]>>();

    let target = Target(Arc::new(TargetData {
        target_type: base.target_type(),
        address,
        fields,
    }));
    target.run_validate()?;
    Ok(target)
}
