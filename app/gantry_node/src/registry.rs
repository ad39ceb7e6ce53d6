/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The frozen rule registry: the one-time registration pass that collects
//! target types, plugin-contributed fields, and the dependency-injection,
//! dependency-inference, and source-generation handlers into an immutable
//! value shared by every resolution call.
//!
//! Nothing here is mutable after `build()`; lookups are read-only and
//! therefore safe to share across concurrent queries without locking.

use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::address::Address;
use gantry_core::fs::FileOps;
use gantry_core::fs::Snapshot;
use starlark_map::small_map::SmallMap;

use crate::field::Field;
use crate::field::FieldSchema;
use crate::field::FieldType;
use crate::target::Target;
use crate::target::TargetType;
use crate::target::TargetTypeId;

/// Addresses added unconditionally to a target's direct dependencies by a
/// plugin, before explicit ignores are applied.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InjectedDependencies(pub Vec<Address>);

impl InjectedDependencies {
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> InjectedDependencies {
        let mut addresses: Vec<Address> = addresses.into_iter().collect();
        addresses.sort();
        addresses.dedup();
        InjectedDependencies(addresses)
    }
}

/// Addresses inferred from source content analysis, plus whether this
/// implementation is precise enough at file level that the consumer should
/// not fall back to depending on all sibling files of the same target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InferredDependencies {
    pub include: Vec<Address>,
    pub sibling_dependencies_inferrable: bool,
}

impl InferredDependencies {
    pub fn new(
        include: impl IntoIterator<Item = Address>,
        sibling_dependencies_inferrable: bool,
    ) -> InferredDependencies {
        let mut include: Vec<Address> = include.into_iter().collect();
        include.sort();
        include.dedup();
        InferredDependencies {
            include,
            sibling_dependencies_inferrable,
        }
    }
}

/// The output of a source generator: a snapshot of the derived files.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedSources(pub Snapshot);

/// Plugin hook: unconditionally add dependencies to targets whose
/// dependencies field is `inject_for` or a subtype of it.
#[async_trait]
pub trait InjectDependencies: Send + Sync {
    fn name(&self) -> &'static str;

    fn inject_for(&self) -> &'static FieldType;

    async fn inject(
        &self,
        field: &Field,
        ops: &dyn FileOps,
    ) -> anyhow::Result<InjectedDependencies>;
}

/// Plugin hook: infer dependencies by analyzing the hydrated sources of
/// targets whose sources field is `infer_from` or a subtype of it.
#[async_trait]
pub trait InferDependencies: Send + Sync {
    fn name(&self) -> &'static str;

    fn infer_from(&self) -> &'static FieldType;

    async fn infer(
        &self,
        field: &Field,
        sources: &Snapshot,
        ops: &dyn FileOps,
    ) -> anyhow::Result<InferredDependencies>;
}

/// Plugin hook: derive sources of the `output` type from sources of the
/// `input` type, e.g. an IDL protocol into a concrete language.
#[async_trait]
pub trait GenerateSources: Send + Sync {
    fn name(&self) -> &'static str;

    fn input(&self) -> &'static FieldType;

    fn output(&self) -> &'static FieldType;

    async fn generate(
        &self,
        protocol_sources: &Snapshot,
        target: &Target,
        ops: &dyn FileOps,
    ) -> anyhow::Result<GeneratedSources>;
}

#[derive(Debug, thiserror::Error)]
enum RegistryError {
    #[error("Target type `{0}` registered twice")]
    DuplicateTargetType(&'static str),
    #[error("Field `{field}` registered twice on target type `{target_type}`")]
    DuplicateField {
        target_type: &'static str,
        field: &'static str,
    },
    #[error(
        "Field alias `{alias}` is claimed by both `{first}` and `{second}` on target type \
         `{target_type}`"
    )]
    DuplicateFieldAlias {
        target_type: &'static str,
        alias: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("Cannot register a plugin field on unregistered target type `{0}`")]
    UnknownTargetType(&'static str),
}

/// The immutable, process-wide registry. Built exactly once at startup and
/// then only read.
pub struct RuleRegistry {
    target_types: SmallMap<&'static str, &'static TargetType>,
    plugin_fields: SmallMap<TargetTypeId, Vec<&'static FieldType>>,
    injectors: Vec<Arc<dyn InjectDependencies>>,
    inferrers: Vec<Arc<dyn InferDependencies>>,
    generators: Vec<Arc<dyn GenerateSources>>,
}

impl RuleRegistry {
    pub fn builder() -> RuleRegistryBuilder {
        RuleRegistryBuilder {
            registry: RuleRegistry {
                target_types: SmallMap::new(),
                plugin_fields: SmallMap::new(),
                injectors: Vec::new(),
                inferrers: Vec::new(),
                generators: Vec::new(),
            },
        }
    }

    pub fn target_type(&self, alias: &str) -> Option<&'static TargetType> {
        self.target_types.get(alias).copied()
    }

    pub fn target_types(&self) -> impl Iterator<Item = &'static TargetType> + '_ {
        self.target_types.values().copied()
    }

    pub fn target_type_aliases(&self) -> Vec<&'static str> {
        let mut aliases: Vec<&'static str> = self.target_types.keys().copied().collect();
        aliases.sort_unstable();
        aliases
    }

    /// The full field-type set of a target type: statically declared core
    /// fields plus the plugin fields registered against exactly this type.
    pub fn field_types(&self, target_type: &'static TargetType) -> Vec<&'static FieldType> {
        let mut field_types: Vec<&'static FieldType> = target_type.core_fields.to_vec();
        if let Some(plugin) = self.plugin_fields.get(&target_type.id()) {
            field_types.extend(plugin.iter().copied());
        }
        field_types
    }

    pub fn injectors_for(
        &self,
        field_type: &'static FieldType,
    ) -> impl Iterator<Item = &Arc<dyn InjectDependencies>> + '_ {
        self.injectors
            .iter()
            .filter(move |i| field_type.is_subtype_of(i.inject_for()))
    }

    pub fn inferrers_for(
        &self,
        field_type: &'static FieldType,
    ) -> impl Iterator<Item = &Arc<dyn InferDependencies>> + '_ {
        self.inferrers
            .iter()
            .filter(move |i| field_type.is_subtype_of(i.infer_from()))
    }

    pub fn generators(&self) -> &[Arc<dyn GenerateSources>] {
        &self.generators
    }

    /// Whether any registered generator can produce `output_type` (or a
    /// subtype of it) from `input_type`.
    pub fn can_generate(
        &self,
        input_type: &'static FieldType,
        output_type: &'static FieldType,
    ) -> bool {
        self.generators.iter().any(|g| {
            input_type.is_subtype_of(g.input()) && g.output().is_subtype_of(output_type)
        })
    }

    /// Aliases of the registered target types carrying a dependencies field
    /// that opts into `!!` transitive excludes. Used in diagnostics.
    pub fn target_types_supporting_transitive_excludes(&self) -> Vec<&'static str> {
        let mut aliases: Vec<&'static str> = self
            .target_types
            .values()
            .copied()
            .filter(|tt| {
                self.field_types(*tt).iter().any(|ft| {
                    ft.schema == FieldSchema::Dependencies && ft.supports_transitive_excludes
                })
            })
            .map(|tt| tt.alias)
            .collect();
        aliases.sort_unstable();
        aliases
    }
}

/// Accumulates registrations, then freezes them. Consuming `build()` is the
/// synchronization point: after it, the registry is never mutated.
pub struct RuleRegistryBuilder {
    registry: RuleRegistry,
}

impl RuleRegistryBuilder {
    pub fn register_target_type(
        &mut self,
        target_type: &'static TargetType,
    ) -> anyhow::Result<&mut Self> {
        if self
            .registry
            .target_types
            .insert(target_type.alias, target_type)
            .is_some()
        {
            return Err(RegistryError::DuplicateTargetType(target_type.alias).into());
        }
        Ok(self)
    }

    /// Extend one registered target type with an out-of-core field. The
    /// field applies to that type only.
    pub fn register_plugin_field(
        &mut self,
        target_type: &'static TargetType,
        field_type: &'static FieldType,
    ) -> anyhow::Result<&mut Self> {
        if !self
            .registry
            .target_types
            .values()
            .any(|tt| std::ptr::eq(*tt, target_type))
        {
            return Err(RegistryError::UnknownTargetType(target_type.alias).into());
        }
        match self.registry.plugin_fields.get_mut(&target_type.id()) {
            Some(fields) => fields.push(field_type),
            None => {
                self.registry
                    .plugin_fields
                    .insert(target_type.id(), vec![field_type]);
            }
        }
        Ok(self)
    }

    pub fn register_dependency_injector(
        &mut self,
        injector: Arc<dyn InjectDependencies>,
    ) -> &mut Self {
        self.registry.injectors.push(injector);
        self
    }

    pub fn register_dependency_inferrer(
        &mut self,
        inferrer: Arc<dyn InferDependencies>,
    ) -> &mut Self {
        self.registry.inferrers.push(inferrer);
        self
    }

    pub fn register_source_generator(
        &mut self,
        generator: Arc<dyn GenerateSources>,
    ) -> &mut Self {
        self.registry.generators.push(generator);
        self
    }

    /// Validate field uniqueness per target type and freeze the registry.
    pub fn build(self) -> anyhow::Result<RuleRegistry> {
        for target_type in self.registry.target_types.values().copied() {
            let field_types = self.registry.field_types(target_type);
            for (i, ft) in field_types.iter().enumerate() {
                for earlier in &field_types[..i] {
                    if std::ptr::eq(*earlier, *ft) {
                        return Err(RegistryError::DuplicateField {
                            target_type: target_type.alias,
                            field: ft.name,
                        }
                        .into());
                    }
                    if earlier.alias == ft.alias {
                        return Err(RegistryError::DuplicateFieldAlias {
                            target_type: target_type.alias,
                            alias: ft.alias,
                            first: earlier.name,
                            second: ft.name,
                        }
                        .into());
                    }
                }
            }
        }
        Ok(self.registry)
    }
}
