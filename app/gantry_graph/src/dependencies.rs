/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Direct-dependency resolution. Per target, edges come from four sources
//! merged with fixed precedence: explicit BUILD entries, plugin-injected
//! addresses, inferred addresses from source analysis, and (opt-in)
//! special-cased dependency fields — plus the implicit sibling-file edges
//! of file-level targets when no inference implementation is precise
//! enough to replace them.
//!
//! The sources are computed concurrently but merged in declaration order,
//! so the result is identical regardless of async completion order.

use dupe::Dupe;
use futures::future::try_join_all;
use gantry_core::address::parse_address;
use gantry_core::address::Address;
use gantry_core::address::AddressInput;
use gantry_node::core_fields::SOURCES;
use gantry_node::deps::DependenciesField;
use gantry_node::field::Field;
use gantry_node::field::FieldSchema;
use gantry_node::registry::InferredDependencies;
use gantry_node::sources::SourcesField;
use gantry_node::target::Target;
use starlark_map::small_set::SmallSet;

use crate::graph::TargetGraph;

/// A request to resolve one target's direct dependencies, via its
/// dependencies field instance.
#[derive(Debug, Clone)]
pub struct DependenciesRequest {
    pub field: Field,
    pub include_special_cased_deps: bool,
}

impl DependenciesRequest {
    pub fn new(field: Field) -> DependenciesRequest {
        DependenciesRequest {
            field,
            include_special_cased_deps: false,
        }
    }

    pub fn include_special_cased_deps(mut self) -> DependenciesRequest {
        self.include_special_cased_deps = true;
        self
    }
}

/// The literal addresses of a BUILD `dependencies` field: includes and
/// ignores, resolved and sorted, with the includes deliberately not
/// filtered by the ignores.
///
/// Also the shared disambiguation helper for ambiguous candidate sets,
/// used both by dependency inference and by owner-style queries.
#[derive(Debug, Clone)]
pub struct ExplicitlyProvidedDependencies {
    pub address: Address,
    pub includes: Vec<Address>,
    pub ignores: Vec<Address>,
}

impl ExplicitlyProvidedDependencies {
    /// An address is covered if it or its base target appears in the set.
    fn covered(set: &[Address], address: &Address) -> bool {
        set.binary_search(address).is_ok()
            || set.binary_search(&address.base_address()).is_ok()
    }

    pub fn any_are_covered_by_includes(&self, addresses: &[Address]) -> bool {
        addresses
            .iter()
            .any(|a| Self::covered(&self.includes, a))
    }

    /// Candidates that survive the explicit ignores and, when requested,
    /// the owners-must-be-ancestors filter (candidates declared outside
    /// the declaring target's ancestor directories are dropped).
    pub fn remaining_after_disambiguation(
        &self,
        addresses: &[Address],
        owners_must_be_ancestors: bool,
    ) -> Vec<Address> {
        addresses
            .iter()
            .filter(|a| {
                if Self::covered(&self.ignores, a) {
                    return false;
                }
                if owners_must_be_ancestors
                    && !a.spec_path().is_ancestor_or_equal(self.address.spec_path())
                {
                    return false;
                }
                true
            })
            .map(|a| a.dupe())
            .collect()
    }

    /// If exactly one candidate remains after disambiguation, that is the
    /// answer. Explicitly included candidates mean the user already chose,
    /// so no answer is derived.
    pub fn disambiguated(
        &self,
        addresses: &[Address],
        owners_must_be_ancestors: bool,
    ) -> Option<Address> {
        if addresses.is_empty() || self.any_are_covered_by_includes(addresses) {
            return None;
        }
        let remaining =
            self.remaining_after_disambiguation(addresses, owners_must_be_ancestors);
        match remaining.as_slice() {
            [only] => Some(only.dupe()),
            _ => None,
        }
    }

    /// Advisory: dependency inference is best-effort, so unresolvable
    /// ambiguity only warns and the edge is dropped.
    pub fn maybe_warn_of_ambiguous_dependency_inference(
        &self,
        ambiguous_addresses: &[Address],
        context: &str,
        import_reference: &str,
        owners_must_be_ancestors: bool,
    ) {
        if ambiguous_addresses.is_empty()
            || self.any_are_covered_by_includes(ambiguous_addresses)
        {
            return;
        }
        let remaining = self
            .remaining_after_disambiguation(ambiguous_addresses, owners_must_be_ancestors);
        if remaining.len() <= 1 {
            return;
        }
        let mut candidates: Vec<String> = remaining.iter().map(|a| a.to_string()).collect();
        candidates.sort();
        tracing::warn!(
            "{}, but more than one target owns this {}, so it is ambiguous which to use: \
             {:?}. Please explicitly include the dependency you want in the `dependencies` \
             field of {}, or ignore the ones you do not want by prefixing with `!` or `!!` \
             so that one or no targets are left.",
            context,
            import_reference,
            candidates,
            self.address,
        );
    }
}

impl TargetGraph {
    /// Parse and resolve the literal entries of a dependencies field.
    pub async fn explicitly_provided_dependencies(
        &self,
        field: &Field,
    ) -> anyhow::Result<ExplicitlyProvidedDependencies> {
        let view = DependenciesField::new(field)?;
        let parsed = view.parsed(self.registry())?;

        fn resolve(inputs: Vec<AddressInput>) -> anyhow::Result<Vec<Address>> {
            let mut addresses = inputs
                .into_iter()
                .map(AddressInput::into_address)
                .collect::<anyhow::Result<Vec<Address>>>()?;
            addresses.sort();
            addresses.dedup();
            Ok(addresses)
        }

        Ok(ExplicitlyProvidedDependencies {
            address: view.address().dupe(),
            includes: resolve(parsed.includes)?,
            ignores: resolve(parsed.ignores)?,
        })
    }

    async fn injected_dependencies(&self, field: &Field) -> anyhow::Result<Vec<Address>> {
        let injectors: Vec<_> = self
            .registry()
            .injectors_for(field.field_type())
            .collect();
        let injected = try_join_all(
            injectors
                .iter()
                .map(|injector| injector.inject(field, self.file_ops())),
        )
        .await?;
        Ok(injected
            .into_iter()
            .flat_map(|i| i.0.into_iter())
            .collect())
    }

    /// Run every matching inference implementation over the target's
    /// hydrated sources. Targets without a sources field infer nothing.
    async fn inferred_dependencies(
        &self,
        target: &Target,
    ) -> anyhow::Result<Vec<InferredDependencies>> {
        if !target.has_field(&SOURCES) {
            return Ok(Vec::new());
        }
        let sources_field = target.get(&SOURCES)?;
        let inferrers: Vec<_> = self
            .registry()
            .inferrers_for(sources_field.field_type())
            .collect();
        if inferrers.is_empty() {
            return Ok(Vec::new());
        }

        let view = SourcesField::new(&sources_field)?;
        let snapshot = self
            .file_ops()
            .hydrate(&view.path_globs(self.unmatched_glob_behavior()))
            .await?;
        view.validate_resolved_files(snapshot.files())?;

        try_join_all(
            inferrers
                .iter()
                .map(|inferrer| inferrer.infer(&sources_field, &snapshot, self.file_ops())),
        )
        .await
    }

    /// Addresses from special-cased dependency fields. These behave like
    /// dependencies for introspection, but are excluded from default
    /// resolution; callers opt in per request.
    fn special_cased_dependencies(&self, target: &Target) -> anyhow::Result<Vec<Address>> {
        let mut addresses = Vec::new();
        for field in target.field_values() {
            if field.field_type().schema != FieldSchema::SpecialCasedDependencies {
                continue;
            }
            let origin = format!(
                "the `{}` field of {}",
                field.alias(),
                target.address()
            );
            if let Some(values) = field.value().as_string_sequence() {
                for value in values {
                    addresses.push(parse_address(
                        value,
                        target.address().spec_path(),
                        &origin,
                    )?);
                }
            }
        }
        Ok(addresses)
    }

    /// Resolve one target's direct dependencies: merge the four edge
    /// sources, apply the implicit sibling-file fallback, subtract the
    /// explicit ignores, and sort.
    pub async fn resolve_dependencies(
        &self,
        request: &DependenciesRequest,
    ) -> anyhow::Result<Vec<Address>> {
        let view = DependenciesField::new(&request.field)?;
        let address = view.address().dupe();
        let target = self.resolve_target(&address).await?;

        let base_address = address.base_address();
        let (explicitly_provided, injected, inferred, siblings) = futures::try_join!(
            self.explicitly_provided_dependencies(&request.field),
            self.injected_dependencies(&request.field),
            self.inferred_dependencies(&target),
            self.subtargets(&base_address),
        )?;

        // A base target depends on all of its generated file sub-targets.
        // A file-level target falls back to depending on every sibling
        // file unless some inference implementation claimed to infer
        // sibling dependencies precisely.
        let no_sibling_deps_inferrable = inferred.is_empty()
            || inferred.iter().all(|i| !i.sibling_dependencies_inferrable);
        let sibling_addresses: Vec<Address> =
            if !address.is_file_target() || no_sibling_deps_inferrable {
                siblings
                    .subtargets
                    .iter()
                    .map(|t| t.address().dupe())
                    .filter(|a| *a != address)
                    .collect()
            } else {
                Vec::new()
            };

        let special_cased = if request.include_special_cased_deps {
            self.special_cased_dependencies(&target)?
        } else {
            Vec::new()
        };

        // Merge in fixed precedence order, not completion order.
        let mut merged: SmallSet<Address> = SmallSet::new();
        for address in explicitly_provided
            .includes
            .iter()
            .chain(injected.iter())
            .chain(inferred.iter().flat_map(|i| i.include.iter()))
            .chain(sibling_addresses.iter())
            .chain(special_cased.iter())
        {
            if !explicitly_provided.ignores.contains(address) {
                merged.insert(address.dupe());
            }
        }

        let mut result: Vec<Address> = merged.into_iter().collect();
        result.sort();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use gantry_core::fs::FileOps;
    use gantry_core::fs::Snapshot;
    use gantry_node::core_fields::DEPENDENCIES;
    use gantry_node::field::Field;
    use gantry_node::field::FieldType;
    use gantry_node::registry::InferDependencies;
    use gantry_node::registry::InferredDependencies;
    use gantry_node::registry::InjectDependencies;
    use gantry_node::registry::InjectedDependencies;
    use gantry_node::registry::RuleRegistry;

    use crate::dependencies::DependenciesRequest;
    use crate::dependencies::ExplicitlyProvidedDependencies;
    use crate::graph::TargetGraph;
    use crate::testing::addr;
    use crate::testing::decl;
    use crate::testing::decl_with_deps;
    use crate::testing::file_addr;
    use crate::testing::registry_builder;
    use crate::testing::target_graph;
    use crate::testing::TEST_DEPENDENCIES;
    use crate::testing::TEST_SOURCES;
    use gantry_node::raw::RawFieldValue;

    struct InjectC;

    #[async_trait]
    impl InjectDependencies for InjectC {
        fn name(&self) -> &'static str {
            "inject_c"
        }

        fn inject_for(&self) -> &'static FieldType {
            &TEST_DEPENDENCIES
        }

        async fn inject(
            &self,
            _field: &Field,
            _ops: &dyn FileOps,
        ) -> anyhow::Result<InjectedDependencies> {
            Ok(InjectedDependencies::new([addr("", "c")]))
        }
    }

    struct InferD {
        sibling_deps_inferrable: bool,
    }

    #[async_trait]
    impl InferDependencies for InferD {
        fn name(&self) -> &'static str {
            "infer_d"
        }

        fn infer_from(&self) -> &'static FieldType {
            &TEST_SOURCES
        }

        async fn infer(
            &self,
            _field: &Field,
            _sources: &Snapshot,
            _ops: &dyn FileOps,
        ) -> anyhow::Result<InferredDependencies> {
            Ok(InferredDependencies::new(
                [addr("", "d")],
                self.sibling_deps_inferrable,
            ))
        }
    }

    fn registry_with_plugins(sibling_deps_inferrable: bool) -> RuleRegistry {
        let mut builder = registry_builder();
        builder.register_dependency_injector(Arc::new(InjectC));
        builder.register_dependency_inferrer(Arc::new(InferD {
            sibling_deps_inferrable,
        }));
        builder.build().unwrap()
    }

    async fn resolve(graph: &TargetGraph, address: &gantry_core::address::Address) -> Vec<String> {
        let target = graph.resolve_target(address).await.unwrap();
        let field = target.get(&DEPENDENCIES).unwrap();
        graph
            .resolve_dependencies(&DependenciesRequest::new(field))
            .await
            .unwrap()
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_merge_of_explicit_injected_and_inferred() {
        let graph = target_graph(
            registry_with_plugins(false),
            &[],
            vec![
                (addr("", "a"), decl("target")),
                (addr("", "b"), decl("target")),
                (addr("", "c"), decl("target")),
                (addr("", "d"), decl("target")),
                (addr("", "root"), decl_with_deps("target", &[":a", ":b", "!:b"])),
            ],
        );
        // Explicit `[a, b]` with ignore `!b`, injected `[c]`, inferred
        // `[d]`: exactly `{a, c, d}`, independent of completion order.
        assert_eq!(
            resolve(&graph, &addr("", "root")).await,
            ["//:a", "//:c", "//:d"]
        );
    }

    #[tokio::test]
    async fn test_ignores_apply_to_injected_and_inferred_edges() {
        let graph = target_graph(
            registry_with_plugins(false),
            &[],
            vec![(
                addr("", "root"),
                decl_with_deps("target", &["!:c", "!:d"]),
            )],
        );
        assert!(resolve(&graph, &addr("", "root")).await.is_empty());
    }

    #[tokio::test]
    async fn test_base_target_depends_on_its_file_subtargets() {
        let graph = target_graph(
            registry_builder().build().unwrap(),
            &[("a/f1.txt", ""), ("a/f2.txt", "")],
            vec![(
                addr("a", "gen"),
                decl("generator").with("sources", RawFieldValue::strings(["*.txt"])),
            )],
        );
        assert_eq!(
            resolve(&graph, &addr("a", "gen")).await,
            ["a/f1.txt:gen", "a/f2.txt:gen"]
        );
    }

    #[tokio::test]
    async fn test_file_target_sibling_fallback() {
        let decls = vec![(
            addr("a", "gen"),
            decl("generator").with("sources", RawFieldValue::strings(["*.txt"])),
        )];
        let files = [("a/f1.txt", ""), ("a/f2.txt", "")];

        // Without precise inference, a file target depends on its siblings.
        let graph = target_graph(registry_builder().build().unwrap(), &files, decls.clone());
        assert_eq!(
            resolve(&graph, &file_addr("a", "gen", "f1.txt")).await,
            ["a/f2.txt:gen"]
        );

        // A precise inference implementation replaces the fallback.
        let graph = target_graph(registry_with_plugins(true), &files, decls);
        assert_eq!(
            resolve(&graph, &file_addr("a", "gen", "f1.txt")).await,
            ["//:c", "//:d"]
        );
    }

    #[tokio::test]
    async fn test_special_cased_dependencies_are_opt_in() {
        let graph = target_graph(
            registry_builder().build().unwrap(),
            &[],
            vec![
                (addr("a", "pkg"), decl("target")),
                (
                    addr("a", "arc"),
                    decl("archive").with("packages", RawFieldValue::strings([":pkg"])),
                ),
            ],
        );
        let target = graph.resolve_target(&addr("a", "arc")).await.unwrap();
        let field = target.get(&DEPENDENCIES).unwrap();

        let default = graph
            .resolve_dependencies(&DependenciesRequest::new(field.clone()))
            .await
            .unwrap();
        assert!(default.is_empty());

        let with_special = graph
            .resolve_dependencies(
                &DependenciesRequest::new(field).include_special_cased_deps(),
            )
            .await
            .unwrap();
        assert_eq!(with_special, [addr("a", "pkg")]);
    }

    #[test]
    fn test_disambiguation_via_ignores() {
        let epd = ExplicitlyProvidedDependencies {
            address: addr("a/b", "consumer"),
            includes: Vec::new(),
            ignores: vec![addr("a", "one")],
        };
        let candidates = [addr("a", "one"), addr("a", "two")];
        assert_eq!(
            epd.disambiguated(&candidates, false),
            Some(addr("a", "two"))
        );

        // Covered by includes: the user already chose, nothing to derive.
        let epd = ExplicitlyProvidedDependencies {
            address: addr("a/b", "consumer"),
            includes: vec![addr("a", "one")],
            ignores: Vec::new(),
        };
        assert_eq!(epd.disambiguated(&candidates, false), None);
    }

    #[test]
    fn test_disambiguation_via_ancestry() {
        let epd = ExplicitlyProvidedDependencies {
            address: addr("a/b", "consumer"),
            includes: Vec::new(),
            ignores: Vec::new(),
        };
        let candidates = [addr("a", "one"), addr("other", "two")];
        // `other:two` is not an ancestor of `a/b`, so `a:one` wins.
        assert_eq!(
            epd.disambiguated(&candidates, true),
            Some(addr("a", "one"))
        );
        // Without the ancestry requirement the set stays ambiguous.
        assert_eq!(epd.disambiguated(&candidates, false), None);
    }

    #[test]
    fn test_ignoring_a_base_address_covers_its_file_subtargets() {
        let epd = ExplicitlyProvidedDependencies {
            address: addr("a", "consumer"),
            includes: Vec::new(),
            ignores: vec![addr("a", "one")],
        };
        let candidates = [file_addr("a", "one", "f.txt"), addr("a", "two")];
        assert_eq!(
            epd.disambiguated(&candidates, false),
            Some(addr("a", "two"))
        );
    }
}
