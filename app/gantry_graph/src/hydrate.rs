/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Sources hydration, including the codegen dispatch protocol: a request
//! may accept several sources types, and a registered generator whose
//! `(input, output)` pair is compatible can stand in for native hydration.

use std::ptr;
use std::sync::Arc;

use gantry_core::fs::Snapshot;
use gantry_node::field::Field;
use gantry_node::field::FieldType;
use gantry_node::registry::GenerateSources;
use gantry_node::sources::Filespec;
use gantry_node::sources::SourcesField;

use crate::graph::TargetGraph;

pub use gantry_node::registry::GeneratedSources;

/// A request to hydrate a sources field into a file snapshot, optionally
/// via code generation when the field's own type does not satisfy any of
/// the accepted types.
#[derive(Debug, Clone)]
pub struct HydrateSourcesRequest {
    pub field: Field,
    pub for_sources_types: Vec<&'static FieldType>,
    pub enable_codegen: bool,
}

impl HydrateSourcesRequest {
    pub fn new(field: Field) -> HydrateSourcesRequest {
        HydrateSourcesRequest {
            field,
            for_sources_types: vec![&gantry_node::core_fields::SOURCES],
            enable_codegen: false,
        }
    }

    pub fn for_sources_types(
        mut self,
        for_sources_types: Vec<&'static FieldType>,
    ) -> HydrateSourcesRequest {
        self.for_sources_types = for_sources_types;
        self
    }

    pub fn enable_codegen(mut self) -> HydrateSourcesRequest {
        self.enable_codegen = true;
        self
    }
}

/// A hydrated sources field. `sources_type` is `None` when neither the
/// field's own type nor any generator output satisfied the request, in
/// which case the snapshot is empty.
#[derive(Debug, Clone)]
pub struct HydratedSources {
    pub snapshot: Snapshot,
    pub filespec: Filespec,
    pub sources_type: Option<&'static FieldType>,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AmbiguousCodegenImplementationsError {
    message: String,
    pub generator_names: Vec<&'static str>,
}

impl AmbiguousCodegenImplementationsError {
    fn new(
        generators: &[&Arc<dyn GenerateSources>],
        for_sources_types: &[&'static FieldType],
    ) -> AmbiguousCodegenImplementationsError {
        let mut generator_names: Vec<&'static str> =
            generators.iter().map(|g| g.name()).collect();
        generator_names.sort_unstable();

        let input = generators
            .first()
            .map(|g| g.input().name)
            .unwrap_or("<unknown>");
        let all_same_shape = generators
            .iter()
            .all(|g| {
                generators.first().is_some_and(|first| {
                    ptr::eq(g.input(), first.input()) && ptr::eq(g.output(), first.output())
                })
            });

        let message = if all_same_shape {
            let output = generators
                .first()
                .map(|g| g.output().name)
                .unwrap_or("<unknown>");
            format!(
                "Multiple of the registered code generators can generate {} from {}. It is \
                 ambiguous which implementation to use.\n\nPossible implementations:{}",
                output,
                input,
                generator_names
                    .iter()
                    .map(|name| format!("\n  * {}", name))
                    .collect::<String>(),
            )
        } else {
            // The caller accepted several output types; group candidates by
            // which output each one produces.
            let mut possible_output_types: Vec<&'static str> = generators
                .iter()
                .filter(|g| {
                    for_sources_types
                        .iter()
                        .any(|t| g.output().is_subtype_of(t))
                })
                .map(|g| g.output().name)
                .collect();
            possible_output_types.sort_unstable();
            possible_output_types.dedup();

            let mut with_outputs: Vec<(&'static str, &'static str)> = generators
                .iter()
                .map(|g| (g.output().name, g.name()))
                .collect();
            with_outputs.sort_unstable();
            format!(
                "Multiple of the registered code generators can generate one of {:?} from {}. \
                 It is ambiguous which implementation to use. This can happen when the call \
                 site requests too many different output types from the same original protocol \
                 sources.\n\nPossible implementations with their output type:{}",
                possible_output_types,
                input,
                with_outputs
                    .iter()
                    .map(|(output, name)| format!("\n  * {} -> {}", name, output))
                    .collect::<String>(),
            )
        };

        AmbiguousCodegenImplementationsError {
            message,
            generator_names,
        }
    }
}

impl TargetGraph {
    /// Whether the given sources field type can be turned into
    /// `output_type` by some registered generator.
    pub fn can_generate(
        &self,
        field_type: &'static FieldType,
        output_type: &'static FieldType,
    ) -> bool {
        self.registry().can_generate(field_type, output_type)
    }

    /// Hydrate a sources field. Native hydration against the accepted types
    /// is tried first; with codegen enabled, a single compatible generator
    /// may produce the sources instead, tagged with its output type.
    /// More than one compatible generator is an error.
    pub async fn hydrate_sources(
        &self,
        request: &HydrateSourcesRequest,
    ) -> anyhow::Result<HydratedSources> {
        let field_type = request.field.field_type();
        let view = SourcesField::new(&request.field)?;
        let filespec = view.filespec();

        let relevant_generators: Vec<&Arc<dyn GenerateSources>> = self
            .registry()
            .generators()
            .iter()
            .filter(|g| {
                field_type.is_subtype_of(g.input())
                    && request
                        .for_sources_types
                        .iter()
                        .any(|t| g.output().is_subtype_of(t))
            })
            .collect();
        if request.enable_codegen && relevant_generators.len() > 1 {
            return Err(AmbiguousCodegenImplementationsError::new(
                &relevant_generators,
                &request.for_sources_types,
            )
            .into());
        }
        let generator = relevant_generators.first().copied();

        let native_type = request
            .for_sources_types
            .iter()
            .copied()
            .find(|t| field_type.is_subtype_of(t));
        let use_codegen = request.enable_codegen && generator.is_some();
        if native_type.is_none() && !use_codegen {
            return Ok(HydratedSources {
                snapshot: Snapshot::empty(),
                filespec,
                sources_type: None,
            });
        }

        // Even when generating, the original protocol sources are hydrated
        // first: generators consume them.
        let snapshot = self
            .file_ops()
            .hydrate(&view.path_globs(self.unmatched_glob_behavior()))
            .await?;
        view.validate_resolved_files(snapshot.files())?;

        if let Some(sources_type) = native_type {
            return Ok(HydratedSources {
                snapshot,
                filespec,
                sources_type: Some(sources_type),
            });
        }

        let generator = match generator {
            Some(generator) => generator,
            None => {
                return Ok(HydratedSources {
                    snapshot: Snapshot::empty(),
                    filespec,
                    sources_type: None,
                });
            }
        };
        let protocol_target = self.resolve_target(view.address()).await?;
        let generated = generator
            .generate(&snapshot, &protocol_target, self.file_ops())
            .await?;
        Ok(HydratedSources {
            snapshot: generated.0,
            filespec,
            sources_type: Some(generator.output()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use gantry_core::fs::FileOps;
    use gantry_core::fs::PathGlobs;
    use gantry_core::fs::Snapshot;
    use gantry_node::core_fields::SOURCES;
    use gantry_node::field::FieldType;
    use gantry_node::raw::RawFieldValue;
    use gantry_node::registry::GenerateSources;
    use gantry_node::registry::GeneratedSources;
    use gantry_node::registry::RuleRegistry;
    use gantry_node::target::Target;

    use crate::graph::TargetGraph;
    use crate::hydrate::AmbiguousCodegenImplementationsError;
    use crate::hydrate::HydrateSourcesRequest;
    use crate::testing::addr;
    use crate::testing::decl;
    use crate::testing::registry_builder;
    use crate::testing::target_graph;
    use crate::testing::AVRO_SOURCES;
    use crate::testing::SMALLTALK_SOURCES;
    use crate::testing::TEST_SOURCES;

    struct AvroToSmalltalk {
        name: &'static str,
    }

    #[async_trait]
    impl GenerateSources for AvroToSmalltalk {
        fn name(&self) -> &'static str {
            self.name
        }

        fn input(&self) -> &'static FieldType {
            &AVRO_SOURCES
        }

        fn output(&self) -> &'static FieldType {
            &SMALLTALK_SOURCES
        }

        async fn generate(
            &self,
            _protocol_sources: &Snapshot,
            _target: &Target,
            ops: &dyn FileOps,
        ) -> anyhow::Result<GeneratedSources> {
            let snapshot = ops
                .hydrate(&PathGlobs::new(vec!["a/generated.st".to_owned()]))
                .await?;
            Ok(GeneratedSources(snapshot))
        }
    }

    fn registry_with_generators(names: &[&'static str]) -> RuleRegistry {
        let mut builder = registry_builder();
        for name in names {
            builder.register_source_generator(Arc::new(AvroToSmalltalk { name }));
        }
        builder.build().unwrap()
    }

    fn avro_graph(registry: RuleRegistry) -> TargetGraph {
        target_graph(
            registry,
            &[("a/schema.avsc", "record"), ("a/generated.st", "Object subclass")],
            vec![(
                addr("a", "avro"),
                decl("avro_library").with("sources", RawFieldValue::strings(["*.avsc"])),
            )],
        )
    }

    async fn avro_request(graph: &TargetGraph) -> HydrateSourcesRequest {
        let target = graph.resolve_target(&addr("a", "avro")).await.unwrap();
        HydrateSourcesRequest::new(target.get(&SOURCES).unwrap())
    }

    #[tokio::test]
    async fn test_native_hydration() {
        let graph = target_graph(
            registry_builder().build().unwrap(),
            &[("a/f.txt", "content")],
            vec![(
                addr("a", "t"),
                decl("target").with("sources", RawFieldValue::strings(["*.txt"])),
            )],
        );
        let target = graph.resolve_target(&addr("a", "t")).await.unwrap();
        let request = HydrateSourcesRequest::new(target.get(&SOURCES).unwrap());
        let hydrated = graph.hydrate_sources(&request).await.unwrap();
        assert_eq!(hydrated.snapshot.files(), ["a/f.txt"]);
        // The field's own type satisfied the request.
        assert!(std::ptr::eq(hydrated.sources_type.unwrap(), &SOURCES));
    }

    #[tokio::test]
    async fn test_incompatible_type_yields_empty_snapshot() {
        let graph = avro_graph(registry_builder().build().unwrap());
        let request = avro_request(&graph)
            .await
            .for_sources_types(vec![&TEST_SOURCES]);
        let hydrated = graph.hydrate_sources(&request).await.unwrap();
        assert!(hydrated.snapshot.is_empty());
        assert!(hydrated.sources_type.is_none());
        // The filespec is still available for engine-independent matching.
        assert_eq!(hydrated.filespec.includes, ["a/*.avsc"]);
    }

    #[tokio::test]
    async fn test_codegen_generates_requested_type() {
        let graph = avro_graph(registry_with_generators(&["avro_to_smalltalk"]));
        let request = avro_request(&graph)
            .await
            .for_sources_types(vec![&SMALLTALK_SOURCES])
            .enable_codegen();
        let hydrated = graph.hydrate_sources(&request).await.unwrap();
        assert_eq!(hydrated.snapshot.files(), ["a/generated.st"]);
        assert!(std::ptr::eq(
            hydrated.sources_type.unwrap(),
            &SMALLTALK_SOURCES
        ));
    }

    #[tokio::test]
    async fn test_codegen_disabled_without_flag() {
        let graph = avro_graph(registry_with_generators(&["avro_to_smalltalk"]));
        let request = avro_request(&graph)
            .await
            .for_sources_types(vec![&SMALLTALK_SOURCES]);
        let hydrated = graph.hydrate_sources(&request).await.unwrap();
        assert!(hydrated.snapshot.is_empty());
        assert!(hydrated.sources_type.is_none());
    }

    #[tokio::test]
    async fn test_ambiguous_codegen_implementations() {
        let graph = avro_graph(registry_with_generators(&["gen_two", "gen_one"]));
        let request = avro_request(&graph)
            .await
            .for_sources_types(vec![&SMALLTALK_SOURCES])
            .enable_codegen();
        let err = graph.hydrate_sources(&request).await.unwrap_err();
        let err = err
            .downcast_ref::<AmbiguousCodegenImplementationsError>()
            .unwrap();
        assert_eq!(err.generator_names, ["gen_one", "gen_two"]);
        assert!(err.to_string().contains("gen_one"));
        assert!(err.to_string().contains("gen_two"));
        assert!(err.to_string().contains("SmalltalkSources"));
    }

    #[tokio::test]
    async fn test_can_generate() {
        let graph = avro_graph(registry_with_generators(&["avro_to_smalltalk"]));
        assert!(graph.can_generate(&AVRO_SOURCES, &SMALLTALK_SOURCES));
        assert!(graph.can_generate(&AVRO_SOURCES, &SOURCES));
        assert!(!graph.can_generate(&TEST_SOURCES, &SMALLTALK_SOURCES));
    }
}
