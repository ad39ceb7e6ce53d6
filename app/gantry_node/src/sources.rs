/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A typed view over a sources-schema field: glob expansion, the
//! engine-independent filespec, and resolved-file validation.

use std::sync::Arc;

use gantry_core::address::Address;
use gantry_core::fs::FilespecMatcher;
use gantry_core::fs::GlobExpansionConjunction;
use gantry_core::fs::GlobMatchErrorBehavior;
use gantry_core::fs::PathGlobs;
use serde::Serialize;

use crate::field::validate_resolved_files;
use crate::field::Field;
use crate::field::FieldSchema;

#[derive(Debug, thiserror::Error)]
enum SourcesViewError {
    #[error("Field `{0}` does not have a sources schema")]
    NotASourcesField(&'static str),
    #[error("Sources field `{0}` has no owning address")]
    NoAddress(&'static str),
}

/// The original globs of a sources field, relativized to the build root.
/// Independent of the engine, for static analyses that must match against
/// sources without hydration.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Filespec {
    pub includes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl Filespec {
    pub fn matcher(&self) -> anyhow::Result<FilespecMatcher> {
        FilespecMatcher::new(self.includes.iter().cloned(), self.excludes.iter().cloned())
    }
}

/// A borrowed, schema-checked view over a sources field.
pub struct SourcesField<'a> {
    field: &'a Field,
    address: &'a Address,
}

impl<'a> SourcesField<'a> {
    pub fn new(field: &'a Field) -> anyhow::Result<SourcesField<'a>> {
        if field.field_type().schema != FieldSchema::Sources {
            return Err(SourcesViewError::NotASourcesField(field.field_type().name).into());
        }
        let address = field
            .address()
            .ok_or(SourcesViewError::NoAddress(field.field_type().name))?;
        Ok(SourcesField { field, address })
    }

    pub fn field(&self) -> &'a Field {
        self.field
    }

    pub fn address(&self) -> &'a Address {
        self.address
    }

    /// The raw globs, relative to the target's directory.
    pub fn globs(&self) -> &'a [Arc<str>] {
        self.field.value().as_string_sequence().unwrap_or(&[])
    }

    fn uses_default_globs(&self) -> bool {
        match self.field.field_type().default_globs() {
            None => false,
            Some(default) => {
                let globs = self.globs();
                globs.len() == default.len()
                    && default.iter().all(|d| globs.iter().any(|g| g.as_ref() == *d))
            }
        }
    }

    /// Expansion request for the globs, prefixed with the target's
    /// directory. Explicit globs must all match; a value equal to the
    /// field's declared default silently tolerates zero matches.
    pub fn path_globs(&self, error_behavior: GlobMatchErrorBehavior) -> PathGlobs {
        let globs = self.globs();
        if globs.is_empty() {
            return PathGlobs::new(Vec::new());
        }
        let spec_path = self.address.spec_path();
        let prefixed: Vec<String> = globs
            .iter()
            .map(|glob| match glob.strip_prefix('!') {
                Some(exclude) => format!("!{}", spec_path.join(exclude)),
                None => spec_path.join(glob),
            })
            .collect();
        let conjunction = if self.uses_default_globs() {
            GlobExpansionConjunction::AnyMatch
        } else {
            GlobExpansionConjunction::AllMatch
        };
        PathGlobs::new(prefixed)
            .with_conjunction(conjunction)
            .with_error_behavior(error_behavior)
            .with_description_of_origin(format!(
                "{}'s `{}` field",
                self.address,
                self.field.alias()
            ))
    }

    /// The `{includes, excludes}` form of the globs, from the build root.
    pub fn filespec(&self) -> Filespec {
        let spec_path = self.address.spec_path();
        let mut filespec = Filespec::default();
        for glob in self.globs() {
            match glob.strip_prefix('!') {
                Some(exclude) => filespec.excludes.push(spec_path.join(exclude)),
                None => filespec.includes.push(spec_path.join(glob)),
            }
        }
        filespec
    }

    /// Enforce the field type's declarative constraints on the resolved
    /// file list.
    pub fn validate_resolved_files(&self, files: &[String]) -> anyhow::Result<()> {
        validate_resolved_files(self.field.field_type(), self.address, files)?;
        Ok(())
    }
}

/// Narrow a sources value to a single file, for file-level sub-target
/// generation.
pub(crate) fn single_file_value(relative_file: &str) -> crate::field::FieldValue {
    crate::field::FieldValue::StringSequence(vec![Arc::from(relative_file)].into())
}

#[cfg(test)]
mod tests {
    use gantry_core::address::Address;
    use gantry_core::address::TargetName;
    use gantry_core::fs::GlobExpansionConjunction;
    use gantry_core::fs::GlobMatchErrorBehavior;
    use gantry_core::package_path::PackagePath;

    use crate::field::ExpectedNumFiles;
    use crate::field::Field;
    use crate::field::FieldDefault;
    use crate::field::FieldError;
    use crate::field::FieldSchema;
    use crate::field::FieldType;
    use crate::raw::RawFieldValue;
    use crate::sources::SourcesField;

    static SOURCES: FieldType = FieldType {
        default: FieldDefault::StrList(&["*.txt"]),
        ..FieldType::new("Sources", "sources", FieldSchema::Sources)
    };

    static STRICT_SOURCES: FieldType = FieldType {
        expected_file_extensions: Some(&[".f95"]),
        expected_num_files: Some(ExpectedNumFiles::Range(1, 2)),
        ..FieldType::new("StrictSources", "sources", FieldSchema::Sources)
    };

    fn addr() -> Address {
        Address::new(
            PackagePath::new("a/b").unwrap(),
            TargetName::new("t").unwrap(),
        )
    }

    fn sources_field(raw: Option<RawFieldValue>) -> Field {
        Field::new(&SOURCES, raw.as_ref(), &addr()).unwrap()
    }

    #[test]
    fn test_path_globs_prefixes_and_excludes() {
        let field = sources_field(Some(RawFieldValue::strings(["*.txt", "!ignored.txt"])));
        let view = SourcesField::new(&field).unwrap();
        let globs = view.path_globs(GlobMatchErrorBehavior::Error);
        assert_eq!(globs.globs, ["a/b/*.txt", "!a/b/ignored.txt"]);
        assert!(globs
            .description_of_origin
            .as_deref()
            .unwrap()
            .contains("a/b:t"));
    }

    #[test]
    fn test_conjunction_depends_on_default_globs() {
        // The declared value equals the default glob set: any may match.
        let defaulted = sources_field(None);
        let view = SourcesField::new(&defaulted).unwrap();
        assert_eq!(
            view.path_globs(GlobMatchErrorBehavior::Error).conjunction,
            GlobExpansionConjunction::AnyMatch
        );

        // Explicit globs must all match.
        let explicit = sources_field(Some(RawFieldValue::strings(["lib.txt"])));
        let view = SourcesField::new(&explicit).unwrap();
        assert_eq!(
            view.path_globs(GlobMatchErrorBehavior::Error).conjunction,
            GlobExpansionConjunction::AllMatch
        );
    }

    #[test]
    fn test_filespec() {
        let field = sources_field(Some(RawFieldValue::strings(["*.txt", "!skip/*.txt"])));
        let view = SourcesField::new(&field).unwrap();
        let filespec = view.filespec();
        assert_eq!(filespec.includes, ["a/b/*.txt"]);
        assert_eq!(filespec.excludes, ["a/b/skip/*.txt"]);
        assert_eq!(
            serde_json::to_value(&filespec).unwrap(),
            serde_json::json!({"includes": ["a/b/*.txt"], "excludes": ["a/b/skip/*.txt"]})
        );

        let matcher = filespec.matcher().unwrap();
        assert!(matcher.matches("a/b/f.txt"));
        assert!(!matcher.matches("a/b/skip/f.txt"));
        assert!(!matcher.matches("other/f.txt"));
    }

    #[test]
    fn test_validate_resolved_files() {
        let field = Field::new(
            &STRICT_SOURCES,
            Some(&RawFieldValue::strings(["*.f95"])),
            &addr(),
        )
        .unwrap();
        let view = SourcesField::new(&field).unwrap();

        view.validate_resolved_files(&["a/b/ok.f95".to_owned()])
            .unwrap();

        let extension_err = view
            .validate_resolved_files(&["a/b/bad.c".to_owned()])
            .unwrap_err();
        assert!(matches!(
            extension_err.downcast_ref::<FieldError>(),
            Some(FieldError::UnexpectedFileExtensions { .. })
        ));

        let count_err = view
            .validate_resolved_files(&[
                "a/b/1.f95".to_owned(),
                "a/b/2.f95".to_owned(),
                "a/b/3.f95".to_owned(),
            ])
            .unwrap_err();
        assert!(matches!(
            count_err.downcast_ref::<FieldError>(),
            Some(FieldError::UnexpectedFileCount { .. })
        ));
    }
}
