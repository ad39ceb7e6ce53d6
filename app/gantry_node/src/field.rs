/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The field model: static field-type descriptors with subtype chains, and
//! immutable, hashable field values computed once at target construction.
//!
//! Field types are `&'static` descriptors with pointer identity; the subtype
//! relation is an explicit `parent` chain rather than any runtime
//! reflection, so both "query by supertype" and "query by exact subtype"
//! resolve with a plain pointer walk.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::ptr;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use gantry_core::address::Address;

use crate::raw::RawFieldValue;

/// The value shape of a field type. The last three schemas are async:
/// their hydration depends on the owning address, so field identity
/// includes the address for them.
#[derive(Copy, Clone, Debug, Dupe, Eq, PartialEq, Hash)]
pub enum FieldSchema {
    Bool,
    Int,
    Float,
    String,
    StringSequence,
    /// Accepts either a single string or a sequence of strings, coercing the
    /// single form to a one-element sequence. The coercion trades schema
    /// precision for BUILD-file convenience.
    StringOrStringSequence,
    DictStringToString,
    DictStringToStringSequence,
    Sources,
    Dependencies,
    SpecialCasedDependencies,
}

impl FieldSchema {
    pub fn is_async(self) -> bool {
        matches!(
            self,
            FieldSchema::Sources | FieldSchema::Dependencies | FieldSchema::SpecialCasedDependencies
        )
    }

    pub fn expected_type_description(self) -> &'static str {
        match self {
            FieldSchema::Bool => "a boolean",
            FieldSchema::Int => "an integer",
            FieldSchema::Float => "a floating point number",
            FieldSchema::String => "a string",
            FieldSchema::StringSequence
            | FieldSchema::Sources
            | FieldSchema::Dependencies
            | FieldSchema::SpecialCasedDependencies => "a sequence of strings",
            FieldSchema::StringOrStringSequence => "a string or a sequence of strings",
            FieldSchema::DictStringToString => "a dict with string keys and string values",
            FieldSchema::DictStringToStringSequence => {
                "a dict with string keys and sequence-of-string values"
            }
        }
    }
}

/// Declarative constraint on the number of files a sources field resolves to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExpectedNumFiles {
    Exact(usize),
    /// Inclusive on both ends.
    Range(usize, usize),
}

impl ExpectedNumFiles {
    fn permits(self, n: usize) -> bool {
        match self {
            ExpectedNumFiles::Exact(expected) => n == expected,
            ExpectedNumFiles::Range(min, max) => n >= min && n <= max,
        }
    }

    fn describe(self) -> String {
        match self {
            ExpectedNumFiles::Exact(1) => "1 file".to_owned(),
            ExpectedNumFiles::Exact(n) => format!("{} files", n),
            ExpectedNumFiles::Range(min, max) => format!("{} to {} files", min, max),
        }
    }
}

/// The default value a field takes when its raw value is absent.
#[derive(Copy, Clone, Debug)]
pub enum FieldDefault {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
    StrList(&'static [&'static str]),
}

impl FieldDefault {
    fn to_value(self) -> FieldValue {
        match self {
            FieldDefault::None => FieldValue::None,
            FieldDefault::Bool(v) => FieldValue::Bool(v),
            FieldDefault::Int(v) => FieldValue::Int(v),
            FieldDefault::Float(v) => FieldValue::Float(FloatLiteral(v)),
            FieldDefault::Str(v) => FieldValue::String(Arc::from(v)),
            FieldDefault::StrList(vs) => {
                FieldValue::StringSequence(vs.iter().map(|v| Arc::from(*v)).collect())
            }
        }
    }
}

/// A static field-type descriptor: the BUILD alias, value schema, default
/// and required semantics, and the declarative validation hooks a target
/// type may set. Identity is pointer identity; `parent` forms the subtype
/// chain.
#[derive(Debug)]
pub struct FieldType {
    pub name: &'static str,
    pub alias: &'static str,
    pub schema: FieldSchema,
    pub parent: Option<&'static FieldType>,
    pub default: FieldDefault,
    pub required: bool,
    pub valid_choices: Option<&'static [&'static str]>,
    pub expected_file_extensions: Option<&'static [&'static str]>,
    pub expected_num_files: Option<ExpectedNumFiles>,
    pub supports_transitive_excludes: bool,
}

impl FieldType {
    pub const fn new(name: &'static str, alias: &'static str, schema: FieldSchema) -> FieldType {
        FieldType {
            name,
            alias,
            schema,
            parent: None,
            default: FieldDefault::None,
            required: false,
            valid_choices: None,
            expected_file_extensions: None,
            expected_num_files: None,
            supports_transitive_excludes: false,
        }
    }

    pub fn id(&'static self) -> FieldTypeId {
        FieldTypeId(self as *const FieldType as usize)
    }

    /// True if `self` is `other` or a declared subtype of it.
    pub fn is_subtype_of(&'static self, other: &'static FieldType) -> bool {
        let mut current = Some(self);
        while let Some(ft) = current {
            if ptr::eq(ft, other) {
                return true;
            }
            current = ft.parent;
        }
        false
    }

    pub fn is_async(&self) -> bool {
        self.schema.is_async()
    }

    pub fn default_value(&self) -> FieldValue {
        self.default.to_value()
    }

    /// The declared default glob set of a sources field, if any.
    pub fn default_globs(&self) -> Option<&'static [&'static str]> {
        match self.default {
            FieldDefault::StrList(globs) => Some(globs),
            _ => None,
        }
    }
}

/// Interned identity of a field type, usable as a map key.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Hash)]
pub struct FieldTypeId(usize);

/// An `f64` that hashes and compares by bit pattern so field values stay
/// hashable. NaNs are equal iff their bits are.
#[derive(Copy, Clone, Debug, Allocative)]
pub struct FloatLiteral(pub f64);

impl Dupe for FloatLiteral {}

impl PartialEq for FloatLiteral {
    fn eq(&self, other: &FloatLiteral) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatLiteral {}

impl Hash for FloatLiteral {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// The computed, immutable value of a field. Sequences and mappings are
/// `Arc`-backed so targets are cheap to clone; mappings preserve declaration
/// order.
#[derive(Clone, Debug, Dupe, Eq, PartialEq, Hash, Allocative)]
pub enum FieldValue {
    None,
    Bool(bool),
    Int(i64),
    Float(FloatLiteral),
    String(Arc<str>),
    StringSequence(Arc<[Arc<str>]>),
    StringDict(Arc<[(Arc<str>, Arc<str>)]>),
    StringSequenceDict(Arc<[(Arc<str>, Arc<[Arc<str>]>)]>),
}

impl FieldValue {
    pub fn is_none(&self) -> bool {
        matches!(self, FieldValue::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string_sequence(&self) -> Option<&[Arc<str>]> {
        match self {
            FieldValue::StringSequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string_dict(&self) -> Option<&[(Arc<str>, Arc<str>)]> {
        match self {
            FieldValue::StringDict(v) => Some(v),
            _ => None,
        }
    }

    /// Render for introspection-style consumers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::None => serde_json::Value::Null,
            FieldValue::Bool(v) => (*v).into(),
            FieldValue::Int(v) => (*v).into(),
            FieldValue::Float(v) => serde_json::Number::from_f64(v.0)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::String(v) => v.as_ref().into(),
            FieldValue::StringSequence(vs) => {
                serde_json::Value::Array(vs.iter().map(|v| v.as_ref().into()).collect())
            }
            FieldValue::StringDict(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().into()))
                    .collect(),
            ),
            FieldValue::StringSequenceDict(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, vs)| {
                        (
                            k.as_ref().to_owned(),
                            serde_json::Value::Array(
                                vs.iter().map(|v| v.as_ref().into()).collect(),
                            ),
                        )
                    })
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("The `{alias}` field in target {address} is required")]
    RequiredFieldMissing { address: Address, alias: &'static str },
    #[error(
        "The `{alias}` field in target {address} must be {expected}, but was given {given}"
    )]
    InvalidFieldType {
        address: Address,
        alias: &'static str,
        expected: &'static str,
        given: String,
    },
    #[error(
        "The `{alias}` field in target {address} must be one of {choices:?}, but was given {given}"
    )]
    InvalidFieldChoice {
        address: Address,
        alias: &'static str,
        given: String,
        choices: &'static [&'static str],
    },
    #[error(
        "The `{alias}` field in target {address} must not have globs containing `../`, \
         because targets can only own sources in their directory or subdirectories; \
         it was set to {globs:?}"
    )]
    GlobTraversal {
        address: Address,
        alias: &'static str,
        globs: Vec<String>,
    },
    #[error(
        "The `{alias}` field in target {address} can only contain files ending in {expected}, \
         but it had these files: {files:?}"
    )]
    UnexpectedFileExtensions {
        address: Address,
        alias: &'static str,
        expected: String,
        files: Vec<String>,
    },
    #[error(
        "The `{alias}` field in target {address} must have {expected}, but it had {actual}"
    )]
    UnexpectedFileCount {
        address: Address,
        alias: &'static str,
        expected: String,
        actual: usize,
    },
}

/// One field instance of a target: a field type plus its computed value.
///
/// Equality and hash cover `(field_type, value)` for primitive schemas and
/// additionally the owning address for async schemas (hydration of those is
/// address-sensitive, e.g. relative glob expansion).
#[derive(Clone, Dupe)]
pub struct Field {
    field_type: &'static FieldType,
    value: FieldValue,
    address: Option<Address>,
}

impl Field {
    /// Compute a field's value from its raw BUILD value. A `None` raw value
    /// takes the declared default unless the field is required.
    pub fn new(
        field_type: &'static FieldType,
        raw_value: Option<&RawFieldValue>,
        address: &Address,
    ) -> anyhow::Result<Field> {
        let value = compute_value(field_type, raw_value, address)?;
        Ok(Field {
            field_type,
            value,
            address: field_type.is_async().then(|| address.dupe()),
        })
    }

    pub(crate) fn from_parts(
        field_type: &'static FieldType,
        value: FieldValue,
        address: Option<Address>,
    ) -> Field {
        Field {
            field_type,
            value,
            address,
        }
    }

    pub fn field_type(&self) -> &'static FieldType {
        self.field_type
    }

    pub fn alias(&self) -> &'static str {
        self.field_type.alias
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// The owning address; present only for async-schema fields.
    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("type", &self.field_type.name)
            .field("value", &self.value)
            .field("address", &self.address)
            .finish()
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Field) -> bool {
        ptr::eq(self.field_type, other.field_type)
            && self.value == other.value
            && self.address == other.address
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.field_type.id().hash(state);
        self.value.hash(state);
        self.address.hash(state);
    }
}

fn invalid_type(ft: &'static FieldType, raw: &RawFieldValue, address: &Address) -> FieldError {
    FieldError::InvalidFieldType {
        address: address.dupe(),
        alias: ft.alias,
        expected: ft.schema.expected_type_description(),
        given: format!("{} of type {}", raw, raw.type_description()),
    }
}

fn check_choices(
    ft: &'static FieldType,
    value: &str,
    address: &Address,
) -> Result<(), FieldError> {
    if let Some(choices) = ft.valid_choices {
        if !choices.contains(&value) {
            return Err(FieldError::InvalidFieldChoice {
                address: address.dupe(),
                alias: ft.alias,
                given: value.to_owned(),
                choices,
            });
        }
    }
    Ok(())
}

fn coerce_string_sequence(
    ft: &'static FieldType,
    raw: &RawFieldValue,
    items: &[RawFieldValue],
    address: &Address,
) -> Result<FieldValue, FieldError> {
    let mut out: Vec<Arc<str>> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            RawFieldValue::String(s) => {
                check_choices(ft, s, address)?;
                out.push(Arc::from(s.as_str()));
            }
            _ => return Err(invalid_type(ft, raw, address)),
        }
    }
    Ok(FieldValue::StringSequence(out.into()))
}

/// Pure, deterministic coercion of `(raw_value, address)` into the field's
/// immutable value. Never touches the filesystem.
fn compute_value(
    ft: &'static FieldType,
    raw_value: Option<&RawFieldValue>,
    address: &Address,
) -> Result<FieldValue, FieldError> {
    let raw = match raw_value {
        None => {
            if ft.required {
                return Err(FieldError::RequiredFieldMissing {
                    address: address.dupe(),
                    alias: ft.alias,
                });
            }
            return Ok(ft.default_value());
        }
        Some(raw) => raw,
    };

    match ft.schema {
        FieldSchema::Bool => match raw {
            RawFieldValue::Bool(v) => Ok(FieldValue::Bool(*v)),
            _ => Err(invalid_type(ft, raw, address)),
        },
        FieldSchema::Int => match raw {
            RawFieldValue::Int(v) => Ok(FieldValue::Int(*v)),
            _ => Err(invalid_type(ft, raw, address)),
        },
        FieldSchema::Float => match raw {
            RawFieldValue::Float(v) => Ok(FieldValue::Float(FloatLiteral(*v))),
            _ => Err(invalid_type(ft, raw, address)),
        },
        FieldSchema::String => match raw {
            RawFieldValue::String(v) => {
                check_choices(ft, v, address)?;
                Ok(FieldValue::String(Arc::from(v.as_str())))
            }
            _ => Err(invalid_type(ft, raw, address)),
        },
        FieldSchema::StringSequence
        | FieldSchema::Dependencies
        | FieldSchema::SpecialCasedDependencies => match raw {
            RawFieldValue::List(items) => coerce_string_sequence(ft, raw, items, address),
            _ => Err(invalid_type(ft, raw, address)),
        },
        FieldSchema::StringOrStringSequence => match raw {
            RawFieldValue::String(s) => {
                check_choices(ft, s, address)?;
                Ok(FieldValue::StringSequence(
                    vec![Arc::from(s.as_str())].into(),
                ))
            }
            RawFieldValue::List(items) => coerce_string_sequence(ft, raw, items, address),
            _ => Err(invalid_type(ft, raw, address)),
        },
        FieldSchema::Sources => match raw {
            RawFieldValue::List(items) => {
                let value = coerce_string_sequence(ft, raw, items, address)?;
                let globs = match &value {
                    FieldValue::StringSequence(globs) => globs,
                    _ => unreachable!("coerce_string_sequence returns a sequence"),
                };
                let traversals: Vec<String> = globs
                    .iter()
                    .filter(|g| g.starts_with("../") || g.contains("/../"))
                    .map(|g| g.as_ref().to_owned())
                    .collect();
                if !traversals.is_empty() {
                    return Err(FieldError::GlobTraversal {
                        address: address.dupe(),
                        alias: ft.alias,
                        globs: traversals,
                    });
                }
                Ok(value)
            }
            _ => Err(invalid_type(ft, raw, address)),
        },
        FieldSchema::DictStringToString => match raw {
            RawFieldValue::Dict(entries) => {
                let mut out: Vec<(Arc<str>, Arc<str>)> = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    match v {
                        RawFieldValue::String(v) => {
                            out.push((Arc::from(k.as_str()), Arc::from(v.as_str())));
                        }
                        _ => return Err(invalid_type(ft, raw, address)),
                    }
                }
                Ok(FieldValue::StringDict(out.into()))
            }
            _ => Err(invalid_type(ft, raw, address)),
        },
        FieldSchema::DictStringToStringSequence => match raw {
            RawFieldValue::Dict(entries) => {
                let mut out: Vec<(Arc<str>, Arc<[Arc<str>]>)> =
                    Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    match v {
                        RawFieldValue::List(items) => {
                            let mut seq: Vec<Arc<str>> = Vec::with_capacity(items.len());
                            for item in items {
                                match item {
                                    RawFieldValue::String(s) => seq.push(Arc::from(s.as_str())),
                                    _ => return Err(invalid_type(ft, raw, address)),
                                }
                            }
                            out.push((Arc::from(k.as_str()), seq.into()));
                        }
                        _ => return Err(invalid_type(ft, raw, address)),
                    }
                }
                Ok(FieldValue::StringSequenceDict(out.into()))
            }
            _ => Err(invalid_type(ft, raw, address)),
        },
    }
}

/// Validate a sources field's resolved file list against its declarative
/// constraints.
pub(crate) fn validate_resolved_files(
    ft: &'static FieldType,
    address: &Address,
    files: &[String],
) -> Result<(), FieldError> {
    if let Some(extensions) = ft.expected_file_extensions {
        let mut bad_files: Vec<String> = files
            .iter()
            .filter(|f| !extensions.iter().any(|ext| f.ends_with(ext)))
            .cloned()
            .collect();
        if !bad_files.is_empty() {
            bad_files.sort();
            let expected = if extensions.len() > 1 {
                format!("one of {:?}", {
                    let mut sorted = extensions.to_vec();
                    sorted.sort_unstable();
                    sorted
                })
            } else {
                format!("`{}`", extensions[0])
            };
            return Err(FieldError::UnexpectedFileExtensions {
                address: address.dupe(),
                alias: ft.alias,
                expected,
                files: bad_files,
            });
        }
    }
    if let Some(expected) = ft.expected_num_files {
        if !expected.permits(files.len()) {
            return Err(FieldError::UnexpectedFileCount {
                address: address.dupe(),
                alias: ft.alias,
                expected: expected.describe(),
                actual: files.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use gantry_core::address::Address;
    use gantry_core::address::TargetName;
    use gantry_core::package_path::PackagePath;

    use crate::field::Field;
    use crate::field::FieldDefault;
    use crate::field::FieldError;
    use crate::field::FieldSchema;
    use crate::field::FieldType;
    use crate::field::FieldValue;
    use crate::raw::RawFieldValue;

    static TIMEOUT: FieldType = FieldType {
        default: FieldDefault::Int(30),
        ..FieldType::new("Timeout", "timeout", FieldSchema::Int)
    };

    static ENTRY_POINT: FieldType = FieldType {
        required: true,
        ..FieldType::new("EntryPoint", "entry_point", FieldSchema::String)
    };

    static LOG_LEVEL: FieldType = FieldType {
        valid_choices: Some(&["debug", "info", "warn"]),
        ..FieldType::new("LogLevel", "log_level", FieldSchema::String)
    };

    static EXTRA_ARGS: FieldType = FieldType::new(
        "ExtraArgs",
        "extra_args",
        FieldSchema::StringOrStringSequence,
    );

    static ENV: FieldType = FieldType::new("Env", "env", FieldSchema::DictStringToString);

    static SOURCES: FieldType = FieldType::new("Sources", "sources", FieldSchema::Sources);

    static FORTRAN_SOURCES: FieldType = FieldType {
        parent: Some(&SOURCES),
        ..FieldType::new("FortranSources", "sources", FieldSchema::Sources)
    };

    fn addr(name: &str) -> Address {
        Address::new(
            PackagePath::new("a/b").unwrap(),
            TargetName::new(name).unwrap(),
        )
    }

    #[test]
    fn test_default_applies_when_raw_is_absent() {
        let field = Field::new(&TIMEOUT, None, &addr("t")).unwrap();
        assert_eq!(field.value().as_int(), Some(30));
    }

    #[test]
    fn test_required_field_missing() {
        let err = Field::new(&ENTRY_POINT, None, &addr("t")).unwrap_err();
        match err.downcast_ref::<FieldError>() {
            Some(FieldError::RequiredFieldMissing { alias, .. }) => {
                assert_eq!(*alias, "entry_point");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch() {
        let err = Field::new(&TIMEOUT, Some(&RawFieldValue::string("soon")), &addr("t"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FieldError>(),
            Some(FieldError::InvalidFieldType { .. })
        ));
    }

    #[test]
    fn test_choices() {
        let ok = Field::new(&LOG_LEVEL, Some(&RawFieldValue::string("info")), &addr("t"));
        assert!(ok.is_ok());
        let err = Field::new(&LOG_LEVEL, Some(&RawFieldValue::string("loud")), &addr("t"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FieldError>(),
            Some(FieldError::InvalidFieldChoice { .. })
        ));
    }

    #[test]
    fn test_string_or_sequence_coercion() {
        let single = Field::new(&EXTRA_ARGS, Some(&RawFieldValue::string("-v")), &addr("t"))
            .unwrap();
        let listed =
            Field::new(&EXTRA_ARGS, Some(&RawFieldValue::strings(["-v"])), &addr("t")).unwrap();
        assert_eq!(single.value(), listed.value());
    }

    #[test]
    fn test_dict_coercion_and_mismatch() {
        let field = Field::new(
            &ENV,
            Some(&RawFieldValue::string_dict([("K", "v")])),
            &addr("t"),
        )
        .unwrap();
        assert_eq!(field.value().as_string_dict().unwrap().len(), 1);

        let bad = RawFieldValue::Dict(vec![("K".to_owned(), RawFieldValue::Int(1))]);
        assert!(Field::new(&ENV, Some(&bad), &addr("t")).is_err());
    }

    #[test]
    fn test_primitive_equality_excludes_address() {
        let raw = RawFieldValue::Int(5);
        let f1 = Field::new(&TIMEOUT, Some(&raw), &addr("t1")).unwrap();
        let f2 = Field::new(&TIMEOUT, Some(&raw), &addr("t2")).unwrap();
        assert_eq!(f1, f2);
    }

    #[test]
    fn test_async_equality_includes_address() {
        let raw = RawFieldValue::strings(["*.txt"]);
        let f1 = Field::new(&SOURCES, Some(&raw), &addr("t1")).unwrap();
        let f2 = Field::new(&SOURCES, Some(&raw), &addr("t2")).unwrap();
        assert_ne!(f1, f2);
        assert_eq!(f1, Field::new(&SOURCES, Some(&raw), &addr("t1")).unwrap());
    }

    #[test]
    fn test_field_type_identity_distinguishes_subtypes() {
        let raw = RawFieldValue::strings(["*.f95"]);
        let plain = Field::new(&SOURCES, Some(&raw), &addr("t")).unwrap();
        let fortran = Field::new(&FORTRAN_SOURCES, Some(&raw), &addr("t")).unwrap();
        assert_ne!(plain, fortran);
        assert!(FORTRAN_SOURCES.is_subtype_of(&SOURCES));
        assert!(!SOURCES.is_subtype_of(&FORTRAN_SOURCES));
    }

    #[test]
    fn test_sources_rejects_traversal_globs() {
        let raw = RawFieldValue::strings(["../*.txt"]);
        let err = Field::new(&SOURCES, Some(&raw), &addr("t")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FieldError>(),
            Some(FieldError::GlobTraversal { .. })
        ));
    }

    #[test]
    fn test_value_json_rendering() {
        let field = Field::new(
            &EXTRA_ARGS,
            Some(&RawFieldValue::strings(["-v", "-q"])),
            &addr("t"),
        )
        .unwrap();
        assert_eq!(
            field.value().to_json(),
            serde_json::json!(["-v", "-q"])
        );
        assert_eq!(FieldValue::None.to_json(), serde_json::Value::Null);
    }
}
