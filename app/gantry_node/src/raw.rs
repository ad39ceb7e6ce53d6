/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Raw field values as supplied by BUILD-file parsing. The graph does not
//! parse BUILD syntax itself; it consumes `(alias -> RawFieldValue)` maps.

use std::fmt;
use std::fmt::Display;

/// An untyped value from a parsed BUILD declaration, before field coercion.
#[derive(Clone, Debug, PartialEq)]
pub enum RawFieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<RawFieldValue>),
    Dict(Vec<(String, RawFieldValue)>),
}

impl RawFieldValue {
    pub fn string(value: &str) -> RawFieldValue {
        RawFieldValue::String(value.to_owned())
    }

    pub fn strings<'a>(values: impl IntoIterator<Item = &'a str>) -> RawFieldValue {
        RawFieldValue::List(values.into_iter().map(RawFieldValue::string).collect())
    }

    pub fn string_dict<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> RawFieldValue {
        RawFieldValue::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_owned(), RawFieldValue::string(v)))
                .collect(),
        )
    }

    /// Human description of this value's type, for schema error messages.
    pub fn type_description(&self) -> &'static str {
        match self {
            RawFieldValue::Bool(_) => "a boolean",
            RawFieldValue::Int(_) => "an integer",
            RawFieldValue::Float(_) => "a floating point number",
            RawFieldValue::String(_) => "a string",
            RawFieldValue::List(_) => "a list",
            RawFieldValue::Dict(_) => "a dict",
        }
    }
}

impl Display for RawFieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawFieldValue::Bool(v) => write!(f, "{}", v),
            RawFieldValue::Int(v) => write!(f, "{}", v),
            RawFieldValue::Float(v) => write!(f, "{}", v),
            RawFieldValue::String(v) => write!(f, "\"{}\"", v),
            RawFieldValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            RawFieldValue::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{}\": {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}
