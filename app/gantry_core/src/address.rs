/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Addresses: the unique coordinates of targets and of their file-level or
//! generated sub-targets.

use std::cmp::Ordering;
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;

use crate::package_path::split_file_path;
use crate::package_path::PackagePath;

#[derive(Debug, thiserror::Error)]
enum TargetNameError {
    #[error("Target name must not be empty")]
    Empty,
    #[error("Target name `{0}` contains a banned character (one of `/:!#@` or whitespace)")]
    BannedCharacter(String),
}

/// The name a target was declared with. Defaults to the basename of the
/// declaring directory when omitted.
#[derive(
    Debug, Clone, Dupe, derive_more::Display, Eq, PartialEq, Hash, PartialOrd, Ord, Allocative
)]
#[display(fmt = "{}", _0)]
pub struct TargetName(Arc<str>);

impl TargetName {
    pub fn new(name: &str) -> anyhow::Result<TargetName> {
        if name.is_empty() {
            return Err(TargetNameError::Empty.into());
        }
        if name
            .chars()
            .any(|c| matches!(c, '/' | ':' | '!' | '#' | '@') || c.is_whitespace())
        {
            return Err(TargetNameError::BannedCharacter(name.to_owned()).into());
        }
        Ok(TargetName(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Discriminates the sub-target flavors of an address. A suffixed address is
/// not a base target and cannot derive further sub-targets.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Allocative)]
pub enum AddressSuffix {
    /// A file-level sub-target; the path is relative to `spec_path`.
    File(Box<str>),
    /// A named synthetic target produced by a generator.
    Generated(Box<str>),
}

#[derive(Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Allocative)]
struct AddressData {
    spec_path: PackagePath,
    name: TargetName,
    suffix: Option<AddressSuffix>,
}

#[derive(Debug, thiserror::Error)]
enum AddressError {
    #[error("Address `{0}` is not a base target address and cannot derive sub-targets")]
    NotBaseTarget(String),
    #[error("File `{file}` is not below the directory `{dir}` of address `{address}`")]
    FileOutsideSpecPath {
        address: String,
        dir: String,
        file: String,
    },
}

/// The unique coordinate of a target, a file-level sub-target, or a generated
/// sub-target within the workspace.
///
/// Addresses are cheap to clone, hash and compare structurally, and are
/// totally ordered by `(spec_path, name, suffix)` so that iteration over
/// sorted address collections is deterministic.
#[derive(Debug, Clone, Dupe, Eq, PartialEq, Hash, Allocative)]
pub struct Address(Arc<AddressData>);

impl Address {
    pub fn new(spec_path: PackagePath, name: TargetName) -> Address {
        Address(Arc::new(AddressData {
            spec_path,
            name,
            suffix: None,
        }))
    }

    pub fn spec_path(&self) -> &PackagePath {
        &self.0.spec_path
    }

    pub fn name(&self) -> &TargetName {
        &self.0.name
    }

    pub fn suffix(&self) -> Option<&AddressSuffix> {
        self.0.suffix.as_ref()
    }

    pub fn is_base_target(&self) -> bool {
        self.0.suffix.is_none()
    }

    pub fn is_file_target(&self) -> bool {
        matches!(self.0.suffix, Some(AddressSuffix::File(_)))
    }

    pub fn is_generated_target(&self) -> bool {
        matches!(self.0.suffix, Some(AddressSuffix::Generated(_)))
    }

    /// The `spec_path`-relative file of a file-level address.
    pub fn relative_file_path(&self) -> Option<&str> {
        match &self.0.suffix {
            Some(AddressSuffix::File(f)) => Some(f),
            _ => None,
        }
    }

    pub fn generated_name(&self) -> Option<&str> {
        match &self.0.suffix {
            Some(AddressSuffix::Generated(g)) => Some(g),
            _ => None,
        }
    }

    /// The build-root-relative file of a file-level address.
    pub fn filename(&self) -> Option<String> {
        self.relative_file_path()
            .map(|f| self.0.spec_path.join(f))
    }

    /// The address of the declared target this address belongs to. Identity
    /// for base addresses.
    pub fn base_address(&self) -> Address {
        if self.is_base_target() {
            self.dupe()
        } else {
            Address::new(self.0.spec_path.dupe(), self.0.name.dupe())
        }
    }

    /// Derive the address of the file-level sub-target owning
    /// `full_file_name` (a build-root-relative path). Only base addresses may
    /// derive sub-targets, and the file must live below `spec_path`.
    pub fn subtarget_address(&self, full_file_name: &str) -> anyhow::Result<Address> {
        if !self.is_base_target() {
            return Err(AddressError::NotBaseTarget(self.to_string()).into());
        }
        let relative = self.0.spec_path.relativize(full_file_name).ok_or_else(|| {
            AddressError::FileOutsideSpecPath {
                address: self.to_string(),
                dir: self.0.spec_path.as_str().to_owned(),
                file: full_file_name.to_owned(),
            }
        })?;
        Ok(Address(Arc::new(AddressData {
            spec_path: self.0.spec_path.dupe(),
            name: self.0.name.dupe(),
            suffix: Some(AddressSuffix::File(relative.into())),
        })))
    }

    /// Derive the address of a generator-produced sub-target.
    pub fn generated_address(&self, generated_name: &str) -> anyhow::Result<Address> {
        if !self.is_base_target() {
            return Err(AddressError::NotBaseTarget(self.to_string()).into());
        }
        Ok(Address(Arc::new(AddressData {
            spec_path: self.0.spec_path.dupe(),
            name: self.0.name.dupe(),
            suffix: Some(AddressSuffix::Generated(generated_name.into())),
        })))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Address) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Address) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.suffix {
            Some(AddressSuffix::File(file)) => {
                if self.0.spec_path.is_root() {
                    write!(f, "//{}:{}", file, self.0.name)
                } else {
                    write!(f, "{}/{}:{}", self.0.spec_path, file, self.0.name)
                }
            }
            Some(AddressSuffix::Generated(gen)) => {
                if self.0.spec_path.is_root() {
                    write!(f, "//:{}#{}", self.0.name, gen)
                } else {
                    write!(f, "{}:{}#{}", self.0.spec_path, self.0.name, gen)
                }
            }
            None => {
                if self.0.spec_path.is_root() {
                    write!(f, "//:{}", self.0.name)
                } else {
                    write!(f, "{}:{}", self.0.spec_path, self.0.name)
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum AddressParseError {
    #[error("Address spec must not be empty (in {origin})")]
    Empty { origin: String },
    #[error("Address spec `{spec}` has an empty `{component}` component (in {origin})")]
    EmptyComponent {
        spec: String,
        component: &'static str,
        origin: String,
    },
    #[error(
        "Address spec `{spec}` refers to the build root and omits a target name (in {origin})"
    )]
    NoDefaultName { spec: String, origin: String },
}

/// The parsed form of an address-like string, e.g. from a `dependencies`
/// field, before defaulting rules are applied.
///
/// Supported forms: `path:name`, `path` (name defaults to the directory
/// basename), `:sibling` and `./file.ext:name` (relative to the declaring
/// directory), `path/file.ext[:name]` (file-level), and a trailing
/// `#generated` component.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AddressInput {
    spec_path: PackagePath,
    name: Option<TargetName>,
    relative_file: Option<Box<str>>,
    generated: Option<Box<str>>,
}

impl AddressInput {
    pub fn parse(
        spec: &str,
        relative_to: &PackagePath,
        description_of_origin: &str,
    ) -> anyhow::Result<AddressInput> {
        let empty_component = |component| AddressParseError::EmptyComponent {
            spec: spec.to_owned(),
            component,
            origin: description_of_origin.to_owned(),
        };
        if spec.is_empty() {
            return Err(AddressParseError::Empty {
                origin: description_of_origin.to_owned(),
            }
            .into());
        }

        let (rest, generated) = match spec.rsplit_once('#') {
            Some((rest, gen)) => {
                if gen.is_empty() {
                    return Err(empty_component("generated name").into());
                }
                (rest, Some(Box::<str>::from(gen)))
            }
            None => (spec, None),
        };

        let (path_part, name) = match rest.rsplit_once(':') {
            Some((path, name)) => {
                if name.is_empty() {
                    return Err(empty_component("target name").into());
                }
                (path, Some(TargetName::new(name)?))
            }
            None => (rest, None),
        };

        // Resolve the path component. `:name` and `./…` forms are relative
        // to the declaring directory; everything else is build-root-relative
        // (a leading `//` is accepted and stripped).
        let path = if path_part.is_empty() {
            relative_to.as_str().to_owned()
        } else if let Some(stripped) = path_part.strip_prefix("./") {
            relative_to.join(stripped)
        } else {
            path_part.strip_prefix("//").unwrap_or(path_part).to_owned()
        };

        // A final segment with an extension dot names a file-level
        // sub-target; anything else names a directory.
        let (dir, file) = {
            let (dir, base) = split_file_path(&path);
            if base.contains('.') {
                (dir.to_owned(), Some(Box::<str>::from(base)))
            } else {
                (path.clone(), None)
            }
        };
        let spec_path = PackagePath::new(&dir)?;

        let name = match name {
            Some(name) => Some(name),
            None => {
                if spec_path.is_root() {
                    return Err(AddressParseError::NoDefaultName {
                        spec: spec.to_owned(),
                        origin: description_of_origin.to_owned(),
                    }
                    .into());
                }
                None
            }
        };

        Ok(AddressInput {
            spec_path,
            name,
            relative_file: file,
            generated,
        })
    }

    /// Apply defaulting rules and produce the structural address.
    pub fn into_address(self) -> anyhow::Result<Address> {
        let name = match self.name {
            Some(name) => name,
            None => TargetName::new(self.spec_path.basename())?,
        };
        let base = Address::new(self.spec_path, name);
        match (self.relative_file, self.generated) {
            (Some(file), None) => {
                let full = base.spec_path().join(&file);
                base.subtarget_address(&full)
            }
            (None, Some(gen)) => base.generated_address(&gen),
            (Some(_), Some(gen)) => {
                // A file path with a generated component is contradictory;
                // prefer the generated reading since `#` binds last.
                base.generated_address(&gen)
            }
            (None, None) => Ok(base),
        }
    }
}

/// Parse and resolve an address-like string in one step.
pub fn parse_address(
    spec: &str,
    relative_to: &PackagePath,
    description_of_origin: &str,
) -> anyhow::Result<Address> {
    AddressInput::parse(spec, relative_to, description_of_origin)?.into_address()
}

#[cfg(test)]
mod tests {
    use dupe::Dupe;

    use crate::address::parse_address;
    use crate::address::Address;
    use crate::address::TargetName;
    use crate::package_path::PackagePath;

    fn addr(path: &str, name: &str) -> Address {
        Address::new(
            PackagePath::new(path).unwrap(),
            TargetName::new(name).unwrap(),
        )
    }

    fn parse(spec: &str, relative_to: &str) -> Address {
        parse_address(
            spec,
            &PackagePath::new(relative_to).unwrap(),
            "the test",
        )
        .unwrap()
    }

    #[test]
    fn test_target_name_validation() {
        assert!(TargetName::new("ok-name_1.2").is_ok());
        assert!(TargetName::new("").is_err());
        assert!(TargetName::new("a:b").is_err());
        assert!(TargetName::new("a/b").is_err());
        assert!(TargetName::new("a b").is_err());
        assert!(TargetName::new("!a").is_err());
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse("a/b:lib", "x"), addr("a/b", "lib"));
        assert_eq!(parse("a/b", "x"), addr("a/b", "b"));
        assert_eq!(parse(":sibling", "a/b"), addr("a/b", "sibling"));
        assert_eq!(parse("//a/b:lib", "x"), addr("a/b", "lib"));

        let file = parse("a/b/f.txt:lib", "x");
        assert_eq!(file.base_address(), addr("a/b", "lib"));
        assert_eq!(file.relative_file_path(), Some("f.txt"));

        let dotted = parse("./f.txt:lib", "a/b");
        assert_eq!(dotted, file);

        let bare_file = parse("a/b/f.txt", "x");
        assert_eq!(bare_file.base_address(), addr("a/b", "b"));

        let generated = parse("a/b:lib#gen", "x");
        assert_eq!(generated.generated_name(), Some("gen"));
        assert_eq!(generated.base_address(), addr("a/b", "lib"));
    }

    #[test]
    fn test_parse_errors() {
        let root = PackagePath::root();
        assert!(parse_address("", &root, "the test").is_err());
        assert!(parse_address("a/b:", &root, "the test").is_err());
        assert!(parse_address("a/b:t#", &root, "the test").is_err());
        // A build-root path has no basename to default the name from.
        assert!(parse_address("f.txt", &root, "the test").is_err());
    }

    #[test]
    fn test_subtarget_address() {
        let base = addr("a/b", "lib");
        let sub = base.subtarget_address("a/b/sub/f.txt").unwrap();
        assert_eq!(sub.relative_file_path(), Some("sub/f.txt"));
        assert_eq!(sub.filename(), Some("a/b/sub/f.txt".to_owned()));
        assert!(!sub.is_base_target());
        assert!(sub.is_file_target());
        assert_eq!(sub.base_address(), base);

        // Sub-targets cannot derive further sub-targets.
        assert!(sub.subtarget_address("a/b/other.txt").is_err());
        // The file must be below the declaring directory.
        assert!(base.subtarget_address("elsewhere/f.txt").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(addr("a/b", "lib").to_string(), "a/b:lib");
        assert_eq!(addr("", "lib").to_string(), "//:lib");
        assert_eq!(
            addr("a/b", "lib")
                .subtarget_address("a/b/f.txt")
                .unwrap()
                .to_string(),
            "a/b/f.txt:lib"
        );
        assert_eq!(
            addr("", "lib")
                .subtarget_address("f.txt")
                .unwrap()
                .to_string(),
            "//f.txt:lib"
        );
        assert_eq!(
            addr("a/b", "lib").generated_address("gen").unwrap().to_string(),
            "a/b:lib#gen"
        );
    }

    #[test]
    fn test_ordering() {
        let base = addr("a", "t");
        let file = base.subtarget_address("a/f.txt").unwrap();
        let generated = base.generated_address("g").unwrap();
        let mut addresses = vec![generated.dupe(), file.dupe(), base.dupe(), addr("a", "s")];
        addresses.sort();
        assert_eq!(addresses, vec![addr("a", "s"), base, file, generated]);
    }
}
