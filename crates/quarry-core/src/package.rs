use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use quarry_util::errors::ParseError;

use crate::version::Version;

/// A canonical package name.
///
/// Lowercased, with every run of `-`, `_` and `.` collapsed to a single `-`,
/// so `Foo.Bar`, `foo_bar` and `FOO--bar` all name the same package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageName(String);

impl PackageName {
    /// Normalize `name`, rejecting text that is not a valid package name.
    pub fn new(name: &str) -> Result<Self, ParseError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ParseError::whole("empty package name", name));
        }
        if let Some((idx, ch)) = trimmed
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            let offset = name.len() - name.trim_start().len() + idx;
            return Err(ParseError::new(
                "invalid character in package name",
                name,
                offset,
                offset + ch.len_utf8(),
            ));
        }
        let first = trimmed.chars().next();
        let last = trimmed.chars().last();
        if !first.is_some_and(|c| c.is_ascii_alphanumeric())
            || !last.is_some_and(|c| c.is_ascii_alphanumeric())
        {
            return Err(ParseError::whole(
                "package names must start and end with a letter or digit",
                name,
            ));
        }
        Ok(Self(normalize(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lowercase and collapse separator runs to `-`. Also used for extras.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for ch in name.chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else {
            out.push(ch.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// One concrete candidate: a package name paired with a version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: PackageName,
    pub version: Version,
}

impl PackageDescriptor {
    pub fn new(name: PackageName, version: Version) -> Self {
        Self { name, version }
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Version::Url(url) => write!(f, "{} @ {url}", self.name),
            Version::Named(raw) => write!(f, "{}==={raw}", self.name),
            Version::Standard(v) => write!(f, "{}=={v}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_collapse() {
        assert_eq!(PackageName::new("Foo._-Bar").unwrap().as_str(), "foo-bar");
        assert_eq!(
            PackageName::new("zope.interface").unwrap(),
            PackageName::new("Zope_Interface").unwrap()
        );
    }

    #[test]
    fn rejects_bad_names() {
        assert!(PackageName::new("").is_err());
        assert!(PackageName::new("-foo").is_err());
        let err = PackageName::new("foo bar").unwrap_err();
        assert_eq!(err.offending, " ");
    }
}
