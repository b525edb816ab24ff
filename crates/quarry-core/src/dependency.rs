use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use quarry_util::errors::ParseError;

use crate::environment::Environment;
use crate::marker::{parse_marker, MarkerTree};
use crate::package::PackageName;
use crate::specifier::{parse_specifier, VersionSpecifier};
use crate::version::Version;

/// A requirement on another package.
///
/// Written as `name[extra,...] specifier ; marker`, e.g.
/// `requests[socks] >=2.8, <3 ; python_version >= "3.8"`, or with a direct
/// artifact reference: `pkg @ https://host/pkg-1.0.whl`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: PackageName,
    pub specifier: VersionSpecifier,
    /// Normalized extra names requested on `name`.
    pub extras: BTreeSet<String>,
    pub marker: Option<MarkerTree>,
}

impl Dependency {
    /// An unconditional requirement with no extras.
    pub fn new(name: PackageName, specifier: VersionSpecifier) -> Self {
        Self {
            name,
            specifier,
            extras: BTreeSet::new(),
            marker: None,
        }
    }

    pub fn with_extras<I, S>(mut self, extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extras
            .extend(extras.into_iter().map(|e| crate::package::normalize(e.as_ref())));
        self
    }

    pub fn with_marker(mut self, marker: MarkerTree) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Whether this requirement applies to `env`, with `extra` being the
    /// extra of the requiring package that is currently active.
    pub fn applies_to(&self, env: &Environment, extra: Option<&str>) -> bool {
        self.marker
            .as_ref()
            .map_or(true, |marker| marker.evaluate(env, extra))
    }

    /// The pinned artifact location, for `name @ url` requirements.
    pub fn url(&self) -> Option<String> {
        match self.specifier.as_exact() {
            Some(Version::Url(url)) => Some(url),
            _ => None,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if let Some(url) = self.url() {
            write!(f, " @ {url}")?;
        } else if !self.specifier.is_allow_all() {
            write!(f, "{}", self.specifier)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Dependency {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dependency(s)
    }
}

impl Serialize for Dependency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dependency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_dependency(&raw).map_err(serde::de::Error::custom)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn skip_whitespace(text: &str, mut pos: usize) -> usize {
    while let Some(c) = text[pos..].chars().next() {
        if !c.is_whitespace() {
            break;
        }
        pos += c.len_utf8();
    }
    pos
}

/// Parse one requirement line.
pub fn parse_dependency(text: &str) -> Result<Dependency, ParseError> {
    let start = skip_whitespace(text, 0);
    let name_end = text[start..]
        .find(|c: char| !is_name_char(c))
        .map_or(text.len(), |i| start + i);
    if name_end == start {
        return Err(ParseError::new(
            "expected a package name",
            text,
            start,
            start + 1,
        ));
    }
    let name = PackageName::new(&text[start..name_end]).map_err(|e| e.within(text, start))?;

    let mut pos = skip_whitespace(text, name_end);
    let mut extras = BTreeSet::new();
    if text[pos..].starts_with('[') {
        let close = text[pos..].find(']').map(|i| pos + i).ok_or_else(|| {
            ParseError::new("unclosed extras list", text, pos, pos + 1)
        })?;
        let mut item_start = pos + 1;
        for item in text[pos + 1..close].split(',') {
            let trimmed = item.trim();
            if !trimmed.is_empty() {
                let offset = item_start + (item.len() - item.trim_start().len());
                let extra = PackageName::new(trimmed).map_err(|e| e.within(text, offset))?;
                extras.insert(extra.as_str().to_string());
            } else if text[pos + 1..close].contains(',') {
                return Err(ParseError::new(
                    "empty extra name",
                    text,
                    item_start,
                    item_start + item.len().max(1),
                ));
            }
            item_start += item.len() + 1;
        }
        pos = skip_whitespace(text, close + 1);
    }

    let (specifier, marker_start) = if text[pos..].starts_with('@') {
        let url_start = skip_whitespace(text, pos + 1);
        let url_end = text[url_start..]
            .find(char::is_whitespace)
            .map_or(text.len(), |i| url_start + i);
        if url_start == url_end {
            return Err(ParseError::new("missing url after `@`", text, pos, pos + 1));
        }
        let url = &text[url_start..url_end];
        let after = skip_whitespace(text, url_end);
        match text[after..].chars().next() {
            None => (
                VersionSpecifier::version_match(Version::Url(url.to_string())),
                None,
            ),
            Some(';') => (
                VersionSpecifier::version_match(Version::Url(url.to_string())),
                Some(after + 1),
            ),
            Some(_) => {
                return Err(ParseError::new(
                    "expected `;` after url",
                    text,
                    after,
                    text.len(),
                ))
            }
        }
    } else {
        let spec_end = text[pos..].find(';').map_or(text.len(), |i| pos + i);
        let specifier =
            parse_specifier(&text[pos..spec_end]).map_err(|e| e.within(text, pos))?;
        let marker_start = (spec_end < text.len()).then_some(spec_end + 1);
        (specifier, marker_start)
    };

    let marker = match marker_start {
        Some(offset) => {
            let marker = parse_marker(&text[offset..]).map_err(|e| e.within(text, offset))?;
            Some(marker)
        }
        None => None,
    };

    Ok(Dependency {
        name,
        specifier,
        extras,
        marker,
    })
}
