//! Version values and their ordering.
//!
//! A [`Version`] is one of three families:
//! - [`Version::Standard`]: a PEP 440 style version with epoch, release,
//!   pre/post/dev parts and a local label, totally ordered.
//! - [`Version::Named`]: free text that did not parse; compared by equality only.
//! - [`Version::Url`]: a pinned artifact location; compared by equality only.
//!
//! Ranges only ever contain standard versions. For sorting and set storage
//! the families are ordered `Standard < Named < Url`, named and url
//! versions by their text.

use std::cmp::{max, Ordering};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter;
use std::str::FromStr;

use once_cell::sync::Lazy;
use quarry_util::errors::ParseError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static STANDARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xi)
        ^\s*
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:
            [-_\.]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|rc|c)
            [-_\.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?:
            (?:-(?P<post_implicit>[0-9]+))
            |
            (?:
                [-_\.]?
                (?P<post_l>post|rev|r)
                [-_\.]?
                (?P<post_n>[0-9]+)?
            )
        )?
        (?:
            [-_\.]?
            (?P<dev_l>dev)
            [-_\.]?
            (?P<dev_n>[0-9]+)?
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?
        \s*$",
    )
    .expect("standard version regex is valid")
});

/// Pre-release kind, normalized from its many spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "rc" | "c" | "pre" | "preview" => Some(Self::Rc),
            _ => None,
        }
    }
}

impl fmt::Display for PreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        })
    }
}

/// One dot-separated piece of a local label.
///
/// Variant order matters: textual segments sort below numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    Text(String),
    Number(u64),
}

impl LocalSegment {
    fn parse(segment: &str) -> Self {
        match segment.parse::<u64>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(segment.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A fully parsed standard version such as `1!2.0.1rc2.post1.dev3+ubuntu.1`.
#[derive(Debug, Clone, Default)]
pub struct StandardVersion {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreRelease, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Option<Vec<LocalSegment>>,
}

impl StandardVersion {
    /// A final release with the given release segments.
    pub fn from_release(release: Vec<u64>) -> Self {
        Self {
            release,
            ..Self::default()
        }
    }

    /// Whether this is a pre-release or a development release.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// The smallest version sharing this epoch and `release` prefix:
    /// `<release>.dev0`.
    pub(crate) fn series_floor(epoch: u64, release: Vec<u64>) -> Self {
        Self {
            epoch,
            release,
            dev: Some(0),
            ..Self::default()
        }
    }

    /// Release segments with trailing zeros removed, for hashing.
    fn trimmed_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |i| i + 1);
        &self.release[..end]
    }

    /// Sort key for everything after the release segment.
    ///
    /// Ranks: dev-only 0, alpha 1, beta 2, rc 3, final 4, post 5. A missing dev
    /// part sorts after any dev number at the same level.
    fn suffix_key(&self) -> (u8, u64, Option<u64>, u64) {
        let dev = self.dev.unwrap_or(u64::MAX);
        match (&self.pre, self.post, self.dev) {
            (None, None, Some(n)) => (0, 0, None, n),
            (Some((kind, n)), post, _) => {
                let rank = match kind {
                    PreRelease::Alpha => 1,
                    PreRelease::Beta => 2,
                    PreRelease::Rc => 3,
                };
                (rank, *n, post, dev)
            }
            (None, None, None) => (4, 0, None, 0),
            (None, Some(post), _) => (5, 0, Some(post), dev),
        }
    }
}

/// Compare release tuples, padding the shorter with zeros.
fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    let len = max(this.len(), other.len());
    this.iter()
        .chain(iter::repeat(&0))
        .zip(other.iter().chain(iter::repeat(&0)))
        .take(len)
        .map(|(a, b)| a.cmp(b))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

impl Ord for StandardVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| self.suffix_key().cmp(&other.suffix_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for StandardVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for StandardVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StandardVersion {}

impl Hash for StandardVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.trimmed_release().hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for StandardVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        f.write_str(&release.join("."))?;
        if let Some((kind, n)) = &self.pre {
            write!(f, "{kind}{n}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if let Some(local) = &self.local {
            let local: Vec<String> = local.iter().map(LocalSegment::to_string).collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

impl FromStr for StandardVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_standard(s)
    }
}

/// A package version of any family.
#[derive(Debug, Clone)]
pub enum Version {
    Standard(StandardVersion),
    Named(String),
    Url(String),
}

impl Version {
    /// Shorthand for a final release, e.g. `Version::release([1, 5])`.
    pub fn release(segments: impl Into<Vec<u64>>) -> Self {
        Self::Standard(StandardVersion::from_release(segments.into()))
    }

    pub fn as_standard(&self) -> Option<&StandardVersion> {
        match self {
            Self::Standard(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_standard(&self) -> bool {
        matches!(self, Self::Standard(_))
    }

    /// Pre-release or development release. Named and url versions never are.
    pub fn is_prerelease(&self) -> bool {
        self.as_standard().is_some_and(StandardVersion::is_prerelease)
    }

    fn family_rank(&self) -> u8 {
        match self {
            Self::Standard(_) => 0,
            Self::Named(_) => 1,
            Self::Url(_) => 2,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Standard(a), Self::Standard(b)) => a.cmp(b),
            (Self::Named(a), Self::Named(b)) => a.cmp(b),
            (Self::Url(a), Self::Url(b)) => a.cmp(b),
            _ => self.family_rank().cmp(&other.family_rank()),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family_rank().hash(state);
        match self {
            Self::Standard(v) => v.hash(state),
            Self::Named(s) | Self::Url(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(v) => v.fmt(f),
            Self::Named(s) | Self::Url(s) => f.write_str(s),
        }
    }
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_version(s))
    }
}

impl From<StandardVersion> for Version {
    fn from(v: StandardVersion) -> Self {
        Self::Standard(v)
    }
}

/// Serialized as the display form. Named and url texts that would read back
/// as another family are written as `===text` and `@ text`.
impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Standard(_) => serializer.collect_str(self),
            Self::Named(s) => match from_serialized(s) {
                Self::Named(back) if back == *s => serializer.serialize_str(s),
                _ => serializer.serialize_str(&format!("==={s}")),
            },
            Self::Url(s) => match from_serialized(s) {
                Self::Url(back) if back == *s => serializer.serialize_str(s),
                _ => serializer.serialize_str(&format!("@ {s}")),
            },
        }
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(from_serialized(&s))
    }
}

fn from_serialized(text: &str) -> Version {
    if let Some(named) = text.strip_prefix("===") {
        return Version::Named(named.to_string());
    }
    if let Some(url) = text.strip_prefix("@ ") {
        return Version::Url(url.to_string());
    }
    parse_version(text)
}

/// Parse any version text.
///
/// Tries the standard grammar first, then falls back to a url version when
/// the text carries a `scheme://`, and finally to a named version holding
/// the text verbatim. Never fails.
pub fn parse_version(text: &str) -> Version {
    if let Ok(v) = parse_standard(text) {
        return Version::Standard(v);
    }
    if looks_like_url(text) {
        return Version::Url(text.trim().to_string());
    }
    Version::Named(text.to_string())
}

/// Parse text that must be a standard version.
pub fn parse_standard(text: &str) -> Result<StandardVersion, ParseError> {
    let caps = STANDARD_RE
        .captures(text)
        .ok_or_else(|| ParseError::whole("not a valid version", text))?;

    let number = |name: &str| -> Result<Option<u64>, ParseError> {
        match caps.name(name) {
            None => Ok(None),
            Some(m) => m.as_str().parse::<u64>().map(Some).map_err(|_| {
                ParseError::new("version number is too large", text, m.start(), m.end())
            }),
        }
    };

    let epoch = number("epoch")?.unwrap_or(0);

    let release_match = caps
        .name("release")
        .ok_or_else(|| ParseError::whole("missing release segment", text))?;
    let release = release_match
        .as_str()
        .split('.')
        .map(|seg| {
            seg.parse::<u64>().map_err(|_| {
                ParseError::new(
                    "release segment is too large",
                    text,
                    release_match.start(),
                    release_match.end(),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pre = match caps.name("pre_l") {
        Some(label) => {
            let kind = PreRelease::from_label(label.as_str()).ok_or_else(|| {
                ParseError::new("unknown pre-release label", text, label.start(), label.end())
            })?;
            Some((kind, number("pre_n")?.unwrap_or(0)))
        }
        None => None,
    };

    let post = match number("post_implicit")? {
        Some(n) => Some(n),
        None if caps.name("post_l").is_some() => Some(number("post_n")?.unwrap_or(0)),
        None => None,
    };

    let dev = if caps.name("dev_l").is_some() {
        Some(number("dev_n")?.unwrap_or(0))
    } else {
        None
    };

    let local = caps.name("local").map(|m| {
        m.as_str()
            .split(['.', '-', '_'])
            .map(LocalSegment::parse)
            .collect()
    });

    Ok(StandardVersion {
        epoch,
        release,
        pre,
        post,
        dev,
        local,
    })
}

/// Whether `text` contains a `scheme://` prefix.
pub fn looks_like_url(text: &str) -> bool {
    let text = text.trim();
    match text.find("://") {
        Some(idx) if idx > 0 => {
            let scheme = &text[..idx];
            scheme
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn std(s: &str) -> StandardVersion {
        parse_standard(s).unwrap()
    }

    #[test]
    fn suffix_precedence() {
        let ordered = [
            "1.0.dev0",
            "1.0a1.dev1",
            "1.0a1",
            "1.0b2",
            "1.0rc1",
            "1.0",
            "1.0+local",
            "1.0.post1.dev0",
            "1.0.post1",
            "1.1.dev0",
        ];
        for pair in ordered.windows(2) {
            assert!(std(pair[0]) < std(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn trailing_zeros_equal_and_hash_equal() {
        use std::collections::hash_map::DefaultHasher;
        let a = std("1.0");
        let b = std("1.0.0");
        assert_eq!(a, b);
        let hash = |v: &StandardVersion| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn epoch_dominates() {
        assert!(std("1!0.1") > std("2024.1"));
    }

    #[test]
    fn local_numeric_beats_text() {
        assert!(std("1.0+abc") < std("1.0+1"));
        assert!(std("1.0+1") < std("1.0+1.0"));
    }

    #[test]
    fn cross_family_order_is_fixed() {
        let standard = parse_version("1.0");
        let named = parse_version("nightly");
        let url = parse_version("https://example.com/a.whl");
        assert!(standard < named);
        assert!(named < url);
    }

    #[test]
    fn display_normalizes() {
        assert_eq!(std("v1.0-alpha-2").to_string(), "1.0a2");
        assert_eq!(std("2.0-3").to_string(), "2.0.post3");
        assert_eq!(std("1.0.0.dev").to_string(), "1.0.0.dev0");
        assert_eq!(std("1!1.0rev1+Ubuntu-1").to_string(), "1!1.0.post1+ubuntu.1");
    }
}
