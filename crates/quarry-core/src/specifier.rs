//! Version specifiers: predicates over [`Version`] closed under
//! intersection, union and inversion.
//!
//! Every specifier is stored in a normalized form: an ascending list of
//! disjoint, non-touching intervals over standard versions, plus a set of
//! named/url versions that is either finite (`Only`) or co-finite
//! (`AllExcept`). Structural equality therefore coincides with set equality,
//! which the solver relies on when comparing terms.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Bound;
use std::str::FromStr;

use quarry_util::errors::ParseError;

use crate::version::{parse_standard, StandardVersion, Version};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Interval {
    lower: Bound<StandardVersion>,
    upper: Bound<StandardVersion>,
}

impl Interval {
    fn contains(&self, v: &StandardVersion) -> bool {
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => v >= l,
            Bound::Excluded(l) => v > l,
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => v <= u,
            Bound::Excluded(u) => v < u,
        };
        above && below
    }

    fn is_full(&self) -> bool {
        matches!(
            (&self.lower, &self.upper),
            (Bound::Unbounded, Bound::Unbounded)
        )
    }

    fn point(&self) -> Option<&StandardVersion> {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) if l == u => Some(l),
            _ => None,
        }
    }
}

fn lower_cmp(a: &Bound<StandardVersion>, b: &Bound<StandardVersion>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

fn upper_cmp(a: &Bound<StandardVersion>, b: &Bound<StandardVersion>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

fn is_nonempty(lower: &Bound<StandardVersion>, upper: &Bound<StandardVersion>) -> bool {
    match (lower, upper) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Included(l), Bound::Included(u)) => l <= u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l < u,
    }
}

fn intersect_intervals(left: &[Interval], right: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    for a in left {
        for b in right {
            let lower = match lower_cmp(&a.lower, &b.lower) {
                Ordering::Less => b.lower.clone(),
                _ => a.lower.clone(),
            };
            let upper = match upper_cmp(&a.upper, &b.upper) {
                Ordering::Greater => b.upper.clone(),
                _ => a.upper.clone(),
            };
            if is_nonempty(&lower, &upper) {
                out.push(Interval { lower, upper });
            }
        }
    }
    out.sort_by(|x, y| lower_cmp(&x.lower, &y.lower));
    out
}

fn complement_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let mut start = Bound::Unbounded;
    for interval in intervals {
        let end = match &interval.lower {
            Bound::Unbounded => None,
            Bound::Included(v) => Some(Bound::Excluded(v.clone())),
            Bound::Excluded(v) => Some(Bound::Included(v.clone())),
        };
        if let Some(end) = end {
            if is_nonempty(&start, &end) {
                out.push(Interval {
                    lower: start.clone(),
                    upper: end,
                });
            }
        }
        start = match &interval.upper {
            Bound::Unbounded => return out,
            Bound::Included(v) => Bound::Excluded(v.clone()),
            Bound::Excluded(v) => Bound::Included(v.clone()),
        };
    }
    out.push(Interval {
        lower: start,
        upper: Bound::Unbounded,
    });
    out
}

/// Named and url versions admitted by a specifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum OpaqueSet {
    Only(BTreeSet<Version>),
    AllExcept(BTreeSet<Version>),
}

impl OpaqueSet {
    fn none() -> Self {
        Self::Only(BTreeSet::new())
    }

    fn contains(&self, v: &Version) -> bool {
        match self {
            Self::Only(set) => set.contains(v),
            Self::AllExcept(set) => !set.contains(v),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Only(set) if set.is_empty())
    }

    fn complement(&self) -> Self {
        match self {
            Self::Only(set) => Self::AllExcept(set.clone()),
            Self::AllExcept(set) => Self::Only(set.clone()),
        }
    }

    fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Only(a), Self::Only(b)) => Self::Only(a.intersection(b).cloned().collect()),
            (Self::Only(a), Self::AllExcept(b)) | (Self::AllExcept(b), Self::Only(a)) => {
                Self::Only(a.difference(b).cloned().collect())
            }
            (Self::AllExcept(a), Self::AllExcept(b)) => {
                Self::AllExcept(a.union(b).cloned().collect())
            }
        }
    }
}

/// A set of acceptable versions.
///
/// Built from the three primitive shapes ([`VersionSpecifier::allow_all`],
/// [`VersionSpecifier::version_match`], [`VersionSpecifier::range`]) and
/// combined with [`intersection`](Self::intersection),
/// [`union`](Self::union) and [`inverse`](Self::inverse).
///
/// Equality and hashing compare the admitted sets only; the pre-release
/// opt-in recorded at parse time is not part of a specifier's identity.
#[derive(Debug, Clone)]
pub struct VersionSpecifier {
    intervals: Vec<Interval>,
    opaque: OpaqueSet,
    /// Set when a clause names a pre/dev release as its operand.
    prereleases: bool,
}

impl PartialEq for VersionSpecifier {
    fn eq(&self, other: &Self) -> bool {
        self.intervals == other.intervals && self.opaque == other.opaque
    }
}

impl Eq for VersionSpecifier {}

impl Hash for VersionSpecifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.intervals.hash(state);
        self.opaque.hash(state);
    }
}

impl VersionSpecifier {
    /// Every version of every family.
    pub fn allow_all() -> Self {
        Self {
            intervals: vec![Interval {
                lower: Bound::Unbounded,
                upper: Bound::Unbounded,
            }],
            opaque: OpaqueSet::AllExcept(BTreeSet::new()),
            prereleases: false,
        }
    }

    /// No version at all.
    pub fn none() -> Self {
        Self {
            intervals: Vec::new(),
            opaque: OpaqueSet::none(),
            prereleases: false,
        }
    }

    /// Exactly one version.
    pub fn version_match(version: Version) -> Self {
        match version {
            Version::Standard(v) => Self {
                intervals: vec![Interval {
                    lower: Bound::Included(v.clone()),
                    upper: Bound::Included(v),
                }],
                opaque: OpaqueSet::none(),
                prereleases: false,
            },
            other => Self {
                intervals: Vec::new(),
                opaque: OpaqueSet::Only(BTreeSet::from([other])),
                prereleases: false,
            },
        }
    }

    /// Standard versions between `min` and `max`; `None` leaves that side open.
    pub fn range(
        min: Option<StandardVersion>,
        max: Option<StandardVersion>,
        include_min: bool,
        include_max: bool,
    ) -> Self {
        let lower = match min {
            None => Bound::Unbounded,
            Some(v) if include_min => Bound::Included(v),
            Some(v) => Bound::Excluded(v),
        };
        let upper = match max {
            None => Bound::Unbounded,
            Some(v) if include_max => Bound::Included(v),
            Some(v) => Bound::Excluded(v),
        };
        let intervals = if is_nonempty(&lower, &upper) {
            vec![Interval { lower, upper }]
        } else {
            Vec::new()
        };
        Self {
            intervals,
            opaque: OpaqueSet::none(),
            prereleases: false,
        }
    }

    /// Every standard version sharing `prefix`'s epoch and release segments,
    /// including its pre, post and dev releases: the `==X.Y.*` set.
    pub fn release_prefix(prefix: &StandardVersion) -> Self {
        Self::range(
            Some(StandardVersion::series_floor(
                prefix.epoch,
                prefix.release.clone(),
            )),
            Some(next_series(prefix.epoch, &prefix.release)),
            true,
            false,
        )
    }

    /// Whether `version` is admitted.
    ///
    /// A standard version is also admitted by an arbitrary-equality pin
    /// (`===text`) whose text is exactly the version's display form, so
    /// `===1.0` matches a listed `1.0` but not `1.0.0`.
    pub fn allows(&self, version: &Version) -> bool {
        match version {
            Version::Standard(v) => {
                self.intervals.iter().any(|i| i.contains(v)) || self.pins_text(version)
            }
            other => self.opaque.contains(other),
        }
    }

    /// Whether `version`'s display form is pinned with `===`.
    pub fn pins_text(&self, version: &Version) -> bool {
        match &self.opaque {
            OpaqueSet::Only(set) => set.contains(&Version::Named(version.to_string())),
            OpaqueSet::AllExcept(_) => false,
        }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            intervals: intersect_intervals(&self.intervals, &other.intervals),
            opaque: self.opaque.intersection(&other.opaque),
            prereleases: self.prereleases || other.prereleases,
        }
    }

    /// The complement. Excluding a pre-release never opts into pre-releases,
    /// so the result carries no opt-in.
    pub fn inverse(&self) -> Self {
        Self {
            intervals: complement_intervals(&self.intervals),
            opaque: self.opaque.complement(),
            prereleases: false,
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut union = self.inverse().intersection(&other.inverse()).inverse();
        union.prereleases = self.prereleases || other.prereleases;
        union
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty() && self.opaque.is_empty()
    }

    pub fn is_allow_all(&self) -> bool {
        self.intervals.len() == 1
            && self.intervals[0].is_full()
            && self.opaque == OpaqueSet::AllExcept(BTreeSet::new())
    }

    /// `self ⊆ other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.intersection(&other.inverse()).is_empty()
    }

    /// The single version this specifier admits, if it admits exactly one.
    pub fn as_exact(&self) -> Option<Version> {
        match (self.intervals.as_slice(), &self.opaque) {
            ([interval], OpaqueSet::Only(set)) if set.is_empty() => {
                interval.point().cloned().map(Version::Standard)
            }
            ([], OpaqueSet::Only(set)) if set.len() == 1 => set.iter().next().cloned(),
            _ => None,
        }
    }

    /// Whether the specifier explicitly opts into pre/dev releases.
    ///
    /// True when a parsed clause other than `!=` names a pre/dev release as
    /// its operand, or when a named/url version is pinned. Bounds produced by
    /// normalization (the `X.Y.dev0` floors of `==X.Y.*` and `~=`, the two
    /// sides of `!=`) never count.
    pub fn allows_prereleases(&self) -> bool {
        let pinned_opaque = matches!(&self.opaque, OpaqueSet::Only(set) if !set.is_empty());
        self.prereleases || pinned_opaque
    }

    fn with_prereleases(mut self, prereleases: bool) -> Self {
        self.prereleases = prereleases;
        self
    }
}

impl Default for VersionSpecifier {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// `<release with last segment bumped>.dev0`.
fn next_series(epoch: u64, release: &[u64]) -> StandardVersion {
    let mut bumped = release.to_vec();
    if let Some(last) = bumped.last_mut() {
        *last += 1;
    }
    StandardVersion::series_floor(epoch, bumped)
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_allow_all() {
            return f.write_str("*");
        }
        if self.is_empty() {
            return f.write_str("<none>");
        }
        if let Some(excluded) = self.inverse().as_exact() {
            return write!(f, "!={excluded}");
        }
        let mut parts = Vec::new();
        for interval in &self.intervals {
            if let Some(v) = interval.point() {
                parts.push(format!("=={v}"));
                continue;
            }
            let lower = match &interval.lower {
                Bound::Unbounded => None,
                Bound::Included(v) => Some(format!(">={v}")),
                Bound::Excluded(v) => Some(format!(">{v}")),
            };
            let upper = match &interval.upper {
                Bound::Unbounded => None,
                Bound::Included(v) => Some(format!("<={v}")),
                Bound::Excluded(v) => Some(format!("<{v}")),
            };
            parts.push(match (lower, upper) {
                (None, None) => "*".to_string(),
                (Some(l), None) => l,
                (None, Some(u)) => u,
                (Some(l), Some(u)) => format!("{l}, {u}"),
            });
        }
        match &self.opaque {
            OpaqueSet::Only(set) => {
                for v in set {
                    parts.push(match v {
                        Version::Url(url) => format!("@ {url}"),
                        other => format!("==={other}"),
                    });
                }
            }
            OpaqueSet::AllExcept(set) if set.is_empty() => {
                if self.intervals.is_empty() {
                    parts.push("any named version".to_string());
                }
            }
            OpaqueSet::AllExcept(set) => {
                let excluded: Vec<String> = set.iter().map(|v| v.to_string()).collect();
                parts.push(format!("named versions except {}", excluded.join(", ")));
            }
        }
        f.write_str(&parts.join(" || "))
    }
}

impl FromStr for VersionSpecifier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_specifier(s)
    }
}

/// Parse specifier text such as `>=1.0, <2.0`, `~=2.2`, `==1.4.*`,
/// `(>=1.0)` or `@ https://host/pkg.whl`.
///
/// Top-level commas intersect their clauses. Empty text admits everything.
pub fn parse_specifier(text: &str) -> Result<VersionSpecifier, ParseError> {
    check_balanced(text)?;
    if text.trim().is_empty() {
        return Ok(VersionSpecifier::allow_all());
    }
    parse_group(text, 0, text.len())
}

fn check_balanced(text: &str) -> Result<(), ParseError> {
    let mut open = Vec::new();
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => open.push(idx),
            ')' => {
                if open.pop().is_none() {
                    return Err(ParseError::new(
                        "unmatched closing parenthesis",
                        text,
                        idx,
                        idx + 1,
                    ));
                }
            }
            _ => {}
        }
    }
    match open.pop() {
        Some(idx) => Err(ParseError::new("unclosed parenthesis", text, idx, idx + 1)),
        None => Ok(()),
    }
}

/// Parse `source[start..end]` as comma-separated clauses.
fn parse_group(source: &str, start: usize, end: usize) -> Result<VersionSpecifier, ParseError> {
    let mut spec = VersionSpecifier::allow_all();
    for (clause_start, clause_end) in split_top_level(source, start, end) {
        let clause = parse_clause(source, clause_start, clause_end)?;
        spec = spec.intersection(&clause);
    }
    Ok(spec)
}

/// Byte ranges of the depth-0 comma-separated pieces of `source[start..end]`.
fn split_top_level(source: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut piece_start = start;
    for (offset, ch) in source[start..end].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push((piece_start, start + offset));
                piece_start = start + offset + 1;
            }
            _ => {}
        }
    }
    pieces.push((piece_start, end));
    pieces
}

/// Trim whitespace from `source[start..end]`, returning the narrowed range.
fn trim_range(source: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &source[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    (start + lead, (end - trail).max(start + lead))
}

const OPERATORS: [&str; 8] = ["===", "==", "!=", "~=", "<=", ">=", "<", ">"];

fn parse_clause(source: &str, start: usize, end: usize) -> Result<VersionSpecifier, ParseError> {
    let (start, end) = trim_range(source, start, end);
    let clause = &source[start..end];

    if clause.is_empty() {
        return Err(ParseError::new(
            "empty specifier clause",
            source,
            start.saturating_sub(1),
            end + 1,
        ));
    }

    if clause.starts_with('(') {
        let close = matching_paren(clause).ok_or_else(|| {
            ParseError::new("unclosed parenthesis", source, start, start + 1)
        })?;
        if close != clause.len() - 1 {
            return Err(ParseError::new(
                "unexpected text after parenthesized group",
                source,
                start + close + 1,
                end,
            ));
        }
        let (inner_start, inner_end) = trim_range(source, start + 1, start + close);
        if inner_start == inner_end {
            return Ok(VersionSpecifier::allow_all());
        }
        return parse_group(source, inner_start, inner_end);
    }

    if clause == "*" {
        return Ok(VersionSpecifier::allow_all());
    }

    if let Some(rest) = clause.strip_prefix('@') {
        let url = rest.trim();
        if url.is_empty() {
            return Err(ParseError::new("missing url after `@`", source, start, end));
        }
        return Ok(VersionSpecifier::version_match(Version::Url(
            url.to_string(),
        )));
    }

    let op = OPERATORS
        .iter()
        .find(|op| clause.starts_with(**op))
        .ok_or_else(|| {
            ParseError::new(
                "expected one of `~=`, `==`, `!=`, `<=`, `>=`, `<`, `>`, `===`",
                source,
                start,
                end,
            )
        })?;

    let (version_start, version_end) = trim_range(source, start + op.len(), end);
    let version_text = &source[version_start..version_end];
    if version_text.is_empty() {
        return Err(ParseError::new(
            format!("missing version after `{op}`"),
            source,
            start,
            end,
        ));
    }

    let standard = |text: &str| -> Result<StandardVersion, ParseError> {
        parse_standard(text).map_err(|e| e.within(source, version_start))
    };

    let spec = match *op {
        "===" => VersionSpecifier::version_match(Version::Named(version_text.to_string())),
        "==" | "!=" => {
            let matched = match version_text.strip_suffix(".*") {
                Some(prefix) => {
                    let prefix = standard(prefix)?;
                    if prefix.pre.is_some()
                        || prefix.post.is_some()
                        || prefix.dev.is_some()
                        || prefix.local.is_some()
                    {
                        return Err(ParseError::new(
                            "a `.*` prefix may only contain release segments",
                            source,
                            version_start,
                            version_end,
                        ));
                    }
                    VersionSpecifier::release_prefix(&prefix)
                }
                None => {
                    let pinned = standard(version_text)?;
                    let explicit = pinned.is_prerelease();
                    VersionSpecifier::version_match(Version::Standard(pinned))
                        .with_prereleases(explicit)
                }
            };
            if *op == "!=" {
                matched.inverse()
            } else {
                matched
            }
        }
        "~=" => {
            let base = standard(version_text)?;
            if base.release.len() < 2 {
                return Err(ParseError::new(
                    "`~=` requires at least two release segments",
                    source,
                    version_start,
                    version_end,
                ));
            }
            let upper = next_series(base.epoch, &base.release[..base.release.len() - 1]);
            let explicit = base.is_prerelease();
            VersionSpecifier::range(Some(base), Some(upper), true, false).with_prereleases(explicit)
        }
        _ => {
            let text = version_text.strip_suffix(".*").unwrap_or(version_text);
            let v = standard(text)?;
            let explicit = v.is_prerelease();
            let spec = match *op {
                ">=" => VersionSpecifier::range(Some(v), None, true, false),
                ">" => VersionSpecifier::range(Some(v), None, false, false),
                "<=" => VersionSpecifier::range(None, Some(v), false, true),
                _ => VersionSpecifier::range(None, Some(v), false, false),
            };
            spec.with_prereleases(explicit)
        }
    };
    Ok(spec)
}

/// Index of the `)` closing the `(` at position 0.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::parse_version;

    fn v(s: &str) -> Version {
        parse_version(s)
    }

    #[test]
    fn complement_of_point_has_two_sides() {
        let spec = VersionSpecifier::version_match(v("1.0")).inverse();
        assert_eq!(spec.intervals.len(), 2);
        assert!(spec.allows(&v("0.9")));
        assert!(!spec.allows(&v("1.0")));
        assert!(spec.allows(&v("1.0.post1")));
    }

    #[test]
    fn double_inverse_is_identity() {
        let spec = parse_specifier(">=1.0, <2.0").unwrap();
        assert_eq!(spec.inverse().inverse(), spec);
        let all = VersionSpecifier::allow_all();
        assert_eq!(all.inverse(), VersionSpecifier::none());
        assert_eq!(VersionSpecifier::none().inverse(), all);
    }

    #[test]
    fn union_merges_touching_ranges() {
        let a = parse_specifier(">=1.0, <2.0").unwrap();
        let b = parse_specifier(">=2.0, <3.0").unwrap();
        let merged = a.union(&b);
        assert_eq!(merged, parse_specifier(">=1.0, <3.0").unwrap());
    }

    #[test]
    fn equality_ignores_trailing_zeros() {
        assert_eq!(
            parse_specifier("==1.0").unwrap(),
            parse_specifier("==1.0.0").unwrap()
        );
    }

    #[test]
    fn synthetic_series_bounds_do_not_enable_prereleases() {
        assert!(!parse_specifier("==1.2.*").unwrap().allows_prereleases());
        assert!(!parse_specifier("~=1.2").unwrap().allows_prereleases());
        assert!(parse_specifier(">=1.2b1").unwrap().allows_prereleases());
    }

    #[test]
    fn excluding_a_prerelease_is_not_an_opt_in() {
        let excluded = parse_specifier("!=2.0b1").unwrap();
        assert!(!excluded.allows_prereleases());
        assert!(!parse_specifier(">=1.0, !=2.0b1").unwrap().allows_prereleases());
        assert!(!parse_specifier("==2.0b1").unwrap().inverse().allows_prereleases());
        assert!(parse_specifier("!=1.5, >=2.0b1").unwrap().allows_prereleases());
        assert!(excluded.union(&parse_specifier("<1.0a1").unwrap()).allows_prereleases());
    }

    #[test]
    fn opt_in_does_not_affect_equality() {
        let explicit = parse_specifier(">=1.0, <=2.0b1").unwrap();
        let normalized = VersionSpecifier::range(
            Some(parse_standard("1.0").unwrap()),
            Some(parse_standard("2.0b1").unwrap()),
            true,
            true,
        );
        assert!(explicit.allows_prereleases());
        assert!(!normalized.allows_prereleases());
        assert_eq!(explicit, normalized);
    }
}
