//! npm-style version ranges with prerelease-inclusive matching.
//!
//! Range expressions are translated into one [`semver::VersionReq`] per `||`
//! alternative. Matching does not use `VersionReq::matches`, which hides
//! prereleases unless a comparator names the same release triple; every
//! comparator is instead evaluated against the version's precedence so that
//! `2.0.0-rc.1` satisfies `>=1.0.0`.

use semver::{BuildMetadata, Comparator, Op, Version, VersionReq};
use std::cmp::Ordering;
use std::fmt;

/// Parse an exact version, accepting an optional `v` prefix and build
/// metadata (`1.22.19+sha512.abc`).
#[must_use]
pub fn parse_exact(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

/// Whether `input` is an exact version.
#[must_use]
pub fn is_exact(input: &str) -> bool {
    parse_exact(input).is_some()
}

/// Remove a `+hash` suffix from a version reference.
#[must_use]
pub fn strip_hash(reference: &str) -> &str {
    reference.split_once('+').map_or(reference, |(version, _)| version)
}

/// A parsed version range: a disjunction of comparator sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parse an npm-style range. Returns `None` for anything that is not a
    /// range, such as a dist-tag (`latest`) or a URL.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let raw = input.trim();
        let mut alternatives = Vec::new();

        for alternative in raw.split("||") {
            let translated = translate_alternative(alternative.trim())?;
            alternatives.push(VersionReq::parse(&translated).ok()?);
        }

        Some(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// The range as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Prerelease-inclusive match. Build metadata is ignored.
    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| {
            req.comparators
                .iter()
                .all(|comparator| matches_comparator(comparator, version))
        })
    }

    /// Match a version string, `false` when it is not an exact version.
    #[must_use]
    pub fn satisfies_str(&self, version: &str) -> bool {
        parse_exact(version).is_some_and(|v| self.satisfies(&v))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Whether `input` is a version range expression. Exact versions are ranges
/// too.
#[must_use]
pub fn is_range(input: &str) -> bool {
    VersionRange::parse(input).is_some()
}

/// Sort versions descending by precedence and drop duplicates.
pub fn sort_descending(versions: &mut Vec<Version>) {
    versions.sort_by(|a, b| compare_precedence(b, a));
    versions.dedup_by(|a, b| compare_precedence(a, b) == Ordering::Equal);
}

fn compare_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Turn one whitespace-separated comparator set into `semver` syntax.
fn translate_alternative(input: &str) -> Option<String> {
    if input.is_empty() {
        return Some("*".to_string());
    }

    let tokens = tokenize(input);

    // Hyphen range: `1.2.3 - 2.0.0`
    if let [low, dash, high] = tokens.as_slice() {
        if dash == "-" {
            let low = translate_comparator(&format!(">={low}"))?;
            let high = translate_comparator(&format!("<={high}"))?;
            return Some(format!("{low}, {high}"));
        }
    }

    let comparators = tokens
        .iter()
        .map(|token| translate_comparator(token))
        .collect::<Option<Vec<_>>>()?;
    Some(comparators.join(", "))
}

/// Split on whitespace, re-attaching operators written apart from their
/// version (`>= 1.2.0`).
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;

    for word in input.split_whitespace() {
        if matches!(word, ">" | ">=" | "<" | "<=" | "=" | "^" | "~") {
            pending_op = Some(word);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{op}{word}")),
            None => tokens.push(word.to_string()),
        }
    }
    if let Some(op) = pending_op {
        tokens.push(op.to_string());
    }
    tokens
}

fn translate_comparator(token: &str) -> Option<String> {
    let split = token
        .find(|c: char| c.is_ascii_alphanumeric() || c == '*')
        .unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let version = version.strip_prefix('v').unwrap_or(version);
    let version = strip_hash(version);
    if version.is_empty() {
        return None;
    }

    let parts: Vec<&str> = version.splitn(3, '.').collect();
    let is_wild = |part: &str| matches!(part, "*" | "x" | "X");
    let parts: Vec<&str> = parts
        .iter()
        .map(|part| if is_wild(part) { "*" } else { part })
        .collect();

    // Everything after the first wildcard is a wildcard too.
    let truncated: Vec<&str> = match parts.iter().position(|part| *part == "*") {
        Some(0) => return (op.is_empty() || op == "=").then(|| "*".to_string()),
        Some(index) => parts[..index].to_vec(),
        None => parts,
    };

    let full = truncated.len() == 3;
    let joined = truncated.join(".");
    let op = match op {
        "" | "=" if full => "=",
        "" | "=" => return Some(format!("{joined}.*")),
        "~>" => "~",
        ">" | ">=" | "<" | "<=" | "^" | "~" => op,
        _ => return None,
    };
    Some(format!("{op}{joined}"))
}

fn matches_comparator(comparator: &Comparator, version: &Version) -> bool {
    let triple = (version.major, version.minor, version.patch);
    let major = comparator.major;
    let full_cmp = || {
        let bound = Version {
            major,
            minor: comparator.minor.unwrap_or(0),
            patch: comparator.patch.unwrap_or(0),
            pre: comparator.pre.clone(),
            build: BuildMetadata::EMPTY,
        };
        compare_precedence(version, &bound)
    };

    match (comparator.op, comparator.minor, comparator.patch) {
        (Op::Exact, Some(_), Some(_)) => full_cmp() == Ordering::Equal,
        (Op::Exact | Op::Wildcard | Op::Tilde, Some(minor), None) => {
            (triple.0, triple.1) == (major, minor)
        }
        (Op::Exact | Op::Wildcard | Op::Tilde | Op::Caret, None, _) => triple.0 == major,

        (Op::Greater, Some(_), Some(_)) => full_cmp() == Ordering::Greater,
        (Op::Greater, Some(minor), None) => (triple.0, triple.1) > (major, minor),
        (Op::Greater, None, _) => triple.0 > major,

        (Op::GreaterEq, Some(_), Some(_)) => full_cmp() != Ordering::Less,
        (Op::GreaterEq, Some(minor), None) => (triple.0, triple.1) >= (major, minor),
        (Op::GreaterEq, None, _) => triple.0 >= major,

        (Op::Less, Some(_), Some(_)) => full_cmp() == Ordering::Less,
        (Op::Less, Some(minor), None) => (triple.0, triple.1) < (major, minor),
        (Op::Less, None, _) => triple.0 < major,

        (Op::LessEq, Some(_), Some(_)) => full_cmp() != Ordering::Greater,
        (Op::LessEq, Some(minor), None) => (triple.0, triple.1) <= (major, minor),
        (Op::LessEq, None, _) => triple.0 <= major,

        (Op::Tilde, Some(minor), Some(_)) => {
            full_cmp() != Ordering::Less && (triple.0, triple.1) == (major, minor)
        }

        (Op::Caret, Some(minor), Some(patch)) => {
            full_cmp() != Ordering::Less
                && if major > 0 {
                    triple.0 == major
                } else if minor > 0 {
                    (triple.0, triple.1) == (0, minor)
                } else {
                    triple == (0, 0, patch)
                }
        }
        (Op::Caret, Some(minor), None) => {
            if major > 0 {
                triple.0 == major && triple.1 >= minor
            } else {
                (triple.0, triple.1) == (0, minor)
            }
        }

        _ => false,
    }
}
