// src/version/mod.rs

//! Version handling and range selectors for recipe requirements
//!
//! Upstream C/C++ projects do not follow semver strictly, so versions are
//! parsed leniently: any number of dot-separated numeric components with an
//! optional `-prerelease` tail (`1.2`, `1.2.13`, `2023.01.02`, `3.0.0-rc1`).
//! Missing components compare as zero.
//!
//! Ranges use the bracket syntax of the recipe corpus, e.g. `[>=1.1 <4]`,
//! `[~1.2]`, `[^0.9]`, `[>=1.0 <2.0 || >=3.0]`. Prereleases only match when
//! the range carries `include_prerelease`.

use crate::error::{Error, Result};
use semver::Prerelease;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A leniently parsed package version
#[derive(Debug, Clone)]
pub struct PackageVersion {
    raw: String,
    numbers: Vec<u64>,
    pre: Prerelease,
}

impl PackageVersion {
    /// Parse a version string
    ///
    /// Examples:
    /// - "1.2.3" → [1, 2, 3]
    /// - "v1.2" → [1, 2]
    /// - "2.0.0-rc1" → [2, 0, 0], prerelease "rc1"
    /// - "1.2.3+build5" → [1, 2, 3], build metadata dropped
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let body = body.split_once('+').map_or(body, |(core, _)| core);
        let (core, pre) = match body.split_once('-') {
            Some((core, pre)) => (core, pre),
            None => (body, ""),
        };

        if core.is_empty() {
            return Err(Error::ParseError(format!("Empty version: '{}'", s)));
        }

        let numbers = core
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| {
                    Error::ParseError(format!(
                        "Invalid version '{}': component '{}' is not numeric",
                        s, part
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pre = Prerelease::new(pre)
            .map_err(|e| Error::ParseError(format!("Invalid prerelease in '{}': {}", s, e)))?;

        Ok(Self {
            raw: trimmed.to_string(),
            numbers,
            pre,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    fn component(&self, index: usize) -> u64 {
        self.numbers.get(index).copied().unwrap_or(0)
    }

    /// Version with component `index` incremented and everything after it dropped
    fn bumped(&self, index: usize) -> Self {
        let mut numbers: Vec<u64> = (0..=index).map(|i| self.component(i)).collect();
        numbers[index] += 1;
        let raw = numbers
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        Self {
            raw,
            numbers,
            pre: Prerelease::EMPTY,
        }
    }

    /// Compare two versions
    pub fn compare(&self, other: &PackageVersion) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            match self.component(i).cmp(&other.component(i)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        // A release sorts after any of its prereleases
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single comparison against a bound
#[derive(Debug, Clone, PartialEq, Eq)]
enum Comparator {
    Exact(PackageVersion),
    NotEqual(PackageVersion),
    GreaterThan(PackageVersion),
    GreaterOrEqual(PackageVersion),
    LessThan(PackageVersion),
    LessOrEqual(PackageVersion),
}

impl Comparator {
    /// Parse one comparator, expanding `~` and `^` into a pair of bounds
    fn parse(token: &str) -> Result<Vec<Self>> {
        let token = token.trim();
        let parse = |rest: &str| PackageVersion::parse(rest.trim());

        let comparators = if let Some(rest) = token.strip_prefix(">=") {
            vec![Self::GreaterOrEqual(parse(rest)?)]
        } else if let Some(rest) = token.strip_prefix("<=") {
            vec![Self::LessOrEqual(parse(rest)?)]
        } else if let Some(rest) = token.strip_prefix("!=") {
            vec![Self::NotEqual(parse(rest)?)]
        } else if let Some(rest) = token.strip_prefix('>') {
            vec![Self::GreaterThan(parse(rest)?)]
        } else if let Some(rest) = token.strip_prefix('<') {
            vec![Self::LessThan(parse(rest)?)]
        } else if let Some(rest) = token.strip_prefix('=') {
            vec![Self::Exact(parse(rest)?)]
        } else if let Some(rest) = token.strip_prefix('~') {
            let base = parse(rest)?;
            let index = if base.numbers.len() > 1 { 1 } else { 0 };
            let upper = base.bumped(index);
            vec![Self::GreaterOrEqual(base), Self::LessThan(upper)]
        } else if let Some(rest) = token.strip_prefix('^') {
            let base = parse(rest)?;
            let index = base
                .numbers
                .iter()
                .position(|n| *n != 0)
                .unwrap_or(base.numbers.len() - 1);
            let upper = base.bumped(index);
            vec![Self::GreaterOrEqual(base), Self::LessThan(upper)]
        } else {
            vec![Self::Exact(parse(token)?)]
        };
        Ok(comparators)
    }

    fn satisfies(&self, version: &PackageVersion) -> bool {
        match self {
            Self::Exact(v) => version == v,
            Self::NotEqual(v) => version != v,
            Self::GreaterThan(v) => version > v,
            Self::GreaterOrEqual(v) => version >= v,
            Self::LessThan(v) => version < v,
            Self::LessOrEqual(v) => version <= v,
        }
    }
}

/// A version range such as `>=1.1 <4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    /// Alternatives separated by `||`; each is a conjunction
    alternatives: Vec<Vec<Comparator>>,
    include_prerelease: bool,
}

impl VersionRange {
    /// Parse the inside of a bracketed range (without the brackets)
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim().to_string();
        let mut include_prerelease = false;
        let mut alternatives = Vec::new();

        for alternative in raw.split("||") {
            let mut conjunction = Vec::new();
            let mut pending_operator: Option<&str> = None;

            for token in alternative
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
            {
                if token == "include_prerelease" {
                    include_prerelease = true;
                    continue;
                }
                if token == "loose" {
                    continue;
                }
                if token == "*" {
                    continue;
                }
                if token.chars().all(|c| "<>=!~^".contains(c)) {
                    pending_operator = Some(token);
                    continue;
                }
                let joined;
                let token = match pending_operator.take() {
                    Some(op) => {
                        joined = format!("{}{}", op, token);
                        joined.as_str()
                    }
                    None => token,
                };
                conjunction.extend(Comparator::parse(token)?);
            }

            if let Some(op) = pending_operator {
                return Err(Error::ParseError(format!(
                    "Dangling operator '{}' in range '{}'",
                    op, raw
                )));
            }
            alternatives.push(conjunction);
        }

        Ok(Self {
            raw,
            alternatives,
            include_prerelease,
        })
    }

    /// Check if a version satisfies this range
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        if version.is_prerelease() && !self.include_prerelease {
            return false;
        }
        self.alternatives
            .iter()
            .any(|conj| conj.iter().all(|c| c.satisfies(version)))
    }

    /// Check a raw version string; unparsable versions never satisfy
    pub fn satisfies_str(&self, version: &str) -> bool {
        PackageVersion::parse(version)
            .map(|v| self.satisfies(&v))
            .unwrap_or(false)
    }

    /// Highest candidate satisfying the range
    pub fn max_satisfying<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter_map(|c| PackageVersion::parse(c).ok().map(|v| (c, v)))
            .filter(|(_, v)| self.satisfies(v))
            .max_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(c, _)| c)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Version part of a requirement reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// `zlib/1.2.13`
    Exact(String),
    /// `openssl/[>=1.1 <4]`
    Range(VersionRange),
}

impl VersionSelector {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(|| {
                Error::ParseError(format!("Unterminated version range '{}'", s))
            })?;
            if inner.trim().is_empty() {
                return Err(Error::ParseError("Empty version range".to_string()));
            }
            return Ok(Self::Range(VersionRange::parse(inner)?));
        }
        if s.is_empty() {
            return Err(Error::ParseError("Empty version".to_string()));
        }
        if s.chars().any(|c| c.is_whitespace() || "[]<>".contains(c)) {
            return Err(Error::ParseError(format!("Invalid version '{}'", s)));
        }
        Ok(Self::Exact(s.to_string()))
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }

    /// Whether a concrete version satisfies the selector
    pub fn accepts(&self, version: &str) -> bool {
        match self {
            Self::Exact(v) => v == version,
            Self::Range(range) => range.satisfies_str(version),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => f.write_str(v),
            Self::Range(range) => write!(f, "[{}]", range),
        }
    }
}

impl Serialize for VersionSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
