// src/recipe/requirements.rs

//! Requirement declaration and resolution
//!
//! A recipe declares runtime requirements (linked into consumers of the
//! package) and tool requirements (needed only to build it). Declaration is
//! a pure function of the recipe and the current settings/options; entries
//! whose `when` condition does not hold are left out.
//!
//! Resolution pins each requirement to exactly one concrete version through
//! a [`RequirementResolver`]. This is single-recipe pinning against a flat
//! version index, not dependency-graph resolution.

use crate::error::{Error, Result};
use crate::recipe::condition::ConditionContext;
use crate::recipe::format::{Recipe, RequirementDecl};
use crate::version::VersionSelector;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Runtime or build-time requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementKind {
    Runtime,
    Tool,
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime => f.write_str("runtime"),
            Self::Tool => f.write_str("tool"),
        }
    }
}

/// A parsed requirement reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub name: String,
    pub selector: VersionSelector,
    pub kind: RequirementKind,
    pub transitive_headers: bool,
    pub transitive_libs: bool,
}

impl Requirement {
    /// Parse `name/version` or `name/[range]`
    pub fn parse(reference: &str, kind: RequirementKind) -> Result<Self> {
        let reference = reference.trim();
        let (name, version) = reference.split_once('/').ok_or_else(|| {
            Error::Dependency(format!(
                "Malformed requirement '{}': expected name/version",
                reference
            ))
        })?;

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-_.+".contains(c))
        {
            return Err(Error::Dependency(format!(
                "Malformed requirement '{}': invalid package name '{}'",
                reference, name
            )));
        }

        let selector = VersionSelector::parse(version).map_err(|e| {
            Error::Dependency(format!("Malformed requirement '{}': {}", reference, e))
        })?;

        Ok(Self {
            name: name.to_string(),
            selector,
            kind,
            transitive_headers: false,
            transitive_libs: false,
        })
    }

    fn from_decl(decl: &RequirementDecl, kind: RequirementKind) -> Result<Self> {
        let mut requirement = Self::parse(&decl.reference, kind)?;
        requirement.transitive_headers = decl.transitive_headers;
        requirement.transitive_libs = decl.transitive_libs;
        Ok(requirement)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.selector)
    }
}

/// Requirements declared for one configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequirementManifest {
    pub runtime: Vec<Requirement>,
    pub tool: Vec<Requirement>,
}

impl RequirementManifest {
    pub fn is_empty(&self) -> bool {
        self.runtime.is_empty() && self.tool.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.runtime.iter().chain(self.tool.iter())
    }
}

/// Check every reference in a recipe parses, regardless of conditions
pub fn check_references(recipe: &Recipe) -> Result<()> {
    for decl in &recipe.requires {
        Requirement::parse(&decl.reference, RequirementKind::Runtime)?;
    }
    for decl in &recipe.tool_requires {
        Requirement::parse(&decl.reference, RequirementKind::Tool)?;
    }
    Ok(())
}

fn declare_kind(
    decls: &[RequirementDecl],
    kind: RequirementKind,
    ctx: &ConditionContext<'_>,
) -> Result<Vec<Requirement>> {
    let mut seen = BTreeSet::new();
    let mut requirements = Vec::new();

    for decl in decls {
        let requirement = Requirement::from_decl(decl, kind)?;
        if !decl.when.holds(ctx)? {
            debug!("Skipping {} requirement {}: condition not met", kind, requirement);
            continue;
        }
        if !seen.insert(requirement.name.clone()) {
            return Err(Error::Dependency(format!(
                "{} requirement '{}' is declared more than once",
                kind, requirement.name
            )));
        }
        requirements.push(requirement);
    }

    Ok(requirements)
}

/// Runtime requirements for the current configuration
pub fn declare_runtime(recipe: &Recipe, ctx: &ConditionContext<'_>) -> Result<Vec<Requirement>> {
    declare_kind(&recipe.requires, RequirementKind::Runtime, ctx)
}

/// Tool requirements for the current configuration
pub fn declare_tool(recipe: &Recipe, ctx: &ConditionContext<'_>) -> Result<Vec<Requirement>> {
    declare_kind(&recipe.tool_requires, RequirementKind::Tool, ctx)
}

/// Full manifest for the current configuration
pub fn declare(recipe: &Recipe, ctx: &ConditionContext<'_>) -> Result<RequirementManifest> {
    Ok(RequirementManifest {
        runtime: declare_runtime(recipe, ctx)?,
        tool: declare_tool(recipe, ctx)?,
    })
}

/// A requirement pinned to one concrete version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRequirement {
    pub name: String,
    pub version: String,
    pub requested: String,
    pub kind: RequirementKind,
    pub transitive_headers: bool,
    pub transitive_libs: bool,
}

impl ResolvedRequirement {
    pub fn new(requirement: &Requirement, version: impl Into<String>) -> Self {
        Self {
            name: requirement.name.clone(),
            version: version.into(),
            requested: requirement.selector.to_string(),
            kind: requirement.kind,
            transitive_headers: requirement.transitive_headers,
            transitive_libs: requirement.transitive_libs,
        }
    }
}

impl fmt::Display for ResolvedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Resolved manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedManifest {
    pub runtime: Vec<ResolvedRequirement>,
    pub tool: Vec<ResolvedRequirement>,
}

/// Trait for pinning requirements to concrete versions
///
/// This keeps the Kitchen decoupled from where version information comes
/// from (a local index file, a pinned lockfile, a test double).
pub trait RequirementResolver: Send + Sync {
    /// Resolve one requirement to exactly one version
    fn resolve(&self, requirement: &Requirement) -> Result<ResolvedRequirement>;
}

/// A resolver that only accepts exact versions
///
/// Use this when no version index is available; ranges fail to resolve.
pub struct PinnedResolver;

impl RequirementResolver for PinnedResolver {
    fn resolve(&self, requirement: &Requirement) -> Result<ResolvedRequirement> {
        match &requirement.selector {
            VersionSelector::Exact(version) => Ok(ResolvedRequirement::new(requirement, version)),
            VersionSelector::Range(_) => Err(Error::Dependency(format!(
                "Cannot resolve range {} without a version index",
                requirement
            ))),
        }
    }
}

/// A flat `name -> [versions]` table
///
/// ```toml
/// zlib = ["1.2.13", "1.3.1"]
/// cmake = ["3.27.9", "3.28.1"]
/// ```
#[derive(Debug, Clone, Default)]
pub struct IndexResolver {
    packages: BTreeMap<String, Vec<String>>,
}

impl IndexResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package<I, S>(mut self, name: &str, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages
            .insert(name.to_string(), versions.into_iter().map(Into::into).collect());
        self
    }

    /// Parse an index from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let packages: BTreeMap<String, Vec<String>> = toml::from_str(content)
            .map_err(|e| Error::ParseError(format!("Invalid version index: {}", e)))?;
        Ok(Self { packages })
    }

    /// Load an index from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read index {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }
}

impl RequirementResolver for IndexResolver {
    fn resolve(&self, requirement: &Requirement) -> Result<ResolvedRequirement> {
        let versions = self.packages.get(&requirement.name).ok_or_else(|| {
            Error::Dependency(format!(
                "Package '{}' is not in the version index",
                requirement.name
            ))
        })?;

        let chosen = match &requirement.selector {
            VersionSelector::Exact(version) => versions
                .iter()
                .find(|v| *v == version)
                .map(|v| v.as_str()),
            VersionSelector::Range(range) => {
                range.max_satisfying(versions.iter().map(|v| v.as_str()))
            }
        };

        chosen
            .map(|version| ResolvedRequirement::new(requirement, version))
            .ok_or_else(|| {
                Error::Dependency(format!(
                    "No version of '{}' satisfies {} (available: {})",
                    requirement.name,
                    requirement.selector,
                    versions.join(", ")
                ))
            })
    }
}

/// Resolve every entry of a manifest
pub fn resolve_manifest(
    manifest: &RequirementManifest,
    resolver: &dyn RequirementResolver,
) -> Result<ResolvedManifest> {
    let resolve_all = |requirements: &[Requirement]| -> Result<Vec<ResolvedRequirement>> {
        requirements
            .iter()
            .map(|requirement| {
                let resolved = resolver.resolve(requirement)?;
                debug!("Resolved {} to {}", requirement, resolved.version);
                Ok(resolved)
            })
            .collect()
    };

    Ok(ResolvedManifest {
        runtime: resolve_all(&manifest.runtime)?,
        tool: resolve_all(&manifest.tool)?,
    })
}
