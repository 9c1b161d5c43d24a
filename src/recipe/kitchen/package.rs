// src/recipe/kitchen/package.rs

//! Packaging
//!
//! Installs the build into `<workdir>/package`, applies the recipe's
//! `[packaging]` rules, and records what was built in
//! `cookbook-package.json`. Only runtime requirements are recorded; tool
//! requirements never propagate to consumers.

use crate::error::{Error, Result};
use crate::recipe::format::{CopyBase, PackageType, PackagingSection};
use crate::recipe::kitchen::generator::{self, BuildPlan};
use crate::recipe::kitchen::layout::{BuildContext, Layout, resolve_inside};
use crate::recipe::kitchen::runner::CommandRunner;
use crate::recipe::requirements::ResolvedRequirement;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// A runtime requirement as recorded in the package manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedRequirement {
    pub name: String,
    pub version: String,
    pub transitive_headers: bool,
    pub transitive_libs: bool,
}

impl From<&ResolvedRequirement> for PackagedRequirement {
    fn from(resolved: &ResolvedRequirement) -> Self {
        Self {
            name: resolved.name.clone(),
            version: resolved.version.clone(),
            transitive_headers: resolved.transitive_headers,
            transitive_libs: resolved.transitive_libs,
        }
    }
}

/// Contents of `cookbook-package.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub package_type: PackageType,
    pub settings: BTreeMap<String, String>,
    /// Frozen option values
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub requires: Vec<PackagedRequirement>,
    pub created_at: String,
}

impl PackageManifest {
    /// Read a manifest back from a package folder
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::ParseError(format!("Invalid package manifest: {}", e)))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::IoError(format!("Failed to serialize manifest: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))
    }
}

/// Copy license files from the source tree into `package/licenses`
///
/// Missing files are warnings, not errors.
fn copy_licenses(rules: &PackagingSection, layout: &Layout) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    if rules.licenses.is_empty() {
        return Ok(warnings);
    }

    let dest = layout.licenses_dir();
    fs::create_dir_all(&dest)?;
    for license in &rules.licenses {
        let src = resolve_inside(&layout.source, license)?;
        let Some(name) = src.file_name() else {
            continue;
        };
        if src.is_file() {
            fs::copy(&src, dest.join(name))?;
            debug!("Packaged license {}", license);
        } else {
            let msg = format!("License file {} not found in sources", license);
            warn!("{}", msg);
            warnings.push(msg);
        }
    }
    Ok(warnings)
}

/// Apply `[[packaging.copy]]` rules, returning the number of files copied
fn apply_copy_rules(rules: &PackagingSection, layout: &Layout) -> Result<usize> {
    let mut count = 0;
    for rule in &rules.copy {
        let base = match rule.from {
            CopyBase::Source => &layout.source,
            CopyBase::Build => &layout.build,
        };
        let src_dir = match &rule.src {
            Some(src) => resolve_inside(base, src)?,
            None => base.clone(),
        };
        let dst_dir = resolve_inside(&layout.package, &rule.dst)?;

        let pattern = src_dir.join(&rule.pattern);
        let pattern = pattern.to_string_lossy();
        let matches = glob::glob(&pattern).map_err(|e| {
            Error::Configuration(format!("Invalid copy pattern '{}': {}", rule.pattern, e))
        })?;

        for entry in matches {
            let path = entry.map_err(|e| Error::IoError(format!("Failed to read match: {}", e)))?;
            if !path.is_file() {
                continue;
            }
            let relative = path
                .strip_prefix(&src_dir)
                .map_err(|e| Error::IoError(e.to_string()))?;
            let target = dst_dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&path, &target)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Delete paths listed in `remove` from the package folder
fn apply_removals(rules: &PackagingSection, layout: &Layout) -> Result<()> {
    for entry in &rules.remove {
        let path = resolve_inside(&layout.package, entry)?;
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else if path.exists() {
            fs::remove_file(&path)?;
        } else {
            continue;
        }
        debug!("Removed {} from package", entry);
    }
    Ok(())
}

/// Install, apply packaging rules and write the manifest
///
/// Returns the manifest and any warnings.
pub fn package(
    ctx: &BuildContext<'_>,
    plan: &BuildPlan,
    runtime: &[ResolvedRequirement],
    runner: &dyn CommandRunner,
    log: &mut String,
) -> Result<(PackageManifest, Vec<String>)> {
    let layout = ctx.layout;
    let rules = &ctx.recipe.packaging;

    generator::run_install(plan, runner, log)?;

    let warnings = copy_licenses(rules, layout)?;
    let copied = apply_copy_rules(rules, layout)?;
    if copied > 0 {
        info!("Copied {} extra files into the package", copied);
    }
    apply_removals(rules, layout)?;

    let manifest = PackageManifest {
        name: ctx.recipe.package.name.clone(),
        version: ctx.recipe.package.version.clone(),
        package_type: ctx.recipe.package.package_type,
        settings: ctx.settings.to_map(),
        options: ctx.options.to_map(),
        requires: runtime.iter().map(PackagedRequirement::from).collect(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    manifest.write(&layout.manifest_path())?;
    info!("Packaged {} into {}", ctx.recipe.reference(), layout.package.display());

    Ok((manifest, warnings))
}
