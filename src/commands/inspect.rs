// src/commands/inspect.rs

//! Recipe inspection commands - validate and list requirements

use anyhow::{Context, Result};
use cookbook::recipe::requirements::{self, RequirementManifest};
use cookbook::recipe::{ConditionContext, parse_recipe_file, probe, validate_recipe};
use std::path::Path;

use super::load_profiles;

/// Validate a recipe
pub fn cmd_validate(recipe_path: &str) -> Result<()> {
    let path = Path::new(recipe_path);
    let recipe = parse_recipe_file(path)
        .with_context(|| format!("Failed to parse recipe: {}", path.display()))?;

    let warnings = validate_recipe(&recipe).with_context(|| "Recipe validation failed")?;
    for warning in &warnings {
        println!("Warning: {}", warning);
    }

    println!("Recipe: {}", recipe.reference());
    if warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", warnings.len());
    }
    Ok(())
}

/// Show the requirements a recipe declares for a profile
pub fn cmd_requirements(
    recipe_path: &str,
    profile: Option<&str>,
    overrides: &[String],
    json: bool,
) -> Result<()> {
    let path = Path::new(recipe_path);
    let recipe = parse_recipe_file(path)
        .with_context(|| format!("Failed to parse recipe: {}", path.display()))?;
    let (profile, host) = load_profiles(profile, None)?;

    let cross_building = probe::is_cross_building(&profile.settings, &host);
    let options = recipe.resolve_options(&profile, overrides, cross_building)?;

    let ctx = ConditionContext {
        settings: &profile.settings,
        options: &options,
        version: &recipe.package.version,
        cross_building,
    };
    let manifest: RequirementManifest = requirements::declare(&recipe, &ctx)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!("{} for {}", recipe.reference(), profile.settings);
    if manifest.is_empty() {
        println!("  (no requirements)");
        return Ok(());
    }
    for requirement in manifest.iter() {
        println!("  {} [{}]", requirement, requirement.kind);
    }
    Ok(())
}
