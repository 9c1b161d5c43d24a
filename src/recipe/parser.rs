// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::hash::Checksum;
use crate::recipe::format::Recipe;
use crate::recipe::requirements::check_references;
use std::path::Path;

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
///
/// Relative paths inside the recipe resolve against the file's directory.
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read recipe file: {}", e)))?;

    let mut recipe = parse_recipe(&content)?;
    recipe.root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok(recipe)
}

/// Validate a recipe for completeness and correctness
///
/// Returns warnings for missing optional metadata. Malformed requirement
/// references are reported as dependency errors; everything else that
/// makes the recipe unusable is a parse error.
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    // Check for empty name/version
    if recipe.package.name.is_empty() {
        return Err(Error::ParseError("Recipe package name cannot be empty".to_string()));
    }
    if recipe.package.version.is_empty() {
        return Err(Error::ParseError("Recipe package version cannot be empty".to_string()));
    }

    if let Some(source) = &recipe.source {
        match (&source.path, &source.url) {
            (Some(_), Some(_)) => {
                return Err(Error::ParseError(
                    "Source must have either path or url, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(Error::ParseError("Source needs a path or a url".to_string()));
            }
            (None, Some(_)) => match &source.sha256 {
                Some(checksum) => {
                    Checksum::parse(checksum)?;
                }
                None => warnings.push("Source archive has no sha256 checksum".to_string()),
            },
            (Some(_), None) => {}
        }
        for patch in &source.patches {
            if patch.file.is_empty() {
                return Err(Error::ParseError("Patch file cannot be empty".to_string()));
            }
            patch.when.validate()?;
        }
    } else {
        warnings.push("No source specified; the recipe directory is the source".to_string());
    }

    for (name, def) in &recipe.options {
        def.validate(name)?;
    }
    for rule in &recipe.option_rules {
        rule.when.validate()?;
        for name in &rule.remove {
            if !recipe.options.contains_key(name) {
                return Err(Error::ParseError(format!(
                    "Option rule removes undeclared option '{}'",
                    name
                )));
            }
        }
    }
    for constraint in &recipe.constraints {
        constraint.when.validate()?;
    }
    for option in recipe.generate.options.keys() {
        if !recipe.options.contains_key(option) {
            return Err(Error::ParseError(format!(
                "[generate.options] maps undeclared option '{}'",
                option
            )));
        }
    }
    for conditional in &recipe.generate.conditional {
        conditional.when.validate()?;
    }

    for decl in recipe.requires.iter().chain(&recipe.tool_requires) {
        decl.when.validate()?;
    }
    check_references(recipe)?;

    // Warn about missing fields
    if recipe.package.description.is_none() {
        warnings.push("Missing package description".to_string());
    }
    if recipe.package.license.is_none() {
        warnings.push("Missing package license".to_string());
    }
    if recipe.packaging.licenses.is_empty() {
        warnings.push("No license files are packaged".to_string());
    }

    match &recipe.test {
        None => warnings.push("No test declared; the recipe is build-only".to_string()),
        Some(test) => {
            for run in &test.run {
                if run.artifact.is_empty() {
                    return Err(Error::ParseError("Test artifact cannot be empty".to_string()));
                }
                run.when.validate()?;
                if let Some(pattern) = &run.expect.matches {
                    regex::Regex::new(pattern).map_err(|e| {
                        Error::ParseError(format!("Invalid test pattern '{}': {}", pattern, e))
                    })?;
                }
            }
            if test.run.is_empty() && test.files.is_empty() {
                warnings.push("Test section declares nothing to run or check".to_string());
            }
        }
    }

    Ok(warnings)
}
