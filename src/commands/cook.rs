// src/commands/cook.rs

//! Cook command - build, package and test a recipe

use anyhow::{Context, Result};
use cookbook::recipe::requirements::IndexResolver;
use cookbook::recipe::{Kitchen, KitchenConfig, parse_recipe_file};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::load_profiles;

/// Options of `cookbook cook`
pub struct CookArgs<'a> {
    pub recipe: &'a str,
    pub profile: Option<&'a str>,
    pub build_profile: Option<&'a str>,
    pub index: Option<&'a str>,
    pub workdir: Option<&'a str>,
    pub jobs: Option<u32>,
    pub timeout: Option<u64>,
    pub keep_workdir: bool,
    pub offline: bool,
    pub options: &'a [String],
    pub json: bool,
}

/// Cook a package from a recipe
pub fn cmd_cook(args: CookArgs<'_>) -> Result<()> {
    let recipe_path = Path::new(args.recipe);

    println!("Reading recipe: {}", recipe_path.display());
    let recipe = parse_recipe_file(recipe_path)
        .with_context(|| format!("Failed to parse recipe: {}", recipe_path.display()))?;

    let (profile, host) = load_profiles(args.profile, args.build_profile)?;

    let mut config = KitchenConfig::default()
        .with_keep_workdir(args.keep_workdir)
        .with_network(!args.offline);
    if let Some(jobs) = args.jobs {
        config = config.with_jobs(jobs);
    }
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if let Some(workdir) = args.workdir {
        config = config.with_workdir(workdir);
    }

    let mut kitchen = Kitchen::new(config);
    if let Some(index) = args.index {
        let resolver = IndexResolver::from_file(Path::new(index))
            .with_context(|| format!("Failed to load version index: {}", index))?;
        kitchen = kitchen.with_resolver(Arc::new(resolver));
    }

    println!(
        "Cooking {} for {} with {} parallel jobs...",
        recipe.reference(),
        profile.settings,
        kitchen.config().jobs
    );

    let result = kitchen
        .cook(&recipe, &profile, &host, args.options)
        .with_context(|| format!("Failed to cook {}", recipe.reference()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("\n[COMPLETE] {} is {}", result.reference, result.state);
    println!("  Package: {}", result.package_dir.display());
    match &result.test.skip_reason {
        Some(reason) => println!("  Test: passed without running artifacts ({})", reason),
        None => println!("  Test: passed ({} run(s))", result.test.runs.len()),
    }

    if !result.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }

    info!(
        "Successfully cooked {} into {}",
        result.reference,
        result.package_dir.display()
    );
    Ok(())
}
