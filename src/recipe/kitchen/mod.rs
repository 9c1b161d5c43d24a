// src/recipe/kitchen/mod.rs

//! Kitchen: where recipes are cooked
//!
//! The Kitchen drives one recipe through its lifecycle against a host
//! profile. It handles:
//! - Fetching, unpacking and patching sources
//! - Planning and running the native generator (CMake, Meson, Autotools)
//! - Installing into a package folder and writing its manifest
//! - Smoke testing, gated on whether the host can execute the target
//!
//! External processes go through a [`CommandRunner`] and version lookups go
//! through a [`RequirementResolver`]; both can be swapped out.

mod archive;
mod config;
mod cook;
pub mod generator;
pub mod layout;
mod lock;
pub mod package;
pub mod runner;
pub mod tester;

pub use archive::{copy_tree, download_file, extract_archive};
pub use config::{CookResult, KitchenConfig};
pub use cook::Cook;
pub use generator::{BuildPlan, compute_definitions};
pub use layout::{BuildContext, Layout};
pub use lock::WorkdirLock;
pub use package::PackageManifest;
pub use runner::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use tester::{TestOutcome, check_output};

use crate::error::Result;
use crate::recipe::format::Recipe;
use crate::recipe::lifecycle::drive;
use crate::recipe::parser::validate_recipe;
use crate::recipe::probe::HostEnvironment;
use crate::recipe::requirements::{PinnedResolver, RequirementResolver};
use crate::settings::Profile;
use std::sync::Arc;
use tracing::{info, warn};

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    resolver: Arc<dyn RequirementResolver>,
    runner: Arc<dyn CommandRunner>,
}

impl Kitchen {
    /// Create a new Kitchen with the given configuration
    ///
    /// Requirements resolve only to exact versions until a resolver is set,
    /// and commands run as real processes bounded by the configured timeout.
    pub fn new(config: KitchenConfig) -> Self {
        let runner = Arc::new(SystemRunner::new(config.timeout));
        Self {
            config,
            resolver: Arc::new(PinnedResolver),
            runner,
        }
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Self {
        Self::new(KitchenConfig::default())
    }

    /// Set the requirement resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn RequirementResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the command runner
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Validate a recipe and set up a cook in the `declared` state
    ///
    /// The returned cook holds the working directory lock. Drive it with
    /// [`drive`] or call its entry points one by one.
    pub fn prepare<'a>(
        &'a self,
        recipe: &'a Recipe,
        profile: &Profile,
        host: &HostEnvironment,
        option_overrides: &[String],
    ) -> Result<Cook<'a>> {
        let warnings = validate_recipe(recipe)?;
        for warning in &warnings {
            warn!("{}: {}", recipe.reference(), warning);
        }

        let mut cook = Cook::new(self, recipe, profile, host.clone(), option_overrides)?;
        cook.add_warnings(warnings);
        Ok(cook)
    }

    /// Cook a recipe through every lifecycle phase
    pub fn cook(
        &self,
        recipe: &Recipe,
        profile: &Profile,
        host: &HostEnvironment,
        option_overrides: &[String],
    ) -> Result<CookResult> {
        let mut cook = self.prepare(recipe, profile, host, option_overrides)?;
        drive(&mut cook)?;

        if !self.config.keep_workdir {
            if let Some(layout) = cook.layout() {
                if let Err(e) = layout.clean_intermediate() {
                    warn!("Failed to clean working directory: {}", e);
                }
            }
        }

        let result = cook.into_result()?;
        info!(
            "Cooked {}: {} (tests {})",
            result.reference,
            result.state,
            if result.test.executed { "executed" } else { "not executed" }
        );
        Ok(result)
    }
}
