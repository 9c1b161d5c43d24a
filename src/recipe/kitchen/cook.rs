// src/recipe/kitchen/cook.rs

//! Cook: the lifecycle of a single recipe
//!
//! A `Cook` owns one configuration of one recipe and implements the eight
//! [`Lifecycle`] entry points on top of the kitchen's phases:
//!
//! - `requirements` / `build_requirements`: declare runtime and tool
//!   requirements for the current settings and options
//! - `configure`: apply constraints and compiler checks,
//!   resolve requirements, freeze options (`declared → configured`)
//! - `layout`: prepare the working directory folders
//! - `generate`: compute definitions and write the build plan
//! - `build`: prep the sources, then configure and compile
//! - `package`: install and apply packaging rules (`configured → built`)
//! - `test`: run the smoke test (`built → tested`)

use crate::error::{Error, Result};
use crate::options::Options;
use crate::recipe::condition::ConditionContext;
use crate::recipe::format::Recipe;
use crate::recipe::lifecycle::{Lifecycle, Phase, PhaseTracker, RecipeState};
use crate::recipe::probe::{self, HostEnvironment};
use crate::recipe::requirements::{
    self, RequirementManifest, ResolvedManifest, resolve_manifest,
};
use crate::settings::{Profile, Settings, cppstd_level};
use crate::version::PackageVersion;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::Kitchen;
use super::archive::prepare_sources;
use super::config::CookResult;
use super::generator::{self, BuildPlan, PlanRequest};
use super::layout::{BuildContext, Layout};
use super::lock::WorkdirLock;
use super::package::{self, PackageManifest};
use super::tester::{self, TestOutcome};

/// A single cook operation
pub struct Cook<'a> {
    kitchen: &'a Kitchen,
    recipe: &'a Recipe,
    /// Target settings
    settings: Settings,
    host: HostEnvironment,
    options: Options,
    /// Environment for generator invocations
    env: BTreeMap<String, String>,
    jobs: u32,
    cross_building: bool,
    state: RecipeState,
    tracker: PhaseTracker,
    workdir: PathBuf,
    layout: Option<Layout>,
    requirements: RequirementManifest,
    resolved: ResolvedManifest,
    plan: Option<BuildPlan>,
    package: Option<PackageManifest>,
    test: Option<TestOutcome>,
    /// Build log accumulator
    log: String,
    warnings: Vec<String>,
    _lock: WorkdirLock,
}

impl<'a> Cook<'a> {
    /// Set up a cook in the `declared` state
    ///
    /// Option values come from [`Recipe::resolve_options`], with option
    /// rules already applied. The working directory is locked until the
    /// cook is dropped.
    pub(super) fn new(
        kitchen: &'a Kitchen,
        recipe: &'a Recipe,
        profile: &Profile,
        host: HostEnvironment,
        overrides: &[String],
    ) -> Result<Self> {
        let settings = profile.settings.clone();
        let cross_building = probe::is_cross_building(&settings, &host);
        let options = recipe.resolve_options(profile, overrides, cross_building)?;

        let mut env = BTreeMap::new();
        if cross_building {
            env.extend(profile.cross.env_vars());
        }
        env.extend(profile.buildenv.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(recipe.build.env.iter().map(|(k, v)| (k.clone(), recipe.substitute(v))));

        let jobs = recipe.build.jobs.unwrap_or(kitchen.config.jobs).max(1);
        let workdir = kitchen
            .config
            .workdir_for(&recipe.package.name, &recipe.package.version);
        let lock = WorkdirLock::acquire(&workdir)?;

        info!(
            "Cooking {} for {}{}",
            recipe.reference(),
            settings,
            if cross_building { " (cross)" } else { "" }
        );

        Ok(Self {
            kitchen,
            recipe,
            settings,
            host,
            options,
            env,
            jobs,
            cross_building,
            state: RecipeState::Declared,
            tracker: PhaseTracker::new(),
            workdir,
            layout: None,
            requirements: RequirementManifest::default(),
            resolved: ResolvedManifest::default(),
            plan: None,
            package: None,
            test: None,
            log: String::new(),
            warnings: Vec::new(),
            _lock: lock,
        })
    }

    pub fn state(&self) -> RecipeState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn plan(&self) -> Option<&BuildPlan> {
        self.plan.as_ref()
    }

    pub fn test_outcome(&self) -> Option<&TestOutcome> {
        self.test.as_ref()
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(super) fn add_warnings(&mut self, warnings: impl IntoIterator<Item = String>) {
        self.warnings.extend(warnings);
    }

    fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    fn conditions(&self) -> ConditionContext<'_> {
        ConditionContext {
            settings: &self.settings,
            options: &self.options,
            version: &self.recipe.package.version,
            cross_building: self.cross_building,
        }
    }

    /// Run one phase under the tracker
    fn step<T>(&mut self, phase: Phase, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.tracker.begin(phase)?;
        let outcome = body(self);
        if let Err(e) = &outcome {
            warn!("Phase {} failed: {}", phase, e);
        }
        self.tracker.finish(phase, outcome)
    }

    /// Borrow the build context alongside the log
    fn with_context<T>(
        &mut self,
        body: impl FnOnce(&BuildContext<'_>, &mut String) -> Result<T>,
    ) -> Result<T> {
        let layout = self.layout.as_ref().ok_or_else(|| Error::InvalidTransition {
            from: self.state.to_string(),
            to: "layout".to_string(),
        })?;
        let ctx = BuildContext {
            recipe: self.recipe,
            settings: &self.settings,
            options: &self.options,
            host: &self.host,
            layout,
            env: self.env.clone(),
            jobs: self.jobs,
            cross_building: self.cross_building,
        };
        body(&ctx, &mut self.log)
    }

    fn plan_ref(&self) -> Result<&BuildPlan> {
        self.plan.as_ref().ok_or_else(|| Error::InvalidTransition {
            from: self.state.to_string(),
            to: "generate".to_string(),
        })
    }

    /// Refuse settings outside the recipe's declared platforms
    fn check_applicability(&self) -> Result<()> {
        let supported = &self.recipe.settings;
        if !supported.os.is_empty() {
            match self.settings.os {
                Some(os) if supported.os.contains(&os) => {}
                Some(os) => {
                    return Err(Error::Configuration(format!(
                        "{} does not support os={}",
                        self.recipe.reference(),
                        os
                    )));
                }
                None => {
                    return Err(Error::Configuration(format!(
                        "{} requires the os setting",
                        self.recipe.reference()
                    )));
                }
            }
        }
        if !supported.arch.is_empty() {
            match self.settings.arch {
                Some(arch) if supported.arch.contains(&arch) => {}
                Some(arch) => {
                    return Err(Error::Configuration(format!(
                        "{} does not support arch={}",
                        self.recipe.reference(),
                        arch
                    )));
                }
                None => {
                    return Err(Error::Configuration(format!(
                        "{} requires the arch setting",
                        self.recipe.reference()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check `[validate]`: minimum C++ standard and compiler versions
    fn check_toolchain(&mut self) -> Result<()> {
        let recipe = self.recipe;
        let validate = &recipe.validate;

        if let Some(min) = &validate.min_cppstd {
            let required = cppstd_level(min).ok_or_else(|| {
                Error::Configuration(format!("Invalid min_cppstd '{}'", min))
            })?;
            match self.settings.cppstd.as_deref() {
                Some(cppstd) => {
                    let actual = cppstd_level(cppstd).ok_or_else(|| {
                        Error::Configuration(format!("Invalid compiler.cppstd '{}'", cppstd))
                    })?;
                    if actual < required {
                        return Err(Error::Configuration(format!(
                            "{} requires C++{} or newer, but compiler.cppstd={}",
                            recipe.reference(),
                            min,
                            cppstd
                        )));
                    }
                }
                None => {
                    let msg = format!(
                        "compiler.cppstd is not set; cannot check min_cppstd={}",
                        min
                    );
                    warn!("{}", msg);
                    self.warnings.push(msg);
                }
            }
        }

        if let (Some(compiler), Some(version)) =
            (self.settings.compiler, self.settings.compiler_version.as_deref())
        {
            if let Some(minimum) = validate.compilers_minimum_version.get(&compiler) {
                let actual = PackageVersion::parse(version)?;
                let minimum_version = PackageVersion::parse(minimum)?;
                if actual < minimum_version {
                    return Err(Error::Configuration(format!(
                        "{} requires {} >= {}, but compiler.version={}",
                        recipe.reference(),
                        compiler,
                        minimum,
                        version
                    )));
                }
            }
        }
        Ok(())
    }

    fn run_configure(&mut self) -> Result<()> {
        self.check_applicability()?;

        {
            let ctx = self.conditions();
            for constraint in &self.recipe.constraints {
                if constraint.when.holds(&ctx)? {
                    return Err(Error::Configuration(format!(
                        "Invalid configuration for {}: {}",
                        self.recipe.reference(),
                        constraint.message
                    )));
                }
            }
        }

        self.check_toolchain()?;

        let kitchen = self.kitchen;
        let resolved = resolve_manifest(&self.requirements, kitchen.resolver.as_ref())?;
        for requirement in resolved.runtime.iter().chain(&resolved.tool) {
            self.log_line(&format!("Resolved {}", requirement));
        }
        self.resolved = resolved;

        self.options.freeze();
        self.state.advance(RecipeState::Configured)?;
        info!("Configured {} with options {:?}", self.recipe.reference(), self.options.to_map());
        Ok(())
    }

    fn run_layout(&mut self) -> Result<()> {
        let layout = Layout::new(&self.workdir, self.settings.build_type_or_default());
        layout.prepare()?;
        debug!("Working directory {}", layout.root.display());
        self.layout = Some(layout);
        Ok(())
    }

    fn run_generate(&mut self) -> Result<()> {
        let plan = self.with_context(|ctx, _log| {
            let recipe = ctx.recipe;
            let definitions = generator::compute_definitions(
                recipe.build.generator,
                &recipe.generate,
                &ctx.condition_context(),
            )?;
            let source_dir = ctx.layout.source_root(recipe.build.subdir.as_deref())?;
            let plan = generator::plan(&PlanRequest {
                generator: recipe.build.generator,
                source_dir: &source_dir,
                build_dir: &ctx.layout.build,
                install_prefix: &ctx.layout.package,
                settings: ctx.settings,
                definitions: &definitions,
                cross_building: ctx.cross_building,
                jobs: ctx.jobs,
                env: &ctx.env,
            });
            generator::write_plan(&plan, &ctx.layout.plan_path())?;
            Ok(plan)
        })?;

        for definition in &plan.definitions {
            debug!("Definition {}", definition);
        }
        self.plan = Some(plan);
        Ok(())
    }

    fn run_build(&mut self) -> Result<()> {
        let kitchen = self.kitchen;
        let runner = kitchen.runner.as_ref();
        let plan = self.plan_ref()?.clone();

        self.with_context(|ctx, log| {
            // Nothing is spawned, patch included, for a target we cannot configure
            generator::check_buildable(ctx, plan.generator, runner)?;
            prepare_sources(ctx, kitchen.config.allow_network, runner, log)?;
            generator::run_build(ctx, &plan, runner, "build", log)?;
            Ok(())
        })
    }

    fn run_package(&mut self) -> Result<()> {
        let kitchen = self.kitchen;
        let runner = kitchen.runner.as_ref();
        let plan = self.plan_ref()?.clone();
        let runtime = self.resolved.runtime.clone();

        let (manifest, warnings) = self.with_context(|ctx, log| {
            package::package(ctx, &plan, &runtime, runner, log)
        })?;

        self.warnings.extend(warnings);
        self.package = Some(manifest);
        self.state.advance(RecipeState::Built)
    }

    fn run_test(&mut self) -> Result<()> {
        let kitchen = self.kitchen;
        let runner = kitchen.runner.as_ref();
        let outcome = self.with_context(|ctx, log| tester::run_test(ctx, runner, log))?;

        if let Some(reason) = &outcome.skip_reason {
            self.log_line(&format!("Test: {}", reason));
        }
        self.test = Some(outcome);
        self.state.advance(RecipeState::Tested)
    }

    /// Consume a finished cook into its result
    pub fn into_result(self) -> Result<CookResult> {
        if self.state != RecipeState::Tested {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: "result".to_string(),
            });
        }
        let layout = self.layout.ok_or_else(|| {
            Error::InvalidTransition {
                from: self.state.to_string(),
                to: "result".to_string(),
            }
        })?;

        Ok(CookResult {
            reference: self.recipe.reference(),
            state: self.state,
            requirements: self.requirements,
            resolved: self.resolved,
            plan: self.plan,
            package: self.package,
            test: self.test.unwrap_or_default(),
            workdir: self.workdir,
            package_dir: layout.package,
            log: self.log,
            warnings: self.warnings,
        })
    }
}

impl Lifecycle for Cook<'_> {
    fn requirements(&mut self) -> Result<()> {
        self.step(Phase::Requirements, |cook| {
            let runtime = requirements::declare_runtime(cook.recipe, &cook.conditions())?;
            for requirement in &runtime {
                info!("Requires {}", requirement);
            }
            cook.requirements.runtime = runtime;
            Ok(())
        })
    }

    fn build_requirements(&mut self) -> Result<()> {
        self.step(Phase::BuildRequirements, |cook| {
            let tool = requirements::declare_tool(cook.recipe, &cook.conditions())?;
            for requirement in &tool {
                info!("Tool requires {}", requirement);
            }
            cook.requirements.tool = tool;
            Ok(())
        })
    }

    fn configure(&mut self) -> Result<()> {
        self.step(Phase::Configure, Self::run_configure)
    }

    fn layout(&mut self) -> Result<()> {
        self.step(Phase::Layout, Self::run_layout)
    }

    fn generate(&mut self) -> Result<()> {
        self.step(Phase::Generate, Self::run_generate)
    }

    fn build(&mut self) -> Result<()> {
        self.step(Phase::Build, Self::run_build)
    }

    fn package(&mut self) -> Result<()> {
        self.step(Phase::Package, Self::run_package)
    }

    fn test(&mut self) -> Result<()> {
        self.step(Phase::Test, Self::run_test)
    }
}
