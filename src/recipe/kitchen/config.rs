// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen

use crate::recipe::kitchen::generator::BuildPlan;
use crate::recipe::kitchen::package::PackageManifest;
use crate::recipe::kitchen::tester::TestOutcome;
use crate::recipe::lifecycle::RecipeState;
use crate::recipe::requirements::{RequirementManifest, ResolvedManifest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the Kitchen
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Parent of per-recipe working directories (`<root>/<name>-<version>`)
    pub workdir_root: PathBuf,
    /// Exact working directory, overriding `workdir_root`
    pub workdir: Option<PathBuf>,
    /// Timeout for each external invocation
    pub timeout: Duration,
    /// Number of parallel jobs
    pub jobs: u32,
    /// Permit http(s) source downloads
    pub allow_network: bool,
    /// Keep `source/` and `build/` after a successful cook (for debugging)
    pub keep_workdir: bool,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        Self {
            workdir_root: std::env::temp_dir().join("cookbook"),
            workdir: None,
            timeout: Duration::from_secs(3600), // 1 hour
            jobs,
            allow_network: true,
            keep_workdir: false,
        }
    }
}

impl KitchenConfig {
    /// Use exactly this working directory
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workdir_root = root.into();
        self
    }

    pub fn with_jobs(mut self, jobs: u32) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_keep_workdir(mut self, keep: bool) -> Self {
        self.keep_workdir = keep;
        self
    }

    pub fn with_network(mut self, allow: bool) -> Self {
        self.allow_network = allow;
        self
    }

    /// Working directory for one recipe
    pub fn workdir_for(&self, name: &str, version: &str) -> PathBuf {
        match &self.workdir {
            Some(dir) => dir.clone(),
            None => self.workdir_root.join(format!("{}-{}", name, version)),
        }
    }
}

/// Result of cooking a recipe
#[derive(Debug, Clone, Serialize)]
pub struct CookResult {
    /// `name/version`
    pub reference: String,
    /// Terminal lifecycle state
    pub state: RecipeState,
    /// Declared requirements
    pub requirements: RequirementManifest,
    /// Requirements pinned to concrete versions
    pub resolved: ResolvedManifest,
    /// Generator invocations used for the build
    pub plan: Option<BuildPlan>,
    /// Manifest written into the package folder
    pub package: Option<PackageManifest>,
    pub test: TestOutcome,
    pub workdir: PathBuf,
    pub package_dir: PathBuf,
    /// Build log
    pub log: String,
    /// Warnings generated during the cook
    pub warnings: Vec<String>,
}

impl CookResult {
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }
}
