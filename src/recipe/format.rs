// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files that describe how to fetch, configure, build,
//! package and smoke-test one C/C++ library. One engine interprets every
//! recipe; the file only carries data.

use crate::error::Result;
use crate::options::{OptionDef, Options};
use crate::recipe::condition::{Condition, ConditionContext};
use crate::settings::{Arch, Compiler, Os, Profile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// A complete recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Package metadata
    pub package: PackageSection,

    /// Where the sources come from
    #[serde(default)]
    pub source: Option<SourceSection>,

    /// Platforms the recipe supports
    #[serde(default)]
    pub settings: SettingsSection,

    /// Compiler and language-level requirements
    #[serde(default)]
    pub validate: ValidateSection,

    /// Option schema
    #[serde(default)]
    pub options: BTreeMap<String, OptionDef>,

    /// Options removed under some configurations (e.g. `fPIC` on Windows)
    #[serde(default)]
    pub option_rules: Vec<OptionRule>,

    /// Configurations the recipe refuses to build
    #[serde(default)]
    pub constraints: Vec<Constraint>,

    /// Runtime requirements
    #[serde(default)]
    pub requires: Vec<RequirementDecl>,

    /// Build-time tool requirements
    #[serde(default)]
    pub tool_requires: Vec<RequirementDecl>,

    /// Generator definitions
    #[serde(default)]
    pub generate: GenerateSection,

    /// Build system selection
    pub build: BuildSection,

    /// Packaging rules applied after install
    #[serde(default)]
    pub packaging: PackagingSection,

    /// Smoke test (optional; a recipe without one is build-only)
    #[serde(default)]
    pub test: Option<TestSection>,

    /// Variables for substitution (optional)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Directory containing the recipe file
    #[serde(skip)]
    pub root: PathBuf,
}

impl Recipe {
    /// Substitute variables in a string
    ///
    /// Replaces `%(name)s` patterns with their values from:
    /// 1. Built-in variables (`name`, `version`)
    /// 2. Custom variables from the [variables] section
    pub fn substitute(&self, template: &str) -> String {
        let mut result = template.to_string();

        result = result.replace("%(version)s", &self.package.version);
        result = result.replace("%(name)s", &self.package.name);

        for (key, value) in &self.variables {
            result = result.replace(&format!("%({})s", key), value);
        }

        result
    }

    /// `name/version`
    pub fn reference(&self) -> String {
        format!("{}/{}", self.package.name, self.package.version)
    }

    /// Get the archive URL with variables substituted
    pub fn archive_url(&self) -> Option<String> {
        self.source
            .as_ref()
            .and_then(|s| s.url.as_deref())
            .map(|url| self.substitute(url))
    }

    /// Get the archive filename from the URL
    pub fn archive_filename(&self) -> String {
        self.archive_url()
            .as_deref()
            .and_then(|url| url.split('/').next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("source.tar.gz")
            .to_string()
    }

    /// Whether the recipe declares a smoke test
    pub fn has_test(&self) -> bool {
        self.test.is_some()
    }

    /// Option values for one configuration
    ///
    /// Starts from the declared defaults, applies the profile's values for
    /// this package and then `name=value` overrides. Option rules are
    /// evaluated last against those final values, before anything that
    /// reads options.
    pub fn resolve_options(
        &self,
        profile: &Profile,
        overrides: &[String],
        cross_building: bool,
    ) -> Result<Options> {
        let mut options = Options::from_schema(&self.options)?;
        for (name, value) in profile.options_for(&self.package.name) {
            if options.contains(&name) {
                options.set(&name, value)?;
            } else {
                debug!("Profile option '{}' does not apply to {}", name, self.package.name);
            }
        }
        for assignment in overrides {
            options.set_assignment(assignment)?;
        }

        let mut removed = Vec::new();
        {
            let ctx = ConditionContext {
                settings: &profile.settings,
                options: &options,
                version: &self.package.version,
                cross_building,
            };
            for rule in &self.option_rules {
                if rule.when.holds(&ctx)? {
                    removed.extend(rule.remove.iter().cloned());
                }
            }
        }
        for name in &removed {
            debug!("Removing option {} for {}", name, profile.settings);
            options.remove(name)?;
        }
        Ok(options)
    }
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,

    /// License identifier (SPDX)
    #[serde(default)]
    pub license: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// Search topics
    #[serde(default)]
    pub topics: Vec<String>,

    /// What kind of artifact the package provides
    #[serde(default)]
    pub package_type: PackageType,
}

/// Kind of package
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    #[default]
    Library,
    StaticLibrary,
    SharedLibrary,
    HeaderLibrary,
    Application,
}

/// Source section
///
/// Exactly one of `path` and `url` must be given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    /// Source tree relative to the recipe directory
    #[serde(default)]
    pub path: Option<String>,

    /// Archive URL; supports `%(version)s` substitution
    #[serde(default)]
    pub url: Option<String>,

    /// Checksum for the archive (`sha256:...` or bare hex)
    #[serde(default)]
    pub sha256: Option<String>,

    /// Drop the single top-level directory of the archive
    #[serde(default)]
    pub strip_root: bool,

    /// Patches to apply after unpacking
    #[serde(default)]
    pub patches: Vec<PatchInfo>,
}

/// Information about a single patch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchInfo {
    /// Patch file relative to the recipe directory
    pub file: String,

    /// Strip level for patch (default: 1)
    #[serde(default = "default_strip")]
    pub strip: u32,

    /// Human-readable reason for the patch
    #[serde(default)]
    pub description: Option<String>,

    /// Apply only if the condition holds
    #[serde(default)]
    pub when: Condition,
}

fn default_strip() -> u32 {
    1
}

/// Platforms the recipe can be built for; empty lists allow everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsSection {
    #[serde(default)]
    pub os: Vec<Os>,
    #[serde(default)]
    pub arch: Vec<Arch>,
}

/// Validation rules checked during configure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateSection {
    /// Minimum C++ standard, e.g. "17"
    #[serde(default)]
    pub min_cppstd: Option<String>,

    /// Minimum compiler version per compiler
    #[serde(default)]
    pub compilers_minimum_version: BTreeMap<Compiler, String>,
}

/// Remove options that do not apply to a configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionRule {
    pub remove: Vec<String>,
    #[serde(default)]
    pub when: Condition,
}

/// A configuration the recipe refuses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Constraint {
    pub when: Condition,
    pub message: String,
}

/// A declared requirement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequirementDecl {
    /// `name/version` or `name/[range]`
    pub reference: String,

    /// Consumers also see this requirement's headers
    #[serde(default)]
    pub transitive_headers: bool,

    /// Consumers also link this requirement's libraries
    #[serde(default)]
    pub transitive_libs: bool,

    /// Declare only if the condition holds
    #[serde(default)]
    pub when: Condition,
}

/// A generator definition value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Definition {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Definition {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Definition {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Generator definitions section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateSection {
    /// Option name → definition name
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    /// Literal definitions
    #[serde(default)]
    pub definitions: BTreeMap<String, Definition>,

    /// Definitions applied when a condition holds
    #[serde(default)]
    pub conditional: Vec<ConditionalDefinitions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalDefinitions {
    pub when: Condition,
    pub definitions: BTreeMap<String, Definition>,
}

/// Native build system driven by the recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generator {
    Cmake,
    Meson,
    Autotools,
}

impl Generator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cmake => "cmake",
            Self::Meson => "meson",
            Self::Autotools => "autotools",
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build system section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Which generator drives the build
    pub generator: Generator,

    /// Subdirectory of the source tree holding the top-level build script
    #[serde(default)]
    pub subdir: Option<String>,

    /// Parallel jobs (defaults to the kitchen's setting)
    #[serde(default)]
    pub jobs: Option<u32>,

    /// Extra environment for every generator invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Packaging rules section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackagingSection {
    /// License files, relative to the source tree, copied to `licenses/`
    #[serde(default)]
    pub licenses: Vec<String>,

    /// Extra files copied into the package
    #[serde(default)]
    pub copy: Vec<CopyRule>,

    /// Paths removed from the package after install
    #[serde(default)]
    pub remove: Vec<String>,
}

/// Copy files matching a glob into the package
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyRule {
    /// Glob pattern relative to `src`, e.g. `*.h` or `**/*.hpp`
    pub pattern: String,

    /// Directory under the base folder to match in
    #[serde(default)]
    pub src: Option<String>,

    /// Destination directory inside the package
    pub dst: String,

    /// Which folder `src` is relative to
    #[serde(default)]
    pub from: CopyBase,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyBase {
    #[default]
    Source,
    Build,
}

/// Smoke test section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSection {
    /// Consumer project relative to the recipe directory
    #[serde(default)]
    pub project: Option<String>,

    /// Definitions for the consumer project
    #[serde(default)]
    pub definitions: BTreeMap<String, Definition>,

    /// Artifacts to execute
    #[serde(default)]
    pub run: Vec<TestRun>,

    /// Files that must exist in the test build folder after the runs
    #[serde(default)]
    pub files: Vec<ExpectedFile>,
}

/// One artifact execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestRun {
    /// Artifact path relative to its base folder
    pub artifact: String,

    /// Base folder; defaults to the test build folder when a consumer
    /// project exists and the package folder otherwise
    #[serde(default)]
    pub from: Option<ArtifactBase>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Run only if the condition holds
    #[serde(default)]
    pub when: Condition,

    #[serde(default)]
    pub expect: Expectation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBase {
    Test,
    Package,
}

/// What a run must produce
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    #[serde(default)]
    pub exit_code: i32,

    #[serde(default)]
    pub stream: OutputStream,

    /// Substrings that must all appear
    #[serde(default)]
    pub contains: Vec<String>,

    /// Exact output after trimming surrounding whitespace
    #[serde(default)]
    pub equals: Option<String>,

    /// Regular expression that must match somewhere in the output
    #[serde(default)]
    pub matches: Option<String>,
}

impl Expectation {
    /// Whether any content assertion is configured
    pub fn checks_content(&self) -> bool {
        !self.contains.is_empty() || self.equals.is_some() || self.matches.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    #[default]
    Stdout,
    Stderr,
    Both,
}

/// A generated file the test must leave behind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedFile {
    /// Path relative to the test build folder
    pub path: String,

    /// Which step writes the file
    #[serde(default)]
    pub from: FileOrigin,
}

/// The step that writes an expected test file
///
/// Files written by running artifacts cannot exist when the host is unable
/// to execute target binaries, so they are only checked after real runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    #[default]
    Run,
    Build,
}
