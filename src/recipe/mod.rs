// src/recipe/mod.rs

//! Recipe system for building C/C++ packages from source
//!
//! Recipes are data: one TOML file per package describing its sources,
//! options, requirements, generator definitions, packaging rules and smoke
//! test. A single engine interprets every recipe.
//!
//! # Culinary Terminology
//!
//! - **Recipe**: The build specification (like a recipe card)
//! - **Cook**: One configuration of one recipe moving through its lifecycle
//! - **Kitchen**: Owns the configuration, resolver and process runner
//! - **Prep**: Fetch, unpack and patch sources
//! - **Simmer**: Configure and compile with the native generator
//! - **Plate**: Install into the package folder
//!
//! # Lifecycle
//!
//! `declared → configured → built → tested`, driven through the entry
//! points `requirements`, `build_requirements`, `configure`, `layout`,
//! `generate`, `build`, `package` and `test`.
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "zlib"
//! version = "1.3.1"
//! license = "Zlib"
//!
//! [source]
//! url = "https://zlib.net/zlib-%(version)s.tar.gz"
//! sha256 = "9a93b2b7dfdac77ceba5a558a580e74667dd6fede4585b91eefb60f03b72df23"
//! strip_root = true
//!
//! [options.shared]
//! values = [true, false]
//! default = false
//!
//! [options.fPIC]
//! values = [true, false]
//! default = true
//!
//! [[option_rules]]
//! remove = ["fPIC"]
//! when = { os = ["Windows"] }
//!
//! [build]
//! generator = "cmake"
//!
//! [packaging]
//! licenses = ["LICENSE"]
//!
//! [test]
//! project = "test_package"
//!
//! [[test.run]]
//! artifact = "test_package"
//! ```

pub mod condition;
pub mod format;
pub mod kitchen;
pub mod lifecycle;
pub mod parser;
pub mod probe;
pub mod requirements;

pub use condition::{Condition, ConditionContext};
pub use format::{
    ArtifactBase, BuildSection, Constraint, CopyBase, CopyRule, Definition, ExpectedFile,
    Expectation, FileOrigin, GenerateSection, Generator, OutputStream, PackageSection,
    PackageType, PackagingSection, PatchInfo, Recipe, RequirementDecl, SourceSection, TestRun,
    TestSection,
};
pub use kitchen::{Cook, CookResult, Kitchen, KitchenConfig};
pub use lifecycle::{Lifecycle, Phase, RecipeState, drive};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
pub use probe::{HostEnvironment, can_configure, can_execute, runner_prefix};
pub use requirements::{
    IndexResolver, PinnedResolver, Requirement, RequirementKind, RequirementManifest,
    RequirementResolver, ResolvedRequirement,
};
