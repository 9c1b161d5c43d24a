// src/lib.rs

//! Cookbook: declarative recipes for C/C++ packages
//!
//! A recipe describes how one library is configured, built, packaged and
//! smoke-tested; the engine interprets it against a profile (settings and
//! options) and the capabilities of the build machine.
//!
//! # Architecture
//!
//! - Settings and options: the configuration space a recipe is built for
//! - Capability probe: one place that decides whether target binaries can
//!   run here, so cross builds verify artifacts instead of executing them
//! - Kitchen: drives the lifecycle `declared → configured → built → tested`
//!   through CMake, Meson or Autotools

mod error;
pub mod hash;
pub mod options;
pub mod recipe;
pub mod settings;
pub mod version;

pub use error::{Error, Result};
pub use options::{OptionValue, Options};
pub use recipe::{Cook, CookResult, HostEnvironment, Kitchen, KitchenConfig, Recipe, RecipeState};
pub use settings::{Arch, BuildType, Compiler, Os, Profile, Settings};
