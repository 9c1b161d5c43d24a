// src/recipe/condition.rs

//! `when` conditions
//!
//! Requirements, option rules, constraints, conditional definitions and
//! test runs can be gated on the current configuration:
//!
//! ```toml
//! [[requires]]
//! reference = "fmt/10.1.1"
//! when = { options = { use_fmt = true }, version = ">=1.12" }
//! ```
//!
//! Every clause present must hold; an empty condition always holds. A
//! clause that names a setting the current configuration leaves unset does
//! not hold.

use crate::error::Result;
use crate::options::{OptionValue, Options};
use crate::settings::{Arch, BuildType, Compiler, Os, Settings};
use crate::version::{PackageVersion, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration a condition is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub settings: &'a Settings,
    pub options: &'a Options,
    pub version: &'a str,
    pub cross_building: bool,
}

/// A conjunction of clauses over settings, options and the recipe version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<Os>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_os: Vec<Os>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<Arch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compiler: Vec<Compiler>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_type: Vec<BuildType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, OptionValue>,
    /// Range over the recipe's own version, e.g. `">=1.12 <2"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_building: Option<bool>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check that embedded version ranges parse
    pub fn validate(&self) -> Result<()> {
        if let Some(range) = &self.version {
            VersionRange::parse(range)?;
        }
        Ok(())
    }

    /// Evaluate the condition
    pub fn holds(&self, ctx: &ConditionContext<'_>) -> Result<bool> {
        let settings = ctx.settings;

        if !matches_list(&self.os, settings.os) {
            return Ok(false);
        }
        if let Some(os) = settings.os {
            if self.not_os.contains(&os) {
                return Ok(false);
            }
        }
        if !matches_list(&self.arch, settings.arch) {
            return Ok(false);
        }
        if !matches_list(&self.compiler, settings.compiler) {
            return Ok(false);
        }
        if !matches_list(&self.build_type, settings.build_type) {
            return Ok(false);
        }

        for (name, expected) in &self.options {
            match ctx.options.get(name) {
                Some(actual) if actual.matches(expected) => {}
                _ => return Ok(false),
            }
        }

        if let Some(range) = &self.version {
            let range = VersionRange::parse(range)?;
            let version = match PackageVersion::parse(ctx.version) {
                Ok(version) => version,
                Err(_) => return Ok(false),
            };
            if !range.satisfies(&version) {
                return Ok(false);
            }
        }

        if let Some(cross) = self.cross_building {
            if cross != ctx.cross_building {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

fn matches_list<T: PartialEq>(allowed: &[T], actual: Option<T>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match actual {
        Some(actual) => allowed.contains(&actual),
        None => false,
    }
}
