// src/settings/profile.rs

//! Profiles: settings plus the knobs that travel with them
//!
//! A profile is a TOML file:
//!
//! ```toml
//! [settings]
//! os = "Linux"
//! arch = "armv8"
//! compiler = "gcc"
//! "compiler.version" = "12"
//! build_type = "Release"
//!
//! [options]
//! shared = true
//! "fmt:header_only" = true
//!
//! [conf]
//! can_run = false
//! allow_32_on_64 = false
//!
//! [runners]
//! armv8 = ["qemu-aarch64", "-L", "/usr/aarch64-linux-gnu"]
//!
//! [buildenv]
//! CFLAGS = "-pipe"
//!
//! [cross]
//! tool_prefix = "aarch64-linux-gnu-"
//! ```
//!
//! Every cook uses two profiles: the host profile describes the target and
//! the build profile describes the machine running the cook.

use super::{Arch, Settings};
use crate::error::{Error, Result};
use crate::options::OptionValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Execution overrides consumed by the capability probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConf {
    /// Force the answer of `can_execute`
    #[serde(default)]
    pub can_run: Option<bool>,
    /// Treat 32-bit targets as runnable on their 64-bit sibling
    #[serde(default)]
    pub allow_32_on_64: bool,
}

/// Cross toolchain naming
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrossConf {
    /// Prefix for cross tools, e.g. `aarch64-linux-gnu-`
    #[serde(default)]
    pub tool_prefix: Option<String>,
}

impl CrossConf {
    /// Environment variables naming the cross tools
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        if let Some(prefix) = &self.tool_prefix {
            for (var, tool) in [
                ("CC", "gcc"),
                ("CXX", "g++"),
                ("AR", "ar"),
                ("RANLIB", "ranlib"),
                ("STRIP", "strip"),
            ] {
                vars.insert(var.to_string(), format!("{}{}", prefix, tool));
            }
        }
        vars
    }
}

/// A parsed profile file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    #[serde(default)]
    pub conf: ProbeConf,
    #[serde(default)]
    pub runners: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub buildenv: BTreeMap<String, String>,
    #[serde(default)]
    pub cross: CrossConf,
}

impl Profile {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Profile describing the machine this process runs on
    pub fn detect() -> Self {
        Self::new(Settings::detect_host())
    }

    /// Parse a profile from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(content)
            .map_err(|e| Error::ParseError(format!("Invalid profile: {}", e)))?;
        profile.runner_map()?;
        Ok(profile)
    }

    /// Parse a profile from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read profile {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn with_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    pub fn with_runner(mut self, arch: Arch, command: Vec<String>) -> Self {
        self.runners.insert(arch.to_string(), command);
        self
    }

    pub fn with_conf(mut self, conf: ProbeConf) -> Self {
        self.conf = conf;
        self
    }

    /// Emulator runners keyed by architecture
    pub fn runner_map(&self) -> Result<BTreeMap<Arch, Vec<String>>> {
        let mut runners = BTreeMap::new();
        for (arch, command) in &self.runners {
            let arch: Arch = arch.parse()?;
            if command.is_empty() {
                return Err(Error::ParseError(format!(
                    "Runner for {} has an empty command",
                    arch
                )));
            }
            runners.insert(arch, command.clone());
        }
        Ok(runners)
    }

    /// Option overrides that apply to the named package
    ///
    /// Unscoped keys apply to every package; `pkg:option` keys only to
    /// `pkg`, and `*:option` to all. Scoped keys win over unscoped ones.
    pub fn options_for(&self, package: &str) -> BTreeMap<String, OptionValue> {
        let mut unscoped = BTreeMap::new();
        let mut scoped = BTreeMap::new();
        for (key, value) in &self.options {
            match key.split_once(':') {
                Some((pkg, option)) if pkg == package || pkg == "*" => {
                    scoped.insert(option.to_string(), value.clone());
                }
                Some((_, _)) => {}
                None => {
                    unscoped.insert(key.clone(), value.clone());
                }
            }
        }
        unscoped.extend(scoped);
        unscoped
    }

    /// Settings of this profile overlaid with `overrides`
    pub fn settings_with(&self, overrides: &Settings) -> Settings {
        let merged = self.settings.merged_with(overrides);
        if !merged.has_platform() {
            warn!("Profile settings are incomplete: {}", merged);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Os;

    const PROFILE: &str = r#"
[settings]
os = "Linux"
arch = "armv8"
build_type = "Release"

[options]
shared = true
"fmt:header_only" = true
"spdlog:shared" = false

[conf]
can_run = false

[runners]
armv8 = ["qemu-aarch64", "-L", "/usr/aarch64-linux-gnu"]

[cross]
tool_prefix = "aarch64-linux-gnu-"
"#;

    #[test]
    fn test_parse_profile() {
        let profile = Profile::parse(PROFILE).unwrap();
        assert_eq!(profile.settings.os, Some(Os::Linux));
        assert_eq!(profile.settings.arch, Some(Arch::Armv8));
        assert_eq!(profile.conf.can_run, Some(false));
        assert!(!profile.conf.allow_32_on_64);

        let runners = profile.runner_map().unwrap();
        assert_eq!(runners[&Arch::Armv8][0], "qemu-aarch64");
    }

    #[test]
    fn test_scoped_options() {
        let profile = Profile::parse(PROFILE).unwrap();

        let fmt = profile.options_for("fmt");
        assert_eq!(fmt.get("shared"), Some(&OptionValue::Bool(true)));
        assert_eq!(fmt.get("header_only"), Some(&OptionValue::Bool(true)));

        let spdlog = profile.options_for("spdlog");
        assert_eq!(spdlog.get("shared"), Some(&OptionValue::Bool(false)));
        assert!(spdlog.get("header_only").is_none());
    }

    #[test]
    fn test_cross_env() {
        let profile = Profile::parse(PROFILE).unwrap();
        let env = profile.cross.env_vars();
        assert_eq!(env["CC"], "aarch64-linux-gnu-gcc");
        assert_eq!(env["CXX"], "aarch64-linux-gnu-g++");
        assert!(CrossConf::default().env_vars().is_empty());
    }

    #[test]
    fn test_bad_runner_arch_rejected() {
        let err = Profile::parse("[runners]\nsparc = [\"qemu-sparc\"]").unwrap_err();
        assert!(err.to_string().contains("sparc"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(Profile::parse("[toolchain]\ncc = \"gcc\"").is_err());
    }
}
