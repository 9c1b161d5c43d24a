// src/recipe/probe.rs

//! Capability probe
//!
//! Answers two questions about a target configuration relative to the
//! machine running the cook:
//!
//! - can a binary built for the target be *executed* here ([`can_execute`]),
//!   possibly through a registered emulator ([`runner_prefix`]);
//! - can a build for the target be *configured* here ([`can_configure`]).
//!
//! Every gate in the kitchen asks this module; no phase duplicates the
//! logic. Answers depend only on their inputs.

use crate::error::Result;
use crate::settings::{Arch, ArchFamily, Compiler, Os, ProbeConf, Profile, Settings};
use std::collections::BTreeMap;

/// The machine running the cook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    /// Build-machine settings (only os/arch are consulted)
    pub settings: Settings,
    /// Execution overrides
    pub conf: ProbeConf,
    /// Emulators able to run foreign binaries, keyed by target arch
    pub runners: BTreeMap<Arch, Vec<String>>,
}

impl HostEnvironment {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Host environment of the current process
    pub fn detect() -> Self {
        Self::new(Settings::detect_host())
    }

    /// Combine the build profile (machine) with the host profile (overrides)
    pub fn from_profiles(build: &Profile, host: &Profile) -> Result<Self> {
        let mut runners = build.runner_map()?;
        runners.extend(host.runner_map()?);
        Ok(Self {
            settings: build.settings.clone(),
            conf: host.conf.clone(),
            runners,
        })
    }

    pub fn with_conf(mut self, conf: ProbeConf) -> Self {
        self.conf = conf;
        self
    }

    pub fn with_runner(mut self, arch: Arch, command: Vec<String>) -> Self {
        self.runners.insert(arch, command);
        self
    }
}

/// Outcome of the probe, with the rule that decided it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionVerdict {
    /// Target binaries run natively
    Native,
    /// Target binaries run through an emulator
    Emulated(Vec<String>),
    /// Target binaries cannot run; the reason is for logs
    Unavailable(String),
}

impl ExecutionVerdict {
    pub fn can_execute(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

/// Whether `narrow` is the 32-bit sibling of `wide`
fn is_32_on_64(narrow: Arch, wide: Arch) -> bool {
    narrow.family() == wide.family()
        && narrow.bits() == 32
        && wide.bits() == 64
        && matches!(narrow.family(), ArchFamily::X86 | ArchFamily::Arm)
}

/// Decide whether target binaries can run on the host
pub fn execution_verdict(target: &Settings, host: &HostEnvironment) -> ExecutionVerdict {
    let (target_os, target_arch) = match (target.os, target.arch) {
        (Some(os), Some(arch)) => (os, arch),
        _ => return ExecutionVerdict::Unavailable("target os/arch is incomplete".to_string()),
    };
    let (host_os, host_arch) = match (host.settings.os, host.settings.arch) {
        (Some(os), Some(arch)) => (os, arch),
        _ => return ExecutionVerdict::Unavailable("host os/arch is unknown".to_string()),
    };

    if let Some(can_run) = host.conf.can_run {
        return if can_run {
            ExecutionVerdict::Native
        } else {
            ExecutionVerdict::Unavailable("conf.can_run is false".to_string())
        };
    }

    if target_os != host_os {
        return ExecutionVerdict::Unavailable(format!(
            "target os {} differs from host os {}",
            target_os, host_os
        ));
    }

    if target_arch == host_arch {
        return ExecutionVerdict::Native;
    }

    if is_32_on_64(target_arch, host_arch) && host.conf.allow_32_on_64 {
        return ExecutionVerdict::Native;
    }

    if let Some(runner) = host.runners.get(&target_arch) {
        return ExecutionVerdict::Emulated(runner.clone());
    }

    ExecutionVerdict::Unavailable(format!(
        "{} binaries cannot run on {} and no runner is registered",
        target_arch, host_arch
    ))
}

/// Whether target binaries can be executed on the host
pub fn can_execute(target: &Settings, host: &HostEnvironment) -> bool {
    execution_verdict(target, host).can_execute()
}

/// Emulator command to prepend to target binaries, if one is needed
pub fn runner_prefix(target: &Settings, host: &HostEnvironment) -> Option<Vec<String>> {
    match execution_verdict(target, host) {
        ExecutionVerdict::Emulated(prefix) => Some(prefix),
        _ => None,
    }
}

/// Whether the target differs from the build machine
///
/// A 32-bit target on its 64-bit sibling is not cross building when
/// `allow_32_on_64` is set. Incomplete settings are treated as native.
pub fn is_cross_building(target: &Settings, host: &HostEnvironment) -> bool {
    let (Some(target_os), Some(target_arch)) = (target.os, target.arch) else {
        return false;
    };
    let (Some(host_os), Some(host_arch)) = (host.settings.os, host.settings.arch) else {
        return false;
    };

    if target_os != host_os {
        return true;
    }
    if target_arch == host_arch {
        return false;
    }
    !(host.conf.allow_32_on_64 && is_32_on_64(target_arch, host_arch))
}

/// Whether a build for the target can be configured on the host
pub fn can_configure(target: &Settings, host: &HostEnvironment) -> std::result::Result<(), String> {
    if !target.has_platform() {
        return Err(format!("target settings are incomplete ({})", target));
    }
    let host_os = host
        .settings
        .os
        .ok_or_else(|| "host operating system is unknown".to_string())?;

    match target.compiler {
        Some(compiler @ Compiler::Msvc) if host_os != Os::Windows => Err(format!(
            "compiler {} requires a Windows build machine, not {}",
            compiler, host_os
        )),
        Some(compiler @ Compiler::AppleClang) if host_os != Os::Macos => {
            Err(format!(
                "compiler {} requires a Macos build machine, not {}",
                compiler, host_os
            ))
        }
        _ => Ok(()),
    }
}
