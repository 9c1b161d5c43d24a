// src/commands/mod.rs
//! Command handlers for the cookbook CLI

mod cook;
mod inspect;
mod probe;

pub use cook::{CookArgs, cmd_cook};
pub use inspect::{cmd_requirements, cmd_validate};
pub use probe::cmd_probe;

use anyhow::{Context, Result};
use cookbook::{HostEnvironment, Profile};
use std::path::Path;

/// Load the host profile and describe the build machine
///
/// Settings missing from the host profile are taken from the detected
/// machine, so an empty profile means "build for this machine".
pub(crate) fn load_profiles(
    profile: Option<&str>,
    build_profile: Option<&str>,
) -> Result<(Profile, HostEnvironment)> {
    let detected = Profile::detect();

    let mut host = match profile {
        Some(path) => Profile::from_file(Path::new(path))
            .with_context(|| format!("Failed to load profile: {}", path))?,
        None => Profile::default(),
    };
    host.settings = detected.settings_with(&host.settings);

    let build = match build_profile {
        Some(path) => {
            let mut build = Profile::from_file(Path::new(path))
                .with_context(|| format!("Failed to load build profile: {}", path))?;
            build.settings = detected.settings_with(&build.settings);
            build
        }
        None => detected,
    };

    let environment = HostEnvironment::from_profiles(&build, &host)
        .context("Invalid emulator runners in profile")?;
    Ok((host, environment))
}
