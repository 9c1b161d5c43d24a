// src/commands/probe.rs

//! Probe command - what this machine can do for a target

use anyhow::Result;
use cookbook::recipe::probe::{self, ExecutionVerdict};

use super::load_profiles;

pub fn cmd_probe(profile: Option<&str>, build_profile: Option<&str>) -> Result<()> {
    let (profile, host) = load_profiles(profile, build_profile)?;
    let target = &profile.settings;

    println!("Target: {}", target);
    println!("Build machine: {}", host.settings);
    println!(
        "Cross building: {}",
        if probe::is_cross_building(target, &host) { "yes" } else { "no" }
    );

    match probe::can_configure(target, &host) {
        Ok(()) => println!("Can configure: yes"),
        Err(reason) => println!("Can configure: no ({})", reason),
    }

    match probe::execution_verdict(target, &host) {
        ExecutionVerdict::Native => println!("Can execute: yes"),
        ExecutionVerdict::Emulated(prefix) => {
            println!("Can execute: yes, through `{}`", prefix.join(" "))
        }
        ExecutionVerdict::Unavailable(reason) => println!("Can execute: no ({})", reason),
    }
    Ok(())
}
