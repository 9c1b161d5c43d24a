// src/main.rs

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Cook {
            recipe,
            profile,
            build_profile,
            index,
            workdir,
            jobs,
            timeout,
            keep_workdir,
            offline,
            options,
            json,
        } => commands::cmd_cook(commands::CookArgs {
            recipe: &recipe,
            profile: profile.as_deref(),
            build_profile: build_profile.as_deref(),
            index: index.as_deref(),
            workdir: workdir.as_deref(),
            jobs,
            timeout,
            keep_workdir,
            offline,
            options: &options,
            json,
        }),
        Commands::Validate { recipe } => commands::cmd_validate(&recipe),
        Commands::Requirements {
            recipe,
            profile,
            options,
            json,
        } => commands::cmd_requirements(&recipe, profile.as_deref(), &options, json),
        Commands::Probe {
            profile,
            build_profile,
        } => commands::cmd_probe(profile.as_deref(), build_profile.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cook_options_repeat() {
        let cli = Cli::parse_from([
            "cookbook", "cook", "recipe.toml", "-o", "shared=True", "-o", "fPIC=False", "-j", "2",
        ]);
        match cli.command {
            Commands::Cook { options, jobs, .. } => {
                assert_eq!(options, vec!["shared=True", "fPIC=False"]);
                assert_eq!(jobs, Some(2));
            }
            _ => panic!("expected cook"),
        }
    }
}
