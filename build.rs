// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: recipe file
fn recipe_arg() -> Arg {
    Arg::new("recipe").required(true).help("Path to the recipe file")
}

/// Common argument: host profile
fn profile_arg() -> Arg {
    Arg::new("profile")
        .short('p')
        .long("profile")
        .value_name("PATH")
        .help("Host profile: target settings, options and probe overrides")
}

fn build_profile_arg() -> Arg {
    Arg::new("build_profile")
        .long("build-profile")
        .value_name("PATH")
        .help("Build profile describing this machine (default: detected)")
}

fn option_arg() -> Arg {
    Arg::new("option")
        .short('o')
        .long("option")
        .value_name("NAME=VALUE")
        .action(ArgAction::Append)
        .help("Option override, e.g. -o shared=True (repeatable)")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print the result as JSON")
}

fn build_cli() -> Command {
    Command::new("cookbook")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Cookbook Contributors")
        .about("Declarative recipe lifecycle runner for C/C++ packages")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging (RUST_LOG overrides)"),
        )
        .subcommand(
            Command::new("cook")
                .about("Configure, build, package and test a recipe")
                .arg(recipe_arg())
                .arg(profile_arg())
                .arg(build_profile_arg())
                .arg(
                    Arg::new("index")
                        .long("index")
                        .value_name("PATH")
                        .help("Version index used to resolve requirement ranges"),
                )
                .arg(
                    Arg::new("workdir")
                        .long("workdir")
                        .value_name("PATH")
                        .help("Working directory (default: <temp>/cookbook/<name>-<version>)"),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help("Number of parallel build jobs (default: all cores)"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help("Timeout for each external command, in seconds"),
                )
                .arg(
                    Arg::new("keep_workdir")
                        .long("keep-workdir")
                        .action(ArgAction::SetTrue)
                        .help("Keep source and build folders after a successful cook"),
                )
                .arg(
                    Arg::new("offline")
                        .long("offline")
                        .action(ArgAction::SetTrue)
                        .help("Refuse to download sources over the network"),
                )
                .arg(option_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a recipe without building it")
                .arg(recipe_arg()),
        )
        .subcommand(
            Command::new("requirements")
                .about("Show the requirements a recipe declares for a profile")
                .arg(recipe_arg())
                .arg(profile_arg())
                .arg(option_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("probe")
                .about("Show whether this machine can configure and run a target")
                .arg(profile_arg())
                .arg(build_profile_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("cookbook.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
