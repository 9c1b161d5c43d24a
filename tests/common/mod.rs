// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use cookbook::recipe::kitchen::runner::{CommandOutput, CommandRunner, Invocation};
use cookbook::{
    Arch, HostEnvironment, Kitchen, KitchenConfig, Os, Profile, Recipe, Result, Settings,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Hook = Box<dyn Fn(&Invocation) -> CommandOutput + Send + Sync>;

/// A runner that records every invocation instead of spawning it
///
/// The hook decides what each invocation "outputs" and may create files to
/// stand in for what a real generator or compiler would produce.
pub struct SpyRunner {
    calls: Mutex<Vec<Invocation>>,
    hook: Hook,
}

impl SpyRunner {
    pub fn new(hook: impl Fn(&Invocation) -> CommandOutput + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            hook: Box::new(hook),
        }
    }

    /// A runner where every command succeeds and builds produce `artifact`
    pub fn producing(artifact: &'static str) -> Self {
        Self::new(move |inv| {
            produce_on_build(inv, artifact);
            CommandOutput::success("")
        })
    }

    /// Builds produce `test_package`, which greets when run
    pub fn hello() -> Self {
        Self::new(|inv| {
            produce_on_build(inv, "test_package");
            if inv.program.ends_with("test_package") {
                CommandOutput::success("Hello from hello/1.0.0\n")
            } else {
                CommandOutput::success("")
            }
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations whose program is not a build tool
    pub fn artifact_runs(&self) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| !is_build_tool(&inv.program))
            .collect()
    }
}

impl CommandRunner for SpyRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok((self.hook)(invocation))
    }

    fn is_available(&self, _program: &str) -> bool {
        true
    }
}

pub fn is_build_tool(program: &str) -> bool {
    matches!(program, "cmake" | "meson" | "make" | "patch") || program.ends_with("/configure")
}

/// Create `artifact` in the build folder when `inv` is `cmake --build <dir>`
pub fn produce_on_build(inv: &Invocation, artifact: &str) {
    if inv.program == "cmake" && inv.args.first().map(String::as_str) == Some("--build") {
        if let Some(dir) = inv.args.get(1) {
            let path = Path::new(dir).join(artifact);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"\x7fELF").unwrap();
        }
    }
}

/// A recipe directory with a source tree and a CMake test consumer
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// Write `recipe.toml` plus `src/` and `test_package/` project stubs
    pub fn new(recipe: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("recipe.toml"), recipe).unwrap();

        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("CMakeLists.txt"),
            "cmake_minimum_required(VERSION 3.15)\nproject(hello C)\n",
        )
        .unwrap();
        fs::write(src.join("LICENSE"), "MIT License\n").unwrap();

        let consumer = dir.path().join("test_package");
        fs::create_dir_all(&consumer).unwrap();
        fs::write(
            consumer.join("CMakeLists.txt"),
            "cmake_minimum_required(VERSION 3.15)\nproject(test_package C)\n",
        )
        .unwrap();

        Self { dir }
    }

    pub fn recipe(&self) -> Recipe {
        cookbook::recipe::parse_recipe_file(&self.dir.path().join("recipe.toml")).unwrap()
    }

    pub fn workdir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn kitchen(&self, runner: Arc<dyn CommandRunner>) -> Kitchen {
        let config = KitchenConfig::default()
            .with_workdir(self.workdir())
            .with_jobs(2)
            .with_keep_workdir(true)
            .with_network(false);
        Kitchen::new(config).with_runner(runner)
    }
}

pub fn settings(os: Os, arch: Arch) -> Settings {
    Settings::new().with_os(os).with_arch(arch)
}

/// Host profile for a target
pub fn profile(os: Os, arch: Arch) -> Profile {
    Profile::new(settings(os, arch))
}

/// A Linux x86_64 build machine
pub fn linux_host() -> HostEnvironment {
    HostEnvironment::new(settings(Os::Linux, Arch::X86_64))
}

/// A recipe built with CMake and tested by running one consumer artifact
pub fn recipe_with_test(run: &str) -> String {
    format!(
        r#"
[package]
name = "hello"
version = "1.0.0"
description = "Hello library"
license = "MIT"

[source]
path = "src"

[options.shared]
values = [true, false]
default = false

[options.fPIC]
values = [true, false]
default = true

[[option_rules]]
remove = ["fPIC"]
when = {{ os = ["Windows"] }}

[[requires]]
reference = "zlib/1.3.1"

[build]
generator = "cmake"

[packaging]
licenses = ["LICENSE"]

[test]
project = "test_package"

{}
"#,
        run
    )
}
