// src/recipe/kitchen/generator.rs

//! Build orchestration
//!
//! Maps (settings, options, recipe) to generator definitions and to the
//! exact configure/build/install invocations of one native build system.
//! Planning is pure: identical inputs give identical argument vectors, and
//! the plan is written to the build folder so a failed build can be
//! reproduced by hand.

use crate::error::{Error, Result};
use crate::options::OptionValue;
use crate::recipe::condition::ConditionContext;
use crate::recipe::format::{Definition, GenerateSection, Generator};
use crate::recipe::kitchen::layout::BuildContext;
use crate::recipe::kitchen::runner::{CommandOutput, CommandRunner, Invocation, run_checked};
use crate::recipe::probe;
use crate::settings::Settings;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the Meson machine file written for cross builds
pub const MESON_CROSS_FILE: &str = "cookbook-cross.ini";

impl Generator {
    /// Programs that must be on `PATH` to drive this generator
    pub fn required_tools(&self) -> &'static [&'static str] {
        match self {
            Self::Cmake => &["cmake"],
            Self::Meson => &["meson", "ninja"],
            Self::Autotools => &["make"],
        }
    }

    /// Render one definition as a command-line argument
    pub fn render(&self, key: &str, value: &Definition) -> String {
        match self {
            Self::Cmake => {
                let value = match value {
                    Definition::Bool(true) => "ON".to_string(),
                    Definition::Bool(false) => "OFF".to_string(),
                    other => other.to_string(),
                };
                format!("-D{}={}", key, value)
            }
            Self::Meson => format!("-D{}={}", key, value),
            Self::Autotools => match value {
                Definition::Bool(enabled) => {
                    if let Some(feature) = key.strip_prefix("with-") {
                        if *enabled {
                            format!("--with-{}", feature)
                        } else {
                            format!("--without-{}", feature)
                        }
                    } else {
                        let feature = key.strip_prefix("enable-").unwrap_or(key);
                        if *enabled {
                            format!("--enable-{}", feature)
                        } else {
                            format!("--disable-{}", feature)
                        }
                    }
                }
                other => format!("--{}={}", key, other),
            },
        }
    }
}

/// Definitions every recipe gets from its settings and standard options
fn builtin_definitions(
    generator: Generator,
    ctx: &ConditionContext<'_>,
) -> BTreeMap<String, Definition> {
    let mut defs = BTreeMap::new();
    let build_type = ctx.settings.build_type_or_default();
    let shared = ctx.options.get_bool("shared");
    let fpic = ctx.options.get_bool("fPIC");

    match generator {
        Generator::Cmake => {
            defs.insert("CMAKE_BUILD_TYPE".to_string(), build_type.as_str().into());
            if let Some(shared) = shared {
                defs.insert("BUILD_SHARED_LIBS".to_string(), shared.into());
            }
            if let Some(fpic) = fpic {
                defs.insert("CMAKE_POSITION_INDEPENDENT_CODE".to_string(), fpic.into());
            }
        }
        Generator::Meson => {
            defs.insert("buildtype".to_string(), build_type.meson_buildtype().into());
            if let Some(shared) = shared {
                let library = if shared { "shared" } else { "static" };
                defs.insert("default_library".to_string(), library.into());
            }
            if let Some(fpic) = fpic {
                defs.insert("b_staticpic".to_string(), fpic.into());
            }
        }
        Generator::Autotools => {
            if let Some(shared) = shared {
                defs.insert("enable-shared".to_string(), shared.into());
                defs.insert("enable-static".to_string(), (!shared).into());
            }
            if let Some(fpic) = fpic {
                defs.insert("with-pic".to_string(), fpic.into());
            }
        }
    }
    defs
}

/// Compute generator definitions for the current configuration
///
/// Later sources override earlier ones: built-ins, then option mappings,
/// then literal definitions, then conditional definitions in order.
pub fn compute_definitions(
    generator: Generator,
    section: &GenerateSection,
    ctx: &ConditionContext<'_>,
) -> Result<BTreeMap<String, Definition>> {
    let mut defs = builtin_definitions(generator, ctx);

    for (option, definition) in &section.options {
        if let Some(value) = ctx.options.get(option) {
            let value = match value {
                OptionValue::Bool(b) => Definition::Bool(*b),
                other => Definition::Str(other.to_string()),
            };
            defs.insert(definition.clone(), value);
        }
    }

    defs.extend(
        section.definitions
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    for conditional in &section.conditional {
        if conditional.when.holds(ctx)? {
            defs.extend(
                conditional
                    .definitions
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
    }

    Ok(defs)
}

/// Inputs to [`plan`]
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub generator: Generator,
    pub source_dir: &'a Path,
    pub build_dir: &'a Path,
    pub install_prefix: &'a Path,
    pub settings: &'a Settings,
    pub definitions: &'a BTreeMap<String, Definition>,
    pub cross_building: bool,
    pub jobs: u32,
    pub env: &'a BTreeMap<String, String>,
}

/// Exact invocations for one generator run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub generator: Generator,
    /// Definitions as passed, rendered for the generator
    pub definitions: Vec<String>,
    pub configure: Invocation,
    pub build: Invocation,
    pub install: Invocation,
    /// Files the plan needs written before configure (e.g. cross files)
    pub files: BTreeMap<PathBuf, String>,
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

/// Produce the invocations for a generator run
pub fn plan(request: &PlanRequest<'_>) -> BuildPlan {
    let mut definitions = request.definitions.clone();
    let mut files = BTreeMap::new();
    let mut env = request.env.clone();
    let build_type = request.settings.build_type_or_default();
    let jobs = request.jobs.max(1).to_string();
    let build_dir = path_str(request.build_dir);
    let prefix = path_str(request.install_prefix);

    let (configure, build, install) = match request.generator {
        Generator::Cmake => {
            definitions
                .entry("CMAKE_INSTALL_PREFIX".to_string())
                .or_insert_with(|| prefix.as_str().into());
            if request.cross_building {
                if let Some(os) = request.settings.os {
                    definitions
                        .entry("CMAKE_SYSTEM_NAME".to_string())
                        .or_insert_with(|| os.cmake_system_name().into());
                }
                if let Some(arch) = request.settings.arch {
                    definitions
                        .entry("CMAKE_SYSTEM_PROCESSOR".to_string())
                        .or_insert_with(|| arch.cmake_processor().into());
                }
            }
            let configure = Invocation::new("cmake", request.build_dir)
                .arg("-S")
                .arg(path_str(request.source_dir))
                .arg("-B")
                .arg(build_dir.as_str());
            let build = Invocation::new("cmake", request.build_dir).args([
                "--build",
                build_dir.as_str(),
                "--config",
                build_type.as_str(),
                "--parallel",
                jobs.as_str(),
            ]);
            let install = Invocation::new("cmake", request.build_dir).args([
                "--install",
                build_dir.as_str(),
                "--config",
                build_type.as_str(),
                "--prefix",
                prefix.as_str(),
            ]);
            (configure, build, install)
        }
        Generator::Meson => {
            let mut configure = Invocation::new("meson", request.build_dir)
                .arg("setup")
                .arg(build_dir.as_str())
                .arg(path_str(request.source_dir))
                .arg(format!("--prefix={}", prefix));
            if request.cross_building {
                let cross_file = request.build_dir.join(MESON_CROSS_FILE);
                files.insert(cross_file.clone(), meson_cross_file(request.settings, &env));
                configure = configure.arg("--cross-file").arg(path_str(&cross_file));
            }
            let build = Invocation::new("meson", request.build_dir).args([
                "compile",
                "-C",
                build_dir.as_str(),
                "-j",
                jobs.as_str(),
            ]);
            let install = Invocation::new("meson", request.build_dir).args([
                "install",
                "-C",
                build_dir.as_str(),
            ]);
            (configure, build, install)
        }
        Generator::Autotools => {
            for var in ["CFLAGS", "CXXFLAGS"] {
                env.entry(var.to_string())
                    .or_insert_with(|| build_type.c_flags().to_string());
            }
            let script = request.source_dir.join("configure");
            let mut configure = Invocation::new(path_str(&script), request.build_dir)
                .arg(format!("--prefix={}", prefix));
            if request.cross_building {
                if let Some(triple) = request.settings.gnu_triple() {
                    configure = configure.arg(format!("--host={}", triple));
                }
            }
            let build = Invocation::new("make", request.build_dir).arg(format!("-j{}", jobs));
            let install = Invocation::new("make", request.build_dir).arg("install");
            (configure, build, install)
        }
    };

    let rendered: Vec<String> = definitions
        .iter()
        .map(|(k, v)| request.generator.render(k, v))
        .collect();

    BuildPlan {
        generator: request.generator,
        configure: configure.args(rendered.iter().cloned()).envs(&env),
        build: build.envs(&env),
        install: install.envs(&env),
        definitions: rendered,
        files,
    }
}

/// Meson machine file describing the target
fn meson_cross_file(settings: &Settings, env: &BTreeMap<String, String>) -> String {
    let mut out = String::from("[binaries]\n");
    for (var, key) in [
        ("CC", "c"),
        ("CXX", "cpp"),
        ("AR", "ar"),
        ("STRIP", "strip"),
    ] {
        if let Some(tool) = env.get(var) {
            let _ = writeln!(out, "{} = '{}'", key, tool);
        }
    }

    out.push_str("\n[host_machine]\n");
    if let Some(os) = settings.os {
        let _ = writeln!(out, "system = '{}'", os.meson_system());
    }
    if let Some(arch) = settings.arch {
        let _ = writeln!(out, "cpu_family = '{}'", arch.meson_cpu_family());
        let _ = writeln!(out, "cpu = '{}'", arch.gnu_triple_cpu());
    }
    let endian = match settings.arch {
        Some(crate::settings::Arch::S390x) => "big",
        _ => "little",
    };
    let _ = writeln!(out, "endian = '{}'", endian);
    out
}

/// Write the plan and any files it needs into the build folder
pub fn write_plan(plan: &BuildPlan, path: &Path) -> Result<()> {
    for (file, content) in &plan.files {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(file, content)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", file.display(), e)))?;
    }

    let json = serde_json::to_string_pretty(plan)
        .map_err(|e| Error::IoError(format!("Failed to serialize build plan: {}", e)))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)
        .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
    debug!("Wrote build plan to {}", path.display());
    Ok(())
}

/// Refuse to build when the host cannot configure the target
pub fn check_buildable(
    ctx: &BuildContext<'_>,
    generator: Generator,
    runner: &dyn CommandRunner,
) -> Result<()> {
    probe::can_configure(ctx.settings, ctx.host).map_err(|reason| {
        Error::Configuration(format!("Cannot configure {}: {}", ctx.recipe.reference(), reason))
    })?;

    for tool in generator.required_tools() {
        if !runner.is_available(tool) {
            return Err(Error::Configuration(format!(
                "{} generator needs '{}', which was not found on PATH",
                generator, tool
            )));
        }
    }
    Ok(())
}

/// Outputs of a successful configure + build
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub configure: CommandOutput,
    pub build: CommandOutput,
}

/// Run the configure and build invocations of a plan
///
/// `phase` names the lifecycle phase reported by a failing invocation.
pub fn run_build(
    ctx: &BuildContext<'_>,
    plan: &BuildPlan,
    runner: &dyn CommandRunner,
    phase: &str,
    log: &mut String,
) -> Result<BuildResult> {
    check_buildable(ctx, plan.generator, runner)?;

    fs::create_dir_all(&plan.configure.cwd)?;
    info!("Configuring with {}", plan.generator);
    let configure = run_checked(runner, phase, &plan.configure, log)?;
    info!("Building with {} jobs", ctx.jobs);
    let build = run_checked(runner, phase, &plan.build, log)?;

    Ok(BuildResult { configure, build })
}

/// Run the install invocation of a plan into the package folder
pub fn run_install(
    plan: &BuildPlan,
    runner: &dyn CommandRunner,
    log: &mut String,
) -> Result<CommandOutput> {
    info!("Installing with {}", plan.generator);
    run_checked(runner, "package", &plan.install, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OptionDef, Options};
    use crate::settings::{Arch, BuildType, Os};

    fn options(shared: bool) -> Options {
        let mut schema = BTreeMap::new();
        schema.insert("shared".to_string(), OptionDef::boolean(shared));
        schema.insert("fPIC".to_string(), OptionDef::boolean(true));
        schema.insert("with_ssl".to_string(), OptionDef::boolean(true));
        Options::from_schema(&schema).unwrap()
    }

    fn generate_section() -> GenerateSection {
        toml::from_str(
            r#"
[options]
with_ssl = "FOO_WITH_SSL"

[definitions]
FOO_BUILD_TESTS = false
FOO_NAMESPACE = "foo"

[[conditional]]
when = { os = ["Windows"] }
definitions = { FOO_WINDOWS = true }
"#,
        )
        .unwrap()
    }

    fn linux() -> Settings {
        Settings::new()
            .with_os(Os::Linux)
            .with_arch(Arch::X86_64)
            .with_build_type(BuildType::Release)
    }

    #[test]
    fn test_cmake_definitions() {
        let settings = linux();
        let options = options(true);
        let ctx = ConditionContext {
            settings: &settings,
            options: &options,
            version: "1.0",
            cross_building: false,
        };
        let defs = compute_definitions(Generator::Cmake, &generate_section(), &ctx).unwrap();

        assert_eq!(defs["CMAKE_BUILD_TYPE"], Definition::Str("Release".to_string()));
        assert_eq!(defs["BUILD_SHARED_LIBS"], Definition::Bool(true));
        assert_eq!(defs["CMAKE_POSITION_INDEPENDENT_CODE"], Definition::Bool(true));
        assert_eq!(defs["FOO_WITH_SSL"], Definition::Bool(true));
        assert_eq!(defs["FOO_BUILD_TESTS"], Definition::Bool(false));
        assert!(!defs.contains_key("FOO_WINDOWS"));
    }

    #[test]
    fn test_conditional_definitions_apply() {
        let settings = linux().with_os(Os::Windows);
        let options = options(false);
        let ctx = ConditionContext {
            settings: &settings,
            options: &options,
            version: "1.0",
            cross_building: false,
        };
        let defs = compute_definitions(Generator::Cmake, &generate_section(), &ctx).unwrap();
        assert_eq!(defs["FOO_WINDOWS"], Definition::Bool(true));
        assert_eq!(defs["BUILD_SHARED_LIBS"], Definition::Bool(false));
    }

    #[test]
    fn test_rendering_per_generator() {
        let on = Definition::Bool(true);
        let off = Definition::Bool(false);
        assert_eq!(Generator::Cmake.render("BUILD_SHARED_LIBS", &on), "-DBUILD_SHARED_LIBS=ON");
        assert_eq!(Generator::Cmake.render("X", &off), "-DX=OFF");
        assert_eq!(Generator::Meson.render("tests", &off), "-Dtests=false");
        assert_eq!(Generator::Autotools.render("enable-shared", &on), "--enable-shared");
        assert_eq!(Generator::Autotools.render("threads", &off), "--disable-threads");
        assert_eq!(Generator::Autotools.render("with-pic", &off), "--without-pic");
        assert_eq!(
            Generator::Autotools.render("with-zlib", &"/opt/zlib".into()),
            "--with-zlib=/opt/zlib"
        );
    }

    fn request<'a>(
        generator: Generator,
        settings: &'a Settings,
        defs: &'a BTreeMap<String, Definition>,
        env: &'a BTreeMap<String, String>,
        cross_building: bool,
    ) -> PlanRequest<'a> {
        PlanRequest {
            generator,
            source_dir: Path::new("/work/source"),
            build_dir: Path::new("/work/build/Release"),
            install_prefix: Path::new("/work/package"),
            settings,
            definitions: defs,
            cross_building,
            jobs: 8,
            env,
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let settings = linux();
        let options = options(true);
        let ctx = ConditionContext {
            settings: &settings,
            options: &options,
            version: "1.0",
            cross_building: false,
        };
        let env = BTreeMap::new();

        let first_defs = compute_definitions(Generator::Cmake, &generate_section(), &ctx).unwrap();
        let second_defs = compute_definitions(Generator::Cmake, &generate_section(), &ctx).unwrap();
        assert_eq!(first_defs, second_defs);

        let first = plan(&request(Generator::Cmake, &settings, &first_defs, &env, false));
        let second = plan(&request(Generator::Cmake, &settings, &second_defs, &env, false));
        assert_eq!(first, second);
        assert_eq!(first.configure.args, second.configure.args);
    }

    #[test]
    fn test_cmake_plan() {
        let settings = linux();
        let mut defs = BTreeMap::new();
        defs.insert("BUILD_SHARED_LIBS".to_string(), Definition::Bool(false));
        let env = BTreeMap::new();
        let plan = plan(&request(Generator::Cmake, &settings, &defs, &env, false));

        assert_eq!(plan.configure.program, "cmake");
        assert_eq!(
            plan.configure.args,
            vec![
                "-S",
                "/work/source",
                "-B",
                "/work/build/Release",
                "-DBUILD_SHARED_LIBS=OFF",
                "-DCMAKE_INSTALL_PREFIX=/work/package",
            ]
        );
        assert_eq!(
            plan.build.args,
            vec!["--build", "/work/build/Release", "--config", "Release", "--parallel", "8"]
        );
        assert!(plan.install.args.contains(&"--install".to_string()));
        assert!(plan.files.is_empty());
    }

    #[test]
    fn test_cmake_cross_plan() {
        let settings = linux().with_arch(Arch::Armv8);
        let defs = BTreeMap::new();
        let env = BTreeMap::new();
        let plan = plan(&request(Generator::Cmake, &settings, &defs, &env, true));
        assert!(plan.configure.args.contains(&"-DCMAKE_SYSTEM_NAME=Linux".to_string()));
        assert!(plan.configure.args.contains(&"-DCMAKE_SYSTEM_PROCESSOR=aarch64".to_string()));
    }

    #[test]
    fn test_meson_cross_plan_writes_machine_file() {
        let settings = linux().with_arch(Arch::Armv8);
        let defs = BTreeMap::new();
        let mut env = BTreeMap::new();
        env.insert("CC".to_string(), "aarch64-linux-gnu-gcc".to_string());
        let plan = plan(&request(Generator::Meson, &settings, &defs, &env, true));

        let cross = PathBuf::from("/work/build/Release").join(MESON_CROSS_FILE);
        let content = &plan.files[&cross];
        assert!(content.contains("c = 'aarch64-linux-gnu-gcc'"));
        assert!(content.contains("cpu_family = 'aarch64'"));
        assert!(plan.configure.args.contains(&"--cross-file".to_string()));
    }

    #[test]
    fn test_autotools_plan() {
        let settings = linux().with_arch(Arch::Armv8);
        let mut defs = BTreeMap::new();
        defs.insert("enable-shared".to_string(), Definition::Bool(true));
        let env = BTreeMap::new();
        let plan = plan(&request(Generator::Autotools, &settings, &defs, &env, true));

        assert_eq!(plan.configure.program, "/work/source/configure");
        assert!(plan.configure.args.contains(&"--host=aarch64-linux-gnu".to_string()));
        assert!(plan.configure.args.contains(&"--enable-shared".to_string()));
        assert_eq!(plan.build.args, vec!["-j8"]);
        assert_eq!(plan.configure.env["CFLAGS"], "-O3 -DNDEBUG");
    }

    #[test]
    fn test_write_plan() {
        let dir = tempfile::tempdir().unwrap();
        let settings = linux();
        let defs = BTreeMap::new();
        let env = BTreeMap::new();
        let plan = plan(&request(Generator::Cmake, &settings, &defs, &env, false));
        let path = dir.path().join("build").join("cookbook-plan.json");
        write_plan(&plan, &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["generator"], "cmake");
        assert_eq!(json["configure"]["program"], "cmake");
    }
}
