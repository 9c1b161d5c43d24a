// src/recipe/kitchen/tester.rs

//! Smoke testing of a built package
//!
//! The test phase optionally builds a small consumer project against the
//! package folder, then runs the declared artifacts. Whether artifacts run
//! at all is decided by [`probe::execution_verdict`]: when the host cannot
//! execute target binaries, each artifact is only checked for existence and
//! the skip is logged. A recipe without a `[test]` section is build-only.

use crate::error::{Error, Result};
use crate::recipe::format::{
    ArtifactBase, Definition, Expectation, FileOrigin, Generator, OutputStream, TestRun,
    TestSection,
};
use crate::recipe::kitchen::generator::{self, PlanRequest};
use crate::recipe::kitchen::layout::{BuildContext, Layout, resolve_inside};
use crate::recipe::kitchen::runner::{CommandOutput, CommandRunner, Invocation};
use crate::recipe::probe::{self, ExecutionVerdict};
use crate::settings::Os;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Skip reason reported for build-only recipes
pub const NO_TEST_REASON: &str = "recipe declares no test";

/// One artifact, executed or only verified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub artifact: String,
    pub path: PathBuf,
    /// Command line, when the artifact was spawned
    pub command: Option<String>,
    pub executed: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub passed: bool,
}

/// Result of the test phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub passed: bool,
    /// Whether any artifact was actually spawned
    pub executed: bool,
    pub skip_reason: Option<String>,
    pub runs: Vec<RunRecord>,
    /// Artifacts and generated files whose existence was checked
    pub verified_paths: Vec<PathBuf>,
}

impl TestOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

struct Failure {
    artifact: String,
    command: String,
    reason: String,
    output: String,
}

/// Check a finished run against its expectation
pub fn check_output(expect: &Expectation, output: &CommandOutput) -> std::result::Result<(), String> {
    if output.timed_out {
        return Err("timed out".to_string());
    }
    match output.exit_code {
        Some(code) if code == expect.exit_code => {}
        Some(code) => {
            return Err(format!(
                "exited with {} (expected {})",
                code, expect.exit_code
            ));
        }
        None => return Err("was terminated by a signal".to_string()),
    }

    if !expect.checks_content() {
        return Ok(());
    }

    let text = match expect.stream {
        OutputStream::Stdout => output.stdout.clone(),
        OutputStream::Stderr => output.stderr.clone(),
        OutputStream::Both => format!("{}{}", output.stdout, output.stderr),
    };

    for needle in &expect.contains {
        if !text.contains(needle.as_str()) {
            return Err(format!("output does not contain '{}'", needle));
        }
    }
    if let Some(expected) = &expect.equals {
        if text.trim() != expected.trim() {
            return Err(format!(
                "output '{}' does not equal '{}'",
                text.trim(),
                expected.trim()
            ));
        }
    }
    if let Some(pattern) = &expect.matches {
        let re = Regex::new(pattern).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
        if !re.is_match(&text) {
            return Err(format!("output does not match /{}/", pattern));
        }
    }
    Ok(())
}

/// Path of an artifact, trying the `.exe` suffix for Windows targets
fn locate_artifact(base: &Path, artifact: &str, os: Option<Os>) -> Result<PathBuf> {
    let path = resolve_inside(base, artifact)?;
    if os == Some(Os::Windows) && path.extension().is_none() && !path.exists() {
        let exe = path.with_extension("exe");
        if exe.exists() {
            return Ok(exe);
        }
    }
    Ok(path)
}

fn artifact_base<'a>(layout: &'a Layout, test: &TestSection, run: &TestRun) -> &'a Path {
    let base = run.from.unwrap_or(if test.project.is_some() {
        ArtifactBase::Test
    } else {
        ArtifactBase::Package
    });
    match base {
        ArtifactBase::Test => &layout.test_build,
        ArtifactBase::Package => &layout.package,
    }
}

/// Environment that lets artifacts find the package's shared libraries
fn runtime_env(ctx: &BuildContext<'_>, run: &TestRun) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    let os = ctx.settings.os.unwrap_or(Os::Linux);
    let var = os.library_path_var();
    let lib_dir = if os == Os::Windows {
        ctx.layout.package.join("bin")
    } else {
        ctx.layout.package.join("lib")
    };

    let mut paths = vec![lib_dir];
    if let Some(existing) = std::env::var_os(var) {
        paths.extend(std::env::split_paths(&existing));
    }
    if let Ok(joined) = std::env::join_paths(paths) {
        env.insert(var.to_string(), joined.to_string_lossy().into_owned());
    }

    env.extend(run.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Configure and build the test consumer project against the package
fn build_consumer(
    ctx: &BuildContext<'_>,
    test: &TestSection,
    project: &str,
    runner: &dyn CommandRunner,
    log: &mut String,
) -> Result<()> {
    let source_dir = resolve_inside(&ctx.recipe.root, project)?;
    if !source_dir.is_dir() {
        return Err(Error::NotFound(format!(
            "Test project {} does not exist",
            source_dir.display()
        )));
    }

    let layout = ctx.layout;
    let package = layout.package.display().to_string();
    let build_system = ctx.recipe.build.generator;
    let mut definitions = test.definitions.clone();
    let mut env = ctx.env.clone();

    match build_system {
        Generator::Cmake => {
            definitions
                .entry("CMAKE_PREFIX_PATH".to_string())
                .or_insert_with(|| Definition::Str(package.clone()));
            definitions
                .entry("CMAKE_BUILD_TYPE".to_string())
                .or_insert_with(|| ctx.build_type().as_str().into());
        }
        Generator::Meson => {
            definitions
                .entry("buildtype".to_string())
                .or_insert_with(|| ctx.build_type().meson_buildtype().into());
        }
        Generator::Autotools => {
            env.entry("CPPFLAGS".to_string())
                .or_insert_with(|| format!("-I{}/include", package));
            env.entry("LDFLAGS".to_string())
                .or_insert_with(|| format!("-L{}/lib", package));
        }
    }
    env.entry("PKG_CONFIG_PATH".to_string())
        .or_insert_with(|| format!("{}/lib/pkgconfig", package));

    let install_prefix = layout.test_build.join("install");
    let plan = generator::plan(&PlanRequest {
        generator: build_system,
        source_dir: &source_dir,
        build_dir: &layout.test_build,
        install_prefix: &install_prefix,
        settings: ctx.settings,
        definitions: &definitions,
        cross_building: ctx.cross_building,
        jobs: ctx.jobs,
        env: &env,
    });
    generator::write_plan(&plan, &layout.test_build.join(Layout::PLAN_FILE))?;

    info!("Building test project {}", project);
    generator::run_build(ctx, &plan, runner, "test", log)?;
    Ok(())
}

/// Run the recipe's smoke test
pub fn run_test(
    ctx: &BuildContext<'_>,
    runner: &dyn CommandRunner,
    log: &mut String,
) -> Result<TestOutcome> {
    let Some(test) = ctx.recipe.test.as_ref() else {
        info!("{}: {}, build-only", ctx.recipe.reference(), NO_TEST_REASON);
        return Ok(TestOutcome::skipped(NO_TEST_REASON));
    };

    if let Some(project) = &test.project {
        build_consumer(ctx, test, project, runner, log)?;
    }

    let conditions = ctx.condition_context();
    let verdict = probe::execution_verdict(ctx.settings, ctx.host);
    let mut outcome = TestOutcome::default();
    let mut failures = Vec::new();

    if let ExecutionVerdict::Unavailable(reason) = &verdict {
        info!(
            "Host cannot execute {} binaries ({}); verifying artifacts only",
            ctx.settings, reason
        );
        outcome.skip_reason = Some(format!("host cannot execute target: {}", reason));
    }

    for run in &test.run {
        if !run.when.holds(&conditions)? {
            debug!("Skipping {}: condition does not hold", run.artifact);
            continue;
        }

        let base = artifact_base(ctx.layout, test, run);
        let path = locate_artifact(base, &run.artifact, ctx.settings.os)?;
        let mut record = RunRecord {
            artifact: run.artifact.clone(),
            path: path.clone(),
            command: None,
            executed: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            passed: false,
        };

        if !path.is_file() {
            failures.push(Failure {
                artifact: run.artifact.clone(),
                command: String::new(),
                reason: format!("artifact {} was not produced", path.display()),
                output: String::new(),
            });
            outcome.runs.push(record);
            continue;
        }

        let prefix = match &verdict {
            ExecutionVerdict::Unavailable(_) => {
                info!("Verified {} exists; not executing", path.display());
                outcome.verified_paths.push(path);
                record.passed = true;
                outcome.runs.push(record);
                continue;
            }
            ExecutionVerdict::Emulated(prefix) => prefix.clone(),
            ExecutionVerdict::Native => Vec::new(),
        };

        let artifact = path.display().to_string();
        let invocation = match prefix.split_first() {
            Some((program, rest)) => Invocation::new(program.clone(), &ctx.layout.test_build)
                .args(rest.iter().cloned())
                .arg(artifact),
            None => Invocation::new(artifact, &ctx.layout.test_build),
        }
        .args(run.args.iter().cloned())
        .envs(&runtime_env(ctx, run));

        let command = invocation.command_line();
        info!("Running {}", command);
        log.push_str(&format!("$ {}\n", command));
        record.command = Some(command.clone());

        let output = match runner.run(&invocation) {
            Ok(output) => output,
            Err(e) => {
                failures.push(Failure {
                    artifact: run.artifact.clone(),
                    command,
                    reason: format!("failed to start: {}", e),
                    output: String::new(),
                });
                outcome.runs.push(record);
                continue;
            }
        };
        log.push_str(&output.stdout);
        log.push_str(&output.stderr);

        outcome.executed = true;
        record.executed = true;
        record.exit_code = output.exit_code;
        record.stdout = output.stdout.clone();
        record.stderr = output.stderr.clone();

        match check_output(&run.expect, &output) {
            Ok(()) => record.passed = true,
            Err(reason) => {
                warn!("{} {}", run.artifact, reason);
                failures.push(Failure {
                    artifact: run.artifact.clone(),
                    command,
                    reason,
                    output: output.excerpt(),
                });
            }
        }
        outcome.runs.push(record);
    }

    let mut unchecked = 0;
    for file in &test.files {
        let path = resolve_inside(&ctx.layout.test_build, &file.path)?;
        if file.from == FileOrigin::Run && matches!(verdict, ExecutionVerdict::Unavailable(_)) {
            debug!("Not checking {}: no artifact was executed", path.display());
            unchecked += 1;
            continue;
        }
        if path.exists() {
            outcome.verified_paths.push(path);
        } else {
            failures.push(Failure {
                artifact: file.path.clone(),
                command: String::new(),
                reason: format!("expected file {} was not generated", path.display()),
                output: String::new(),
            });
        }
    }

    if unchecked > 0 {
        if let Some(reason) = outcome.skip_reason.as_mut() {
            reason.push_str(&format!(
                "; {} expected file(s) written by artifact runs not checked",
                unchecked
            ));
        }
    }

    if !failures.is_empty() {
        return Err(aggregate(failures));
    }

    outcome.passed = true;
    Ok(outcome)
}

fn join_nonempty<'a>(parts: impl Iterator<Item = &'a str>, sep: &str) -> String {
    parts.filter(|s| !s.is_empty()).collect::<Vec<_>>().join(sep)
}

/// Fold every failed check into one error
fn aggregate(failures: Vec<Failure>) -> Error {
    let reason = failures
        .iter()
        .map(|f| format!("{}: {}", f.artifact, f.reason))
        .collect::<Vec<_>>()
        .join("; ");

    Error::TestAssertion {
        artifact: join_nonempty(failures.iter().map(|f| f.artifact.as_str()), ", "),
        command: join_nonempty(failures.iter().map(|f| f.command.as_str()), "; "),
        reason: format!("{} of the test checks failed: {}", failures.len(), reason),
        output: join_nonempty(failures.iter().map(|f| f.output.as_str()), "\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect(toml_src: &str) -> Expectation {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_exit_code_only() {
        let e = Expectation::default();
        assert!(check_output(&e, &CommandOutput::success("anything")).is_ok());
        let err = check_output(&e, &CommandOutput::exited(1, "", "")).unwrap_err();
        assert!(err.contains("exited with 1"));
    }

    #[test]
    fn test_expected_nonzero_exit() {
        let e = expect("exit_code = 2");
        assert!(check_output(&e, &CommandOutput::exited(2, "", "")).is_ok());
        assert!(check_output(&e, &CommandOutput::success("")).is_err());
    }

    #[test]
    fn test_contains_rejects_missing_substring() {
        let e = expect(r#"contains = ["1764"]"#);
        assert!(check_output(&e, &CommandOutput::success("42 squared is 1764\n")).is_ok());
        let err = check_output(&e, &CommandOutput::success("42 squared is 1700\n")).unwrap_err();
        assert!(err.contains("1764"));
    }

    #[test]
    fn test_stream_selection() {
        let e = expect(
            r#"
stream = "stderr"
contains = ["warning"]
"#,
        );
        assert!(check_output(&e, &CommandOutput::exited(0, "warning", "")).is_err());
        assert!(check_output(&e, &CommandOutput::exited(0, "", "warning")).is_ok());

        let both = expect(
            r#"
stream = "both"
contains = ["out", "err"]
"#,
        );
        assert!(check_output(&both, &CommandOutput::exited(0, "out", "err")).is_ok());
    }

    #[test]
    fn test_equals_and_matches() {
        let e = expect(r#"equals = "1.3.1""#);
        assert!(check_output(&e, &CommandOutput::success("1.3.1\n")).is_ok());
        assert!(check_output(&e, &CommandOutput::success("1.3.10\n")).is_err());

        let e = expect(r#"matches = '^zlib \d+\.\d+'"#);
        assert!(check_output(&e, &CommandOutput::success("zlib 1.3")).is_ok());
        assert!(check_output(&e, &CommandOutput::success("libz 1.3")).is_err());
    }

    #[test]
    fn test_timeout_fails() {
        let output = CommandOutput {
            timed_out: true,
            ..CommandOutput::default()
        };
        assert_eq!(
            check_output(&Expectation::default(), &output).unwrap_err(),
            "timed out"
        );
    }

    #[test]
    fn test_locate_windows_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("example.exe"), b"MZ").unwrap();

        let found = locate_artifact(dir.path(), "example", Some(Os::Windows)).unwrap();
        assert_eq!(found, dir.path().join("example.exe"));

        let linux = locate_artifact(dir.path(), "example", Some(Os::Linux)).unwrap();
        assert_eq!(linux, dir.path().join("example"));

        assert!(locate_artifact(dir.path(), "../escape", Some(Os::Linux)).is_err());
    }

    #[test]
    fn test_aggregate_reports_every_failure() {
        let err = aggregate(vec![
            Failure {
                artifact: "a".to_string(),
                command: "./a".to_string(),
                reason: "exited with 1 (expected 0)".to_string(),
                output: "boom".to_string(),
            },
            Failure {
                artifact: "b".to_string(),
                command: String::new(),
                reason: "artifact b was not produced".to_string(),
                output: String::new(),
            },
        ]);
        match err {
            Error::TestAssertion {
                artifact,
                command,
                reason,
                output,
            } => {
                assert_eq!(artifact, "a, b");
                assert_eq!(command, "./a");
                assert!(reason.starts_with("2 of the test checks failed"));
                assert!(output.contains("boom"));
            }
            other => panic!("expected test assertion, got {:?}", other),
        }
    }
}
