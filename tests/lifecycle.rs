// tests/lifecycle.rs

//! End-to-end cooks driven through a recording runner.

mod common;

use common::{Fixture, SpyRunner, linux_host, profile, recipe_with_test};
use cookbook::recipe::drive;
use cookbook::recipe::kitchen::layout::Layout;
use cookbook::recipe::kitchen::runner::{CommandOutput, CommandRunner};
use cookbook::settings::ProbeConf;
use cookbook::{Arch, Compiler, Error, Os, Profile, RecipeState};
use std::fs;
use std::sync::Arc;

const RUN_TEST_PACKAGE: &str = r#"
[[test.run]]
artifact = "test_package"
expect = { contains = ["Hello"] }
"#;

#[test]
fn test_native_cook_runs_the_test_artifact() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::hello());
    let kitchen = fixture.kitchen(spy.clone());

    let result = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap();

    assert_eq!(result.state, RecipeState::Tested);
    assert!(result.test.passed);
    assert!(result.test.executed);
    assert!(result.test.skip_reason.is_none());
    assert_eq!(result.test.runs.len(), 1);
    assert!(result.test.runs[0].stdout.contains("Hello"));

    let runs = spy.artifact_runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].program.ends_with("test_package"));
    assert!(
        runs[0]
            .env
            .get("LD_LIBRARY_PATH")
            .is_some_and(|path| path.contains("package"))
    );

    assert_eq!(result.resolved.runtime.len(), 1);
    assert_eq!(result.resolved.runtime[0].name, "zlib");
    assert_eq!(result.resolved.runtime[0].version, "1.3.1");

    let manifest = result.package.as_ref().unwrap();
    assert_eq!(manifest.options.get("fPIC").map(String::as_str), Some("true"));
    assert!(result.package_dir.join(Layout::MANIFEST_FILE).is_file());
    assert!(result.package_dir.join("licenses/LICENSE").is_file());
}

#[test]
fn test_cross_cook_verifies_artifacts_without_running_them() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::producing("test_package.exe"));
    let kitchen = fixture.kitchen(spy.clone());

    let result = kitchen
        .cook(&recipe, &profile(Os::Windows, Arch::Armv8), &linux_host(), &[])
        .unwrap();

    assert_eq!(result.state, RecipeState::Tested);
    assert!(result.test.passed);
    assert!(!result.test.executed);
    assert!(result.test.skip_reason.is_some());
    assert_eq!(result.test.verified_paths.len(), 1);
    assert!(result.test.verified_paths[0].ends_with("test_package.exe"));
    assert!(spy.artifact_runs().is_empty());

    // fPIC does not apply to Windows
    let manifest = result.package.as_ref().unwrap();
    assert!(!manifest.options.contains_key("fPIC"));

    let plan = result.plan.as_ref().unwrap();
    assert!(
        plan.configure
            .args
            .contains(&"-DCMAKE_SYSTEM_NAME=Windows".to_string())
    );
}

#[test]
fn test_missing_artifact_fails_even_when_not_executable() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let kitchen = fixture.kitchen(Arc::new(SpyRunner::new(|_| CommandOutput::success(""))));

    let err = kitchen
        .cook(&recipe, &profile(Os::Windows, Arch::Armv8), &linux_host(), &[])
        .unwrap_err();

    assert!(err.is_test_assertion());
    assert_eq!(err.phase(), "test");
    assert!(err.to_string().contains("was not produced"));
}

#[test]
fn test_artifact_arguments_and_exact_output() {
    let run = r#"
[[test.run]]
artifact = "square"
args = ["42"]
expect = { equals = "1764" }
"#;
    let fixture = Fixture::new(&recipe_with_test(run));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::new(|inv| {
        common::produce_on_build(inv, "square");
        if inv.program.ends_with("square") {
            let n: i64 = inv.args[0].parse().unwrap();
            CommandOutput::success(format!("{}\n", n * n))
        } else {
            CommandOutput::success("")
        }
    }));
    let kitchen = fixture.kitchen(spy.clone());

    let result = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap();

    assert!(result.test.passed);
    let runs = spy.artifact_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].args, vec!["42".to_string()]);
    assert_eq!(result.test.runs[0].stdout.trim(), "1764");
}

#[test]
fn test_wrong_output_is_a_test_assertion() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let kitchen = fixture.kitchen(Arc::new(SpyRunner::new(|inv| {
        common::produce_on_build(inv, "test_package");
        if inv.program.ends_with("test_package") {
            CommandOutput::success("Goodbye\n")
        } else {
            CommandOutput::success("")
        }
    })));

    let err = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap_err();

    match err {
        Error::TestAssertion {
            artifact,
            reason,
            output,
            ..
        } => {
            assert_eq!(artifact, "test_package");
            assert!(reason.contains("Hello"));
            assert!(output.contains("Goodbye"));
        }
        other => panic!("expected test assertion, got {:?}", other),
    }
}

#[test]
fn test_generator_failure_stops_before_tested() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::new(|inv| {
        if inv.program == "cmake" && inv.args.first().map(String::as_str) == Some("-S") {
            CommandOutput::exited(1, "", "CMake Error: could not find compiler")
        } else {
            CommandOutput::success("")
        }
    }));
    let kitchen = fixture.kitchen(spy.clone());
    let target = profile(Os::Linux, Arch::X86_64);
    let host = linux_host();

    let mut cook = kitchen.prepare(&recipe, &target, &host, &[]).unwrap();
    let err = drive(&mut cook).unwrap_err();

    assert!(err.is_build());
    assert_eq!(err.phase(), "build");
    assert!(err.to_string().contains("could not find compiler"));
    assert_eq!(cook.state(), RecipeState::Configured);
    assert!(cook.test_outcome().is_none());
    assert!(spy.artifact_runs().is_empty());
    drop(cook);

    let err = kitchen.cook(&recipe, &target, &host, &[]).unwrap_err();
    assert!(err.is_build());
}

#[test]
fn test_can_run_false_never_spawns_artifacts() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::producing("test_package"));
    let kitchen = fixture.kitchen(spy.clone());
    let host = linux_host().with_conf(ProbeConf {
        can_run: Some(false),
        allow_32_on_64: false,
    });

    let result = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &host, &[])
        .unwrap();

    assert!(result.test.passed);
    assert!(!result.test.executed);
    assert!(spy.artifact_runs().is_empty());
}

#[test]
fn test_emulated_target_runs_through_runner() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::new(|inv| {
        common::produce_on_build(inv, "test_package");
        if inv.program == "qemu-aarch64" {
            CommandOutput::success("Hello\n")
        } else {
            CommandOutput::success("")
        }
    }));
    let kitchen = fixture.kitchen(spy.clone());
    let host = linux_host().with_runner(Arch::Armv8, vec!["qemu-aarch64".to_string()]);

    let result = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::Armv8), &host, &[])
        .unwrap();

    assert!(result.test.executed);
    let runs = spy.artifact_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].program, "qemu-aarch64");
    assert!(runs[0].args[0].ends_with("test_package"));
}

#[test]
fn test_recipe_without_test_is_build_only() {
    let recipe_src = recipe_with_test("").replace("[test]\nproject = \"test_package\"", "");
    let fixture = Fixture::new(&recipe_src);
    let recipe = fixture.recipe();
    assert!(!recipe.has_test());

    let spy = Arc::new(SpyRunner::new(|_| CommandOutput::success("")));
    let kitchen = fixture.kitchen(spy.clone());
    let result = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap();

    assert_eq!(result.state, RecipeState::Tested);
    assert!(result.test.passed);
    assert!(!result.test.executed);
    assert!(result.test.skip_reason.is_some());
    assert!(result.warnings.iter().any(|w| w.contains("build-only")));
}

#[test]
fn test_build_plan_is_deterministic() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let target = profile(Os::Linux, Arch::X86_64);
    let host = linux_host();
    let overrides = ["shared=True".to_string()];

    let plan_json = || {
        let spy: Arc<dyn CommandRunner> = Arc::new(SpyRunner::hello());
        let kitchen = fixture.kitchen(spy);
        let result = kitchen.cook(&recipe, &target, &host, &overrides).unwrap();
        assert_eq!(result.state, RecipeState::Tested);
        fs::read_to_string(fixture.workdir().join("build/Release").join(Layout::PLAN_FILE))
            .unwrap()
    };

    let first = plan_json();
    let second = plan_json();
    assert_eq!(first, second);
    assert!(first.contains("-DBUILD_SHARED_LIBS=ON"));
}

#[test]
fn test_unknown_option_override_is_a_configuration_error() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let kitchen = fixture.kitchen(Arc::new(SpyRunner::producing("test_package")));

    let err = kitchen
        .cook(
            &recipe,
            &profile(Os::Linux, Arch::X86_64),
            &linux_host(),
            &["with_ssl=True".to_string()],
        )
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_second_cook_on_same_workdir_is_locked() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let kitchen = fixture.kitchen(Arc::new(SpyRunner::producing("test_package")));
    let target = profile(Os::Linux, Arch::X86_64);
    let host = linux_host();

    let first = kitchen.prepare(&recipe, &target, &host, &[]).unwrap();
    let second = kitchen.prepare(&recipe, &target, &host, &[]);
    assert!(matches!(second, Err(Error::Locked(_))));

    drop(first);
    assert!(kitchen.prepare(&recipe, &target, &host, &[]).is_ok());
}

#[test]
fn test_unconfigurable_target_spawns_nothing() {
    let fixture = Fixture::new(&recipe_with_test(RUN_TEST_PACKAGE));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::hello());
    let kitchen = fixture.kitchen(spy.clone());
    let target = Profile::new(
        common::settings(Os::Windows, Arch::X86_64).with_compiler(Compiler::Msvc, "193"),
    );

    let err = kitchen
        .cook(&recipe, &target, &linux_host(), &[])
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(spy.calls().is_empty());
}

#[test]
fn test_every_run_is_attempted_and_only_failures_are_reported() {
    let run = r#"
[[test.run]]
artifact = "first"
expect = { contains = ["Hello"] }

[[test.run]]
artifact = "second"
expect = { contains = ["Hello"] }
"#;
    let fixture = Fixture::new(&recipe_with_test(run));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::new(|inv| {
        common::produce_on_build(inv, "first");
        common::produce_on_build(inv, "second");
        if inv.program.ends_with("first") {
            CommandOutput::success("Goodbye\n")
        } else if inv.program.ends_with("second") {
            CommandOutput::success("Hello\n")
        } else {
            CommandOutput::success("")
        }
    }));
    let kitchen = fixture.kitchen(spy.clone());

    let err = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap_err();

    let runs = spy.artifact_runs();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].program.ends_with("first"));
    assert!(runs[1].program.ends_with("second"));

    match err {
        Error::TestAssertion {
            artifact, reason, ..
        } => {
            assert_eq!(artifact, "first");
            assert!(reason.starts_with("1 of the test checks failed"));
            assert!(!reason.contains("second"));
        }
        other => panic!("expected test assertion, got {:?}", other),
    }
}

const RUN_AND_WRITE_OUTPUT: &str = r#"
[[test.run]]
artifact = "test_package"

[[test.files]]
path = "output.txt"
"#;

/// Builds produce `artifact`; running it writes `output.txt` next to it
fn writing_runner(artifact: &'static str) -> SpyRunner {
    SpyRunner::new(move |inv| {
        common::produce_on_build(inv, artifact);
        if inv.program.ends_with(artifact) {
            fs::create_dir_all(&inv.cwd).unwrap();
            fs::write(inv.cwd.join("output.txt"), "42\n").unwrap();
        }
        CommandOutput::success("")
    })
}

#[test]
fn test_native_cook_checks_files_written_by_runs() {
    let fixture = Fixture::new(&recipe_with_test(RUN_AND_WRITE_OUTPUT));
    let recipe = fixture.recipe();
    let kitchen = fixture.kitchen(Arc::new(writing_runner("test_package")));

    let result = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap();

    assert!(result.test.passed);
    assert!(result.test.executed);
    assert!(
        result
            .test
            .verified_paths
            .iter()
            .any(|p| p.ends_with("test_package/output.txt"))
    );
}

#[test]
fn test_native_cook_fails_when_run_leaves_no_file() {
    let fixture = Fixture::new(&recipe_with_test(RUN_AND_WRITE_OUTPUT));
    let recipe = fixture.recipe();
    let kitchen = fixture.kitchen(Arc::new(SpyRunner::producing("test_package")));

    let err = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap_err();

    assert!(err.is_test_assertion());
    assert!(err.to_string().contains("output.txt"));
}

#[test]
fn test_cross_cook_skips_files_written_by_runs() {
    let fixture = Fixture::new(&recipe_with_test(RUN_AND_WRITE_OUTPUT));
    let recipe = fixture.recipe();
    let spy = Arc::new(writing_runner("test_package.exe"));
    let kitchen = fixture.kitchen(spy.clone());

    let result = kitchen
        .cook(&recipe, &profile(Os::Windows, Arch::Armv8), &linux_host(), &[])
        .unwrap();

    assert_eq!(result.state, RecipeState::Tested);
    assert!(result.test.passed);
    assert!(!result.test.executed);
    assert!(spy.artifact_runs().is_empty());
    let reason = result.test.skip_reason.as_deref().unwrap();
    assert!(reason.contains("1 expected file(s) written by artifact runs not checked"));
    assert_eq!(result.test.verified_paths.len(), 1);
    assert!(result.test.verified_paths[0].ends_with("test_package.exe"));
}

#[test]
fn test_cross_cook_still_checks_files_written_by_the_build() {
    let files = r#"
[[test.run]]
artifact = "test_package"

[[test.files]]
path = "test_package.map"
from = "build"
"#;
    let fixture = Fixture::new(&recipe_with_test(files));
    let recipe = fixture.recipe();
    let target = profile(Os::Windows, Arch::Armv8);

    let kitchen = fixture.kitchen(Arc::new(SpyRunner::producing("test_package.exe")));
    let err = kitchen
        .cook(&recipe, &target, &linux_host(), &[])
        .unwrap_err();
    assert!(err.is_test_assertion());
    assert!(err.to_string().contains("test_package.map"));

    let kitchen = fixture.kitchen(Arc::new(SpyRunner::new(|inv| {
        common::produce_on_build(inv, "test_package.exe");
        common::produce_on_build(inv, "test_package.map");
        CommandOutput::success("")
    })));
    let result = kitchen.cook(&recipe, &target, &linux_host(), &[]).unwrap();
    assert!(result.test.passed);
    assert!(
        result
            .test
            .verified_paths
            .iter()
            .any(|p| p.ends_with("test_package.map"))
    );
}

#[test]
fn test_option_rules_prune_before_requirements_are_declared() {
    let extra = format!(
        "{}{}",
        RUN_TEST_PACKAGE,
        r#"
[options.with_psl]
values = [true, false]
default = true

[[option_rules]]
remove = ["with_psl"]
when = { os = ["Windows"] }

[[requires]]
reference = "libpsl/0.21.1"
when = { options = { with_psl = true } }
"#
    );
    let fixture = Fixture::new(&recipe_with_test(&extra));
    let recipe = fixture.recipe();

    let kitchen = fixture.kitchen(Arc::new(SpyRunner::producing("test_package.exe")));
    let result = kitchen
        .cook(&recipe, &profile(Os::Windows, Arch::Armv8), &linux_host(), &[])
        .unwrap();
    let names: Vec<&str> = result
        .requirements
        .runtime
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["zlib"]);
    assert_eq!(result.resolved.runtime.len(), 1);
    assert!(
        !result
            .package
            .as_ref()
            .unwrap()
            .options
            .contains_key("with_psl")
    );

    let kitchen = fixture.kitchen(Arc::new(SpyRunner::hello()));
    let result = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap();
    assert!(result.requirements.runtime.iter().any(|r| r.name == "libpsl"));
}

#[test]
fn test_patch_outside_recipe_directory_is_rejected() {
    let patch = format!(
        "{}{}",
        RUN_TEST_PACKAGE,
        r#"
[[source.patches]]
file = "../outside.patch"
"#
    );
    let fixture = Fixture::new(&recipe_with_test(&patch));
    let recipe = fixture.recipe();
    let spy = Arc::new(SpyRunner::hello());
    let kitchen = fixture.kitchen(spy.clone());

    let err = kitchen
        .cook(&recipe, &profile(Os::Linux, Arch::X86_64), &linux_host(), &[])
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(spy.calls().iter().all(|inv| inv.program != "patch"));
}
