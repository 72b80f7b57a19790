// tests/cli_run.rs

use std::error::Error;

use clap::Parser;

use kitforge::cli::CliArgs;
use kitforge_test_utils::fixtures::Project;
use kitforge_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn args(project: &Project, extra: &[&str]) -> CliArgs {
    let config = project.path("Kitforge.toml");
    let config = config.to_string_lossy().into_owned();
    let mut argv = vec!["kitforge", "--config", config.as_str()];
    argv.extend_from_slice(extra);
    CliArgs::parse_from(argv)
}

#[tokio::test]
async fn dry_run_touches_nothing() -> TestResult {
    init_tracing();
    let project = Project::component_library()?;

    with_timeout(kitforge::run(args(&project, &["build", "--dry-run"]))).await?;

    assert!(!project.exists("dist"));
    assert!(!project.exists("lib"));
    Ok(())
}

#[tokio::test]
async fn unknown_task_fails_before_running() -> TestResult {
    init_tracing();
    let project = Project::component_library()?;

    let err = with_timeout(kitforge::run(args(&project, &["build:everything"])))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("build:everything"));
    Ok(())
}

#[tokio::test]
async fn binding_to_unknown_task_is_a_startup_error() -> TestResult {
    init_tracing();
    let project = Project::component_library()?;
    let mut toml = project.read("Kitforge.toml")?;
    toml.push_str("\n[[watch.binding]]\nrole = \"style_modules\"\ntask = \"lint\"\n");
    project.write("Kitforge.toml", &toml)?;

    let err = with_timeout(kitforge::run(args(&project, &["--dry-run"])))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("lint"));
    Ok(())
}

#[tokio::test]
async fn build_runs_from_the_config_directory() -> TestResult {
    init_tracing();
    let project = Project::component_library()?;

    with_timeout(kitforge::run(args(&project, &["build:babel", "jq:md2json"]))).await?;

    assert!(project.exists("lib/react/index.js"));
    assert!(project.exists("www/json/button.json"));
    Ok(())
}
