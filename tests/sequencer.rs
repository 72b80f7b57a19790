// tests/sequencer.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use kitforge::engine::{Sequence, Sequencer};
use kitforge::env::BuildMode;
use kitforge::errors::KitforgeError;
use kitforge::session::Session;
use kitforge::task::TaskRegistry;
use kitforge_test_utils::fixtures::Project;
use kitforge_test_utils::recorder::Recorder;
use kitforge_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const QUICK: Duration = Duration::from_millis(5);
const SLOW: Duration = Duration::from_millis(150);

fn sequencer(project: &Project, registry: TaskRegistry) -> Result<Sequencer, Box<dyn Error>> {
    registry.validate()?;
    let ctx = project.context(BuildMode::Development)?;
    Ok(Sequencer::new(
        Arc::new(registry),
        Arc::new(ctx),
        Session::new(),
    ))
}

#[tokio::test]
async fn prerequisites_settle_before_their_task() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("a", &[], rec.action(QUICK))?;
    registry.register("b", &["a"], rec.action(QUICK))?;
    registry.register("c", &["b"], rec.action(QUICK))?;

    let seq = sequencer(&project, registry)?;
    with_timeout(seq.run(&Sequence::new().then("c"))).await?;

    assert_eq!(
        rec.events(),
        vec!["start:a", "end:a", "start:b", "end:b", "start:c", "end:c"]
    );
    Ok(())
}

#[tokio::test]
async fn shared_prerequisite_runs_once_per_invocation() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("base", &[], rec.action(QUICK))?;
    registry.register("left", &["base"], rec.action(QUICK))?;
    registry.register("right", &["base"], rec.action(QUICK))?;
    registry.register("after", &["base"], rec.action(QUICK))?;
    registry.register_group("both", &["left", "right"])?;

    let seq = sequencer(&project, registry)?;
    let plan = Sequence::new().then("both").then("after");
    with_timeout(seq.run(&plan)).await?;

    assert_eq!(rec.count("start:base"), 1);
    assert_eq!(rec.count("end:after"), 1);

    // A fresh invocation starts over.
    with_timeout(seq.fresh_invocation().run(&plan)).await?;
    assert_eq!(rec.count("start:base"), 2);
    Ok(())
}

#[tokio::test]
async fn next_position_waits_for_the_whole_group() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("slow", &[], rec.action(SLOW))?;
    registry.register("fast", &[], rec.action(QUICK))?;
    registry.register("next", &[], rec.action(QUICK))?;

    let seq = sequencer(&project, registry)?;
    let plan = Sequence::new().then_parallel(["slow", "fast"]).then("next");
    with_timeout(seq.run(&plan)).await?;

    let end_slow = rec.position("end:slow").ok_or("slow never finished")?;
    let start_next = rec.position("start:next").ok_or("next never started")?;
    assert!(end_slow < start_next, "events: {:?}", rec.events());

    // Both group members were started before either finished.
    let start_fast = rec.position("start:fast").ok_or("fast never started")?;
    let start_slow = rec.position("start:slow").ok_or("slow never started")?;
    let end_fast = rec.position("end:fast").ok_or("fast never finished")?;
    assert!(start_fast < end_fast && start_slow < end_fast);
    Ok(())
}

#[tokio::test]
async fn failure_stops_later_positions_and_lets_siblings_finish() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("bad", &[], rec.failing(QUICK, "compile error"))?;
    registry.register("sibling", &[], rec.action(SLOW))?;
    registry.register("later", &[], rec.action(QUICK))?;

    let seq = sequencer(&project, registry)?;
    let plan = Sequence::new()
        .then_parallel(["bad", "sibling"])
        .then("later");
    let err = with_timeout(seq.run(&plan)).await.unwrap_err();

    match err {
        KitforgeError::TaskFailed { task, message } => {
            assert_eq!(task, "bad");
            assert!(message.contains("compile error"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(rec.count("end:sibling"), 1, "in-flight sibling runs to completion");
    assert_eq!(rec.count("start:later"), 0);
    assert!(!seq.completed().contains(&"sibling".to_string()));
    Ok(())
}

#[tokio::test]
async fn dependents_of_a_failed_prerequisite_never_start() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("bad", &[], rec.failing(QUICK, "boom"))?;
    registry.register("child", &["bad"], rec.action(QUICK))?;

    let seq = sequencer(&project, registry)?;
    assert!(with_timeout(seq.run(&Sequence::new().then("child"))).await.is_err());
    assert_eq!(rec.events(), vec!["start:bad", "fail:bad"]);
    Ok(())
}

#[tokio::test]
async fn nested_sequences_share_the_invocation() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("setup", &[], rec.action(QUICK))?;
    registry.register("work", &["setup"], rec.action(QUICK))?;
    registry.register_sequence("inner", &[], Sequence::new().then("setup").then("work"))?;
    registry.register_sequence("outer", &[], Sequence::new().then("setup").then("inner"))?;

    let seq = sequencer(&project, registry)?;
    with_timeout(seq.run(&Sequence::new().then("outer"))).await?;

    assert_eq!(rec.count("start:setup"), 1);
    assert_eq!(rec.count("start:work"), 1);
    assert_eq!(
        seq.completed(),
        vec!["inner", "outer", "setup", "work"]
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_sequences_share_one_run_of_a_common_task() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("shared", &[], rec.action(Duration::from_millis(100)))?;
    registry.register("left", &[], rec.action(QUICK))?;
    registry.register_sequence("a", &[], Sequence::new().then("shared").then("left"))?;
    registry.register_sequence("b", &[], Sequence::new().then("shared"))?;

    let seq = sequencer(&project, registry)?;
    with_timeout(seq.run(&Sequence::parallel(["a", "b"]))).await?;

    assert_eq!(rec.count("start:shared"), 1, "events: {:?}", rec.events());
    assert_eq!(rec.count("end:left"), 1);
    assert_eq!(seq.completed(), vec!["a", "b", "left", "shared"]);
    Ok(())
}

#[tokio::test]
async fn waiting_sequence_sees_the_shared_failure() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("shared", &[], rec.failing(Duration::from_millis(100), "broken"))?;
    registry.register("after", &[], rec.action(QUICK))?;
    registry.register_sequence("a", &[], Sequence::new().then("shared").then("after"))?;
    registry.register_sequence("b", &[], Sequence::new().then("shared").then("after"))?;

    let seq = sequencer(&project, registry)?;
    let err = with_timeout(seq.run(&Sequence::parallel(["a", "b"])))
        .await
        .unwrap_err();

    assert!(
        matches!(&err, KitforgeError::TaskFailed { task, .. } if task == "shared"),
        "unexpected error: {err}"
    );
    assert_eq!(rec.events(), vec!["start:shared", "fail:shared"]);
    Ok(())
}

#[tokio::test]
async fn build_and_docs_together_compile_styles_once() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("style:scss", &[], rec.action(Duration::from_millis(50)))?;
    registry.register("style:fonts", &[], rec.action(QUICK))?;
    registry.register_group("style", &["style:scss", "style:fonts"])?;
    registry.register("build:babel", &[], rec.action(QUICK))?;
    registry.register("server", &[], rec.action(QUICK))?;
    registry.register_sequence("build", &[], Sequence::parallel(["style", "build:babel"]))?;
    registry.register_sequence("docs", &[], Sequence::new().then("style").then("server"))?;

    let seq = sequencer(&project, registry)?;
    with_timeout(seq.run(&Sequence::parallel(["build", "docs"]))).await?;

    assert_eq!(rec.count("start:style:scss"), 1, "events: {:?}", rec.events());
    assert_eq!(rec.count("start:style:fonts"), 1);
    let end_scss = rec.position("end:style:scss").ok_or("style:scss never finished")?;
    let start_server = rec.position("start:server").ok_or("server never started")?;
    assert!(end_scss < start_server, "docs waited for the shared style run");
    Ok(())
}

#[tokio::test]
async fn unknown_task_is_rejected_before_anything_runs() -> TestResult {
    init_tracing();
    let project = Project::empty()?;
    let rec = Recorder::new();

    let mut registry = TaskRegistry::new();
    registry.register("a", &[], rec.action(QUICK))?;

    let seq = sequencer(&project, registry)?;
    let err = seq
        .run(&Sequence::parallel(["a", "missing"]))
        .await
        .unwrap_err();
    assert!(matches!(err, KitforgeError::UnknownTask(_)));
    assert!(rec.events().is_empty());
    Ok(())
}
