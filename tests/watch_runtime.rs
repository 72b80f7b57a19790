// tests/watch_runtime.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;

use kitforge::engine::{
    Runtime, RuntimeEvent, Sequencer, TriggerQueue, TriggerReason, TriggerWhileRunningBehaviour,
};
use kitforge::env::BuildMode;
use kitforge::session::{HmrEvent, Session};
use kitforge::task::TaskRegistry;
use kitforge_test_utils::fixtures::Project;
use kitforge_test_utils::recorder::Recorder;
use kitforge_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

struct Harness {
    tx: mpsc::Sender<RuntimeEvent>,
    hmr: broadcast::Receiver<HmrEvent>,
    handle: tokio::task::JoinHandle<kitforge::errors::Result<()>>,
    _project: Project,
}

impl Harness {
    fn start(
        registry: TaskRegistry,
        behaviour: TriggerWhileRunningBehaviour,
    ) -> Result<Self, Box<dyn Error>> {
        let project = Project::empty()?;
        registry.validate()?;
        let session = Session::new();
        let hmr = session.hmr().subscribe();
        let sequencer = Sequencer::new(
            Arc::new(registry),
            Arc::new(project.context(BuildMode::Development)?),
            session,
        );

        let (tx, rx) = mpsc::channel(64);
        let runtime = Runtime::new(sequencer, TriggerQueue::new(behaviour, 1), tx.clone(), rx);
        let handle = tokio::spawn(runtime.run());

        Ok(Self {
            tx,
            hmr,
            handle,
            _project: project,
        })
    }

    async fn trigger(&self, task: &str) -> Result<(), Box<dyn Error>> {
        self.tx
            .send(RuntimeEvent::TaskTriggered {
                task: task.to_string(),
                reason: TriggerReason::FileWatch,
            })
            .await?;
        Ok(())
    }

    async fn shutdown(self) -> Result<Vec<HmrEvent>, Box<dyn Error>> {
        self.tx.send(RuntimeEvent::ShutdownRequested).await?;
        with_timeout(self.handle).await??;

        let mut hmr = self.hmr;
        let mut events = Vec::new();
        while let Ok(event) = hmr.try_recv() {
            events.push(event);
        }
        Ok(events)
    }
}

#[tokio::test]
async fn triggers_during_a_rebuild_coalesce_into_one_follow_up() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry.register("style:scss", &[], rec.action(Duration::from_millis(150)))?;

    let harness = Harness::start(registry, TriggerWhileRunningBehaviour::Queue)?;
    harness.trigger("style:scss").await?;
    sleep(Duration::from_millis(30)).await;
    harness.trigger("style:scss").await?;
    harness.trigger("style:scss").await?;
    harness.trigger("style:scss").await?;
    sleep(Duration::from_millis(500)).await;

    let events = harness.shutdown().await?;

    assert_eq!(rec.count("start:style:scss"), 2);
    assert_eq!(
        rec.events(),
        vec![
            "start:style:scss",
            "end:style:scss",
            "start:style:scss",
            "end:style:scss"
        ],
        "rebuilds never overlap"
    );
    assert!(events.contains(&HmrEvent::Reload {
        tasks: vec!["style:scss".to_string()],
        css_only: true,
    }));
    Ok(())
}

#[tokio::test]
async fn cancel_keeps_only_the_latest_trigger() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry.register("style:scss", &[], rec.action(Duration::from_millis(150)))?;
    registry.register("jq:md2json", &[], rec.action(Duration::from_millis(5)))?;

    let harness = Harness::start(registry, TriggerWhileRunningBehaviour::Cancel)?;
    harness.trigger("style:scss").await?;
    sleep(Duration::from_millis(30)).await;
    harness.trigger("style:scss").await?;
    harness.trigger("jq:md2json").await?;
    sleep(Duration::from_millis(400)).await;
    harness.shutdown().await?;

    assert_eq!(rec.count("start:style:scss"), 1);
    assert_eq!(rec.count("start:jq:md2json"), 1);
    Ok(())
}

#[tokio::test]
async fn failed_rebuild_is_reported_and_watching_continues() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry.register("style:scss", &[], rec.failing(Duration::from_millis(5), "Undefined variable"))?;
    registry.register("jq:md2json", &[], rec.action(Duration::from_millis(5)))?;

    let harness = Harness::start(registry, TriggerWhileRunningBehaviour::Queue)?;
    harness.trigger("style:scss").await?;
    sleep(Duration::from_millis(100)).await;
    harness.trigger("jq:md2json").await?;
    sleep(Duration::from_millis(100)).await;

    let events = harness.shutdown().await?;

    assert_eq!(rec.count("end:jq:md2json"), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        HmrEvent::Error { message } if message.contains("Undefined variable")
    )));
    assert!(events.contains(&HmrEvent::Reload {
        tasks: vec!["jq:md2json".to_string()],
        css_only: false,
    }));
    Ok(())
}

#[tokio::test]
async fn every_rebuild_reruns_prerequisites() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry.register("prepare", &[], rec.action(Duration::from_millis(5)))?;
    registry.register("jq:md2json", &["prepare"], rec.action(Duration::from_millis(5)))?;

    let harness = Harness::start(registry, TriggerWhileRunningBehaviour::Queue)?;
    harness.trigger("jq:md2json").await?;
    sleep(Duration::from_millis(100)).await;
    harness.trigger("jq:md2json").await?;
    sleep(Duration::from_millis(100)).await;
    harness.shutdown().await?;

    assert_eq!(rec.count("start:prepare"), 2);
    assert_eq!(rec.count("start:jq:md2json"), 2);
    Ok(())
}
