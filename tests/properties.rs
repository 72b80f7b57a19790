// tests/properties.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;

use kitforge::dag::{DagGraph, Scheduler};
use kitforge::engine::TaskOutcome;
use kitforge::pipeline::text::VERSION_PLACEHOLDER;
use kitforge::pipeline::ReplaceText;

/// Random acyclic prerequisite lists: task N may only depend on tasks 0..N.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), num_tasks).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let deps: HashSet<String> = if i == 0 {
                            HashSet::new()
                        } else {
                            picks.into_iter().map(|p| format!("t{}", p % i)).collect()
                        };
                        let mut deps: Vec<String> = deps.into_iter().collect();
                        deps.sort();
                        (format!("t{i}"), deps)
                    })
                    .collect()
            },
        )
    })
}

#[derive(Debug, Clone)]
enum Piece {
    Text(String),
    Placeholder,
}

fn piece() -> impl Strategy<Value = Piece> {
    prop_oneof![
        "[a-z =;\n]{0,12}".prop_map(Piece::Text),
        Just(Piece::Placeholder),
    ]
}

proptest! {
    #[test]
    fn version_substitution_replaces_every_placeholder(
        pieces in proptest::collection::vec(piece(), 0..12),
        version in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
    ) {
        let source: String = pieces
            .iter()
            .map(|p| match p {
                Piece::Text(t) => t.as_str(),
                Piece::Placeholder => VERSION_PLACEHOLDER,
            })
            .collect();
        let expected: String = pieces
            .iter()
            .map(|p| match p {
                Piece::Text(t) => t.as_str(),
                Piece::Placeholder => version.as_str(),
            })
            .collect();

        let step = ReplaceText::version(&version).unwrap();
        prop_assert_eq!(step.apply_str(&source), expected);
    }

    #[test]
    fn scheduler_runs_each_task_once_after_its_prerequisites(
        edges in dag_strategy(10),
        triggers in proptest::collection::vec(0..10usize, 1..4),
        failing in proptest::collection::hash_set(0..10usize, 0..3),
    ) {
        let deps: HashMap<String, Vec<String>> = edges.iter().cloned().collect();
        let graph = Arc::new(DagGraph::from_edges(edges.clone()));
        let n = edges.len();
        let failing: HashSet<String> = failing.into_iter().filter(|i| *i < n).map(|i| format!("t{i}")).collect();

        let mut scheduler = Scheduler::new(graph);
        scheduler.start_new_run();
        let trigger_names: Vec<String> = triggers.iter().map(|i| format!("t{}", i % n)).collect();

        let mut queue: VecDeque<String> = scheduler
            .handle_triggers(trigger_names.iter().map(String::as_str))
            .into_iter()
            .map(|t| t.name)
            .collect();

        let mut ran: Vec<String> = Vec::new();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut steps = 0;

        while let Some(task) = queue.pop_front() {
            steps += 1;
            prop_assert!(steps <= 1000, "scheduler did not terminate");
            prop_assert!(!ran.contains(&task), "{} dispatched twice", task);
            for dep in &deps[&task] {
                prop_assert!(succeeded.contains(dep), "{} ran before {}", task, dep);
            }
            ran.push(task.clone());

            let outcome = if failing.contains(&task) {
                TaskOutcome::Failed("boom".into())
            } else {
                succeeded.insert(task.clone());
                TaskOutcome::Success
            };
            queue.extend(scheduler.handle_completion(&task, outcome).into_iter().map(|t| t.name));
        }

        prop_assert!(scheduler.is_idle());

        if failing.is_empty() {
            for trigger in &trigger_names {
                prop_assert!(succeeded.contains(trigger), "{} never ran", trigger);
            }
        }
    }
}
