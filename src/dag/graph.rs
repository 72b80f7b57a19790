// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use crate::engine::TaskName;
use crate::task::TaskRegistry;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Prerequisites: tasks that must settle before this one can run.
    deps: Vec<TaskName>,
    /// Tasks listing this one as a prerequisite.
    dependents: Vec<TaskName>,
}

/// In-memory prerequisite graph keyed by task name.
///
/// Acyclicity and reference checks happen in
/// [`TaskRegistry::validate`]; this type only keeps adjacency for
/// scheduling and dry-run output.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: HashMap<TaskName, DagNode>,
}

impl DagGraph {
    /// Build the graph from a validated registry.
    pub fn from_registry(registry: &TaskRegistry) -> Self {
        Self::from_edges(
            registry
                .tasks()
                .map(|t| (t.name().to_string(), t.prereqs().to_vec())),
        )
    }

    /// Build the graph from `(task, prerequisites)` pairs.
    pub fn from_edges(edges: impl IntoIterator<Item = (TaskName, Vec<TaskName>)>) -> Self {
        let mut nodes: HashMap<TaskName, DagNode> = HashMap::new();

        for (name, deps) in edges {
            nodes.entry(name).or_default().deps = deps;
        }

        let names: Vec<TaskName> = nodes.keys().cloned().collect();
        for name in names {
            let deps = nodes.get(&name).map(|n| n.deps.clone()).unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        Self { nodes }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate prerequisites of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks that list `name` as a prerequisite.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// `name` plus every transitive prerequisite.
    pub fn closure(&self, name: &str) -> HashSet<TaskName> {
        let mut seen = HashSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if seen.insert(current.clone()) {
                stack.extend(self.dependencies_of(&current).iter().cloned());
            }
        }
        seen
    }
}
