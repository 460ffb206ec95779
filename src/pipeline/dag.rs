//! task graph: ids, upstream edges, topological order

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// what a task runs; any error is a task failure
pub type TaskAction = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// one node of the pipeline
#[derive(Clone)]
pub struct Task {
    id: String,
    action: TaskAction,
    allow_failure: bool, // a failing optional task doesn't fail the run
}

impl Task {
    pub fn new<F>(id: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            action: Arc::new(action),
            allow_failure: false,
        }
    }

    pub fn allow_failure(mut self, allowed: bool) -> Self {
        self.allow_failure = allowed;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_optional(&self) -> bool {
        self.allow_failure
    }

    pub(crate) fn run(&self) -> anyhow::Result<()> {
        (self.action)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("allow_failure", &self.allow_failure)
            .finish_non_exhaustive()
    }
}

/// acyclic task graph; tasks keep insertion order
#[derive(Debug, Clone, Default)]
pub struct Dag {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    upstream: Vec<Vec<usize>>,
    downstream: Vec<Vec<usize>>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.index.contains_key(task.id()) {
            return Err(Error::pipeline(format!("duplicate task id '{}'", task.id())));
        }
        self.index.insert(task.id().to_string(), self.tasks.len());
        self.tasks.push(task);
        self.upstream.push(Vec::new());
        self.downstream.push(Vec::new());
        Ok(())
    }

    /// `downstream` may only run after `upstream` succeeded
    pub fn add_dependency(&mut self, upstream: &str, downstream: &str) -> Result<()> {
        let up = self.position(upstream)?;
        let down = self.position(downstream)?;

        if up == down || self.reaches(down, up) {
            return Err(Error::pipeline(format!(
                "dependency {upstream} -> {downstream} would create a cycle"
            )));
        }
        if !self.upstream[down].contains(&up) {
            self.upstream[down].push(up);
            self.downstream[up].push(down);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub(crate) fn position(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::pipeline(format!("unknown task id '{id}'")))
    }

    pub(crate) fn upstream_of(&self, idx: usize) -> &[usize] {
        &self.upstream[idx]
    }

    /// ids of the direct upstream tasks
    pub fn upstream(&self, id: &str) -> Result<Vec<&str>> {
        let idx = self.position(id)?;
        Ok(self.upstream[idx].iter().map(|&u| self.tasks[u].id()).collect())
    }

    /// is `to` reachable from `from` along downstream edges
    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut seen = vec![false; self.tasks.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if std::mem::replace(&mut seen[node], true) {
                continue;
            }
            stack.extend(self.downstream[node].iter().copied());
        }
        false
    }

    /// kahn's algorithm; ready tasks leave in insertion order so the result is deterministic
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        let mut in_degree: Vec<usize> = self.upstream.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = (0..self.tasks.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.tasks.len());

        while let Some(node) = ready.pop_front() {
            order.push(self.tasks[node].id());
            let mut released: Vec<usize> = Vec::new();
            for &next in &self.downstream[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    released.push(next);
                }
            }
            released.sort_unstable();
            ready.extend(released);
        }

        if order.len() != self.tasks.len() {
            return Err(Error::pipeline("task graph has a cycle"));
        }
        Ok(order)
    }

    /// every task transitively downstream of `idx`, excluding it
    pub(crate) fn downstream_closure(&self, idx: usize) -> Vec<usize> {
        let mut seen = vec![false; self.tasks.len()];
        let mut stack: Vec<usize> = self.downstream[idx].clone();
        let mut closure = Vec::new();
        while let Some(node) = stack.pop() {
            if std::mem::replace(&mut seen[node], true) {
                continue;
            }
            closure.push(node);
            stack.extend(self.downstream[node].iter().copied());
        }
        closure.sort_unstable();
        closure
    }
}
