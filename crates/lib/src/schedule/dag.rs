//! Task dependency graph.
//!
//! Nodes are tasks in declaration order; edges run from a dependency to its
//! dependent. Ordering uses Kahn's algorithm and always picks the earliest-declared
//! ready task, so the schedule is stable across runs.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::task::TaskId;

use super::types::ScheduleError;

pub struct TaskGraph {
  /// Node weight is the task's declaration index.
  graph: DiGraph<usize, ()>,
  ids: Vec<TaskId>,
  /// Declared dependencies that are not part of the graph, per task.
  missing: Vec<Vec<TaskId>>,
}

impl TaskGraph {
  /// Build the graph from `(id, dependencies)` pairs in declaration order.
  pub fn new<'a, I>(tasks: I) -> Result<Self, ScheduleError>
  where
    I: IntoIterator<Item = (TaskId, &'a [TaskId])>,
  {
    let tasks: Vec<(TaskId, &[TaskId])> = tasks.into_iter().collect();
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut ids = Vec::with_capacity(tasks.len());

    for (index, (id, _)) in tasks.iter().enumerate() {
      if nodes.contains_key(id) {
        return Err(ScheduleError::DuplicateTask(*id));
      }
      nodes.insert(*id, graph.add_node(index));
      ids.push(*id);
    }

    let mut missing = vec![Vec::new(); tasks.len()];
    for (index, (id, deps)) in tasks.iter().enumerate() {
      let dependent = nodes[id];
      for dep in deps.iter() {
        match nodes.get(dep) {
          Some(&dependency) => {
            graph.add_edge(dependency, dependent, ());
          }
          None => missing[index].push(*dep),
        }
      }
    }

    let dag = Self {
      graph,
      ids,
      missing,
    };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), ScheduleError> {
    toposort(&self.graph, None).map_err(|cycle| ScheduleError::CycleDetected(self.ids[self.graph[cycle.node_id()]]))?;
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  /// Declaration indices in dependency order, ties broken by declaration order.
  pub fn order(&self) -> Vec<usize> {
    let mut in_degree: Vec<usize> = self
      .graph
      .node_indices()
      .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
      .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
      .iter()
      .enumerate()
      .filter(|(_, d)| **d == 0)
      .map(|(i, _)| Reverse(i))
      .collect();

    let mut order = Vec::with_capacity(self.len());
    while let Some(Reverse(index)) = ready.pop() {
      order.push(index);
      for dependent in self.graph.neighbors_directed(NodeIndex::new(index), Direction::Outgoing) {
        let d = &mut in_degree[dependent.index()];
        *d -= 1;
        if *d == 0 {
          ready.push(Reverse(dependent.index()));
        }
      }
    }
    order
  }

  /// Direct dependencies of the task at `index` that are part of the graph.
  pub fn dependencies(&self, index: usize) -> Vec<usize> {
    let mut deps: Vec<usize> = self
      .graph
      .neighbors_directed(NodeIndex::new(index), Direction::Incoming)
      .map(|n| self.graph[n])
      .collect();
    deps.sort_unstable();
    deps.dedup();
    deps
  }

  /// Declared dependencies of the task at `index` that are not in the graph.
  pub fn missing_dependencies(&self, index: usize) -> &[TaskId] {
    &self.missing[index]
  }

  /// `roots` plus everything they transitively depend on.
  pub fn closure(&self, roots: &[usize]) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = roots.to_vec();
    while let Some(index) = stack.pop() {
      if seen.insert(index) {
        stack.extend(self.dependencies(index));
      }
    }
    seen
  }
}
