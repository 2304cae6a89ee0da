//! Causal DAG over artifacts.
//!
//! Edges point from a child to the parents listed in its `created_after`.
//! Ordering is a Kahn topological sort whose ready set is a min-heap of ids,
//! so the result depends only on the node set and its edges, never on input
//! order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};

use tracing::debug;

use crate::domain::Artifact;

use super::error::CoreError;

/// Anything that can sit in the causal graph
pub trait CausalNode {
    fn node_id(&self) -> &str;
    fn predecessors(&self) -> &[String];
}

impl CausalNode for Artifact {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn predecessors(&self) -> &[String] {
        &self.created_after
    }
}

impl<T: CausalNode + ?Sized> CausalNode for &T {
    fn node_id(&self) -> &str {
        (**self).node_id()
    }

    fn predecessors(&self) -> &[String] {
        (**self).predecessors()
    }
}

/// An edge whose parent does not exist in the node set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DanglingEdge {
    pub child: String,
    pub missing_parent: String,
}

/// Validated, acyclic causal graph borrowing its nodes
#[derive(Debug)]
pub struct CausalGraph<'a, T> {
    nodes: BTreeMap<&'a str, &'a T>,
    /// child -> distinct parents
    parents: BTreeMap<&'a str, BTreeSet<&'a str>>,
    /// parent -> distinct children
    children: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a, T: CausalNode> CausalGraph<'a, T> {
    /// Build the graph, rejecting dangling references and cycles
    pub fn build(items: &'a [T]) -> Result<Self, CoreError> {
        if let Some(edge) = dangling_edges(items).into_iter().next() {
            return Err(CoreError::DanglingReference {
                child: edge.child,
                missing_parent: edge.missing_parent,
            });
        }
        Self::assemble(items)
    }

    /// Build the graph over whatever edges resolve inside `items`.
    ///
    /// Edges to unknown parents are skipped; cycles are still rejected.
    pub fn build_partial(items: &'a [T]) -> Result<Self, CoreError> {
        Self::assemble(items)
    }

    fn assemble(items: &'a [T]) -> Result<Self, CoreError> {
        let mut nodes: BTreeMap<&'a str, &'a T> = BTreeMap::new();
        for item in items {
            nodes.entry(item.node_id()).or_insert(item);
        }

        let mut parents: BTreeMap<&'a str, BTreeSet<&'a str>> = BTreeMap::new();
        let mut children: BTreeMap<&'a str, BTreeSet<&'a str>> = BTreeMap::new();
        for (&id, &node) in &nodes {
            let entry = parents.entry(id).or_default();
            for parent in node.predecessors() {
                if !nodes.contains_key(parent.as_str()) {
                    continue;
                }
                entry.insert(parent.as_str());
                children.entry(parent.as_str()).or_default().insert(id);
            }
        }

        let graph = Self {
            nodes,
            parents,
            children,
        };

        if let Some(cycle) = graph.find_cycle() {
            return Err(CoreError::CycleDetected { nodes: cycle });
        }

        debug!(nodes = graph.nodes.len(), "Built causal graph");
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&'a T> {
        self.nodes.get(id).copied()
    }

    /// Depth-first search tracking the current recursion stack.
    ///
    /// Returns the nodes of the first cycle found, starting and ending with
    /// the node that closes it.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> =
            self.nodes.keys().map(|&id| (id, Mark::Unvisited)).collect();

        for &root in self.nodes.keys() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            // (node, parents still to visit)
            let mut stack: Vec<(&str, Vec<&str>)> = Vec::new();
            marks.insert(root, Mark::OnStack);
            stack.push((root, self.parents_of(root)));

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                match pending.pop() {
                    Some(parent) => match marks[parent] {
                        Mark::Unvisited => {
                            marks.insert(parent, Mark::OnStack);
                            stack.push((parent, self.parents_of(parent)));
                        }
                        Mark::OnStack => {
                            let start = stack
                                .iter()
                                .position(|(id, _)| *id == parent)
                                .unwrap_or(0);
                            let mut cycle: Vec<String> =
                                stack[start..].iter().map(|(id, _)| id.to_string()).collect();
                            cycle.push(parent.to_string());
                            return Some(cycle);
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks.insert(node, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }

        None
    }

    /// Parents in reverse id order so popping visits them ascending
    fn parents_of(&self, id: &str) -> Vec<&'a str> {
        self.parents
            .get(id)
            .map(|p| p.iter().rev().copied().collect())
            .unwrap_or_default()
    }

    /// Oldest-first topological order with lexicographic tie-break
    pub fn topological_order(&self) -> Vec<&'a T> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|&id| (id, self.parents.get(id).map_or(0, BTreeSet::len)))
            .collect();

        let mut ready: BinaryHeap<Reverse<&'a str>> = self
            .nodes
            .keys()
            .filter(|id| in_degree[*id] == 0)
            .map(|&id| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(self.nodes[id]);
            if let Some(children) = self.children.get(id) {
                for &child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push(Reverse(child));
                        }
                    }
                }
            }
        }

        order
    }

    /// Newest-first order: successors before their predecessors
    pub fn causal_order(&self) -> Vec<&'a T> {
        let mut order = self.topological_order();
        order.reverse();
        order
    }

    /// Nodes no other node lists as a predecessor, sorted by id
    pub fn tips(&self) -> Vec<&'a T> {
        self.nodes
            .iter()
            .filter(|(id, _)| self.children.get(**id).map_or(true, BTreeSet::is_empty))
            .map(|(_, &node)| node)
            .collect()
    }
}

/// Every edge whose parent is not in the set, sorted by (child, parent)
pub fn dangling_edges<T: CausalNode>(items: &[T]) -> Vec<DanglingEdge> {
    let known: HashSet<&str> = items.iter().map(|item| item.node_id()).collect();
    let known = &known;

    let mut edges: Vec<DanglingEdge> = items
        .iter()
        .flat_map(|item| {
            item.predecessors()
                .iter()
                .filter(move |p| !known.contains(p.as_str()))
                .map(|p| DanglingEdge {
                    child: item.node_id().to_string(),
                    missing_parent: p.clone(),
                })
        })
        .collect();

    edges.sort();
    edges.dedup();
    edges
}

/// Tips of an arbitrary (possibly partial) set, sorted by id.
///
/// Does not require the set to be closed under `created_after`, so it can be
/// used on filtered subsets.
pub fn tips_of<T: CausalNode>(items: &[T]) -> Vec<&T> {
    let referenced: HashSet<&str> = items
        .iter()
        .flat_map(|item| {
            item.predecessors()
                .iter()
                .map(String::as_str)
                .filter(move |p| *p != item.node_id())
        })
        .collect();

    let mut tips: Vec<&T> = items
        .iter()
        .filter(|item| !referenced.contains(item.node_id()))
        .collect();
    tips.sort_by(|a, b| a.node_id().cmp(b.node_id()));
    tips.dedup_by(|a, b| a.node_id() == b.node_id());
    tips
}
