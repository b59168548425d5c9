// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;

use crate::dag::task_info::TaskInfo;

/// Dependency graph of one scope (the root task map, or the children of a
/// container), keyed by instance name.
///
/// Edge direction: predecessor -> successor. For
///   `{ "name": "A", "next": "B" }`
/// we add edge A -> B. Nested names carry their route, so siblings of
/// different groups never connect.
#[derive(Debug, Clone)]
pub struct ScopeGraph<'a> {
    graph: DiGraphMap<&'a str, ()>,
    nodes: BTreeSet<&'a str>,
}

impl<'a> ScopeGraph<'a> {
    pub fn from_tasks(tasks: &'a BTreeMap<String, TaskInfo>) -> Self {
        let mut graph: DiGraphMap<&'a str, ()> = DiGraphMap::new();
        let mut nodes = BTreeSet::new();

        for name in tasks.keys() {
            graph.add_node(name.as_str());
            nodes.insert(name.as_str());
        }

        for (name, info) in tasks.iter() {
            for next in info.next_instance_names() {
                // Successor names that point outside the scope are ignored.
                if let Some((key, _)) = tasks.get_key_value(&next) {
                    graph.add_edge(name.as_str(), key.as_str(), ());
                }
            }
        }

        Self { graph, nodes }
    }

    fn node(&self, name: &str) -> Option<&'a str> {
        self.nodes.get(name).copied()
    }

    /// Direct predecessors: tasks whose `next` lists `name`.
    pub fn predecessors_of(&self, name: &str) -> Vec<&'a str> {
        match self.node(name) {
            Some(node) => self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Direct successors of `name`.
    pub fn successors_of(&self, name: &str) -> Vec<&'a str> {
        match self.node(name) {
            Some(node) => self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .collect(),
            None => Vec::new(),
        }
    }

    /// `roots` plus everything reachable from them.
    pub fn downstream_closure<'n>(&self, roots: impl IntoIterator<Item = &'n str>) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for root in roots {
            let Some(start) = self.node(root) else {
                continue;
            };
            let mut dfs = Dfs::new(&self.graph, start);
            while let Some(node) = dfs.next(&self.graph) {
                out.insert(node.to_string());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::descriptor::{BaseTask, TaskKind};

    fn scope(spec: &[(&str, Option<&str>)]) -> BTreeMap<String, TaskInfo> {
        spec.iter()
            .map(|(name, next)| {
                let task = BaseTask {
                    name: name.to_string(),
                    next: next.map(str::to_string),
                    input_mappings: vec![],
                    output_mappings: vec![],
                    tolerance: false,
                    retry: None,
                    timeline: None,
                    kind: TaskKind::Pass,
                };
                (name.to_string(), TaskInfo::root(task))
            })
            .collect()
    }

    #[test]
    fn diamond_predecessors_and_closure() {
        let tasks = scope(&[
            ("A", Some("B,C")),
            ("B", Some("D")),
            ("C", Some("D")),
            ("D", None),
            ("E", None),
        ]);
        let graph = ScopeGraph::from_tasks(&tasks);

        let mut preds = graph.predecessors_of("D");
        preds.sort();
        assert_eq!(preds, vec!["B", "C"]);
        assert!(graph.predecessors_of("A").is_empty());

        let closure = graph.downstream_closure(["B"]);
        assert_eq!(closure.into_iter().collect::<Vec<_>>(), vec!["B", "D"]);
    }

    #[test]
    fn dangling_next_is_ignored() {
        let tasks = scope(&[("A", Some("missing"))]);
        let graph = ScopeGraph::from_tasks(&tasks);
        assert!(graph.successors_of("A").is_empty());
    }
}
