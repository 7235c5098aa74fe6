//! Directed dependency graph
//!
//! Edges point from a consumer to its dependency, a topological order therefore lists
//! dependencies first.
use crate::error::Error;
use crate::node::{GraphNodeDotter, RemovableIfNotTargeted};
use petgraph::dot::{Config, Dot};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug)]
pub struct Graph<N> {
    inner: StableDiGraph<N, ()>,
}

impl<N> Default for Graph<N> {
    fn default() -> Self {
        Self {
            inner: StableDiGraph::default(),
        }
    }
}

impl<N> Graph<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: N) -> NodeIndex {
        self.inner.add_node(node)
    }

    /// Records that `consumer` depends on `dependency`
    ///
    /// Connecting the same pair twice has no effect.
    pub fn connect(&mut self, consumer: NodeIndex, dependency: NodeIndex) {
        self.inner.update_edge(consumer, dependency, ());
    }

    /// # Panic
    /// Panics when the node does not exist
    pub fn node(&self, index: NodeIndex) -> &N {
        &self.inner[index]
    }

    pub fn get(&self, index: NodeIndex) -> Option<&N> {
        self.inner.node_weight(index)
    }

    /// Removes a node and all its edges
    pub fn remove(&mut self, index: NodeIndex) -> Option<N> {
        self.inner.remove_node(index)
    }

    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inner.node_indices()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &N)> {
        self.inner
            .node_indices()
            .map(|index| (index, &self.inner[index]))
    }

    /// Consumes the graph, returning its nodes
    pub fn into_nodes(mut self) -> Vec<N> {
        let indices: Vec<_> = self.inner.node_indices().collect();
        indices
            .into_iter()
            .filter_map(|index| self.inner.remove_node(index))
            .collect()
    }

    pub fn dependencies(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inner.neighbors_directed(index, Direction::Outgoing)
    }

    pub fn dependents(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inner.neighbors_directed(index, Direction::Incoming)
    }

    /// All edges as `(consumer, dependency)`
    pub fn edges(&self) -> Vec<(NodeIndex, NodeIndex)> {
        self.inner
            .edge_indices()
            .filter_map(|edge| self.inner.edge_endpoints(edge))
            .collect()
    }

    /// Strongly connected components with more than one node, and nodes depending on themselves
    pub fn cycles(&self) -> Vec<Vec<NodeIndex>> {
        petgraph::algo::tarjan_scc(&self.inner)
            .into_iter()
            .filter(|component| match component.as_slice() {
                [single] => self.inner.contains_edge(*single, *single),
                _ => true,
            })
            .collect()
    }
}

impl<N: fmt::Display> Graph<N> {
    fn name(&self, index: NodeIndex) -> String {
        self.inner[index].to_string()
    }

    /// Index of the node with the given name
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.nodes()
            .find(|(_, node)| node.to_string() == name)
            .map(|(index, _)| index)
    }

    /// Nodes grouped in levels, each level depending only on earlier levels
    ///
    /// Levels are sorted by node name. Fails with [Error::Cycle] if the graph has a cycle.
    pub fn topological_levels(&self) -> Result<Vec<Vec<NodeIndex>>, Error> {
        let mut pending: HashMap<NodeIndex, usize> = self
            .indices()
            .map(|index| (index, self.dependencies(index).count()))
            .collect();

        let mut level: Vec<NodeIndex> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| *index)
            .collect();

        let mut levels = vec![];
        while !level.is_empty() {
            level.sort_by_cached_key(|index| self.name(*index));

            let mut next = vec![];
            for index in &level {
                pending.remove(index);
            }
            for index in &level {
                for dependent in self.dependents(*index) {
                    let Some(count) = pending.get_mut(&dependent) else {
                        continue;
                    };
                    *count -= 1;
                    if *count == 0 {
                        next.push(dependent);
                    }
                }
            }

            levels.push(level);
            level = next;
        }

        if !pending.is_empty() {
            return Err(self.cycle_error());
        }

        Ok(levels)
    }

    fn cycle_error(&self) -> Error {
        let mut cycles: Vec<Vec<String>> = self
            .cycles()
            .into_iter()
            .map(|cycle| {
                let mut names: Vec<String> =
                    cycle.into_iter().map(|index| self.name(index)).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();

        tracing::debug!(?cycles, "cycle detected");
        Error::Cycle { cycles }
    }

    /// Sorted text listing of nodes and their dependencies
    pub fn describe(&self) -> String {
        let mut entries: Vec<String> = self
            .indices()
            .map(|index| {
                let mut dependencies: Vec<String> = self
                    .dependencies(index)
                    .map(|dependency| self.name(dependency))
                    .collect();
                dependencies.sort();

                let mut entry = self.name(index);
                for dependency in dependencies {
                    entry.push_str("\n  -> ");
                    entry.push_str(&dependency);
                }
                entry
            })
            .collect();

        entries.sort();
        entries.join("\n")
    }
}

impl<N: GraphNodeDotter + fmt::Display + fmt::Debug> Graph<N> {
    /// Renders the graph in graphviz dot format
    pub fn to_dot(&self) -> String {
        let dot = Dot::with_attr_getters(
            &self.inner,
            &[Config::EdgeNoLabel, Config::NodeNoLabel],
            &|_, _| String::new(),
            &|_, (_, node)| {
                node.dot_node(&node.to_string())
                    .attrs
                    .iter()
                    .map(|(key, value)| format!("{key} = \"{}\" ", value.replace('"', "\\\"")))
                    .collect::<String>()
            },
        );

        format!("{dot:?}")
    }
}

/// Removes every node that is neither targeted nor needed by a kept node
///
/// Nodes that must not be removed (see [RemovableIfNotTargeted]) are always kept. Returns the
/// number of removed nodes.
pub fn prune_untargeted<N: RemovableIfNotTargeted>(
    graph: &mut Graph<N>,
    is_targeted: impl Fn(&N) -> bool,
) -> usize {
    let mut keep: HashSet<NodeIndex> = HashSet::new();
    let mut stack: Vec<NodeIndex> = graph
        .nodes()
        .filter(|(_, node)| is_targeted(*node) || !node.remove_if_not_targeted())
        .map(|(index, _)| index)
        .collect();

    while let Some(index) = stack.pop() {
        if keep.insert(index) {
            stack.extend(graph.dependencies(index));
        }
    }

    let remove: Vec<NodeIndex> = graph.indices().filter(|index| !keep.contains(index)).collect();
    for index in &remove {
        graph.remove(*index);
    }

    tracing::debug!(removed = remove.len(), kept = keep.len(), "pruned untargeted nodes");
    remove.len()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::node::DotNode;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    /// Minimal node for graph tests
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct TestNode {
        pub name: &'static str,
        pub removable: bool,
    }

    impl fmt::Display for TestNode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name)
        }
    }

    impl RemovableIfNotTargeted for TestNode {
        fn remove_if_not_targeted(&self) -> bool {
            self.removable
        }
    }

    impl GraphNodeDotter for TestNode {
        fn dot_node(&self, name: &str) -> DotNode {
            DotNode::new(name, "box")
        }
    }

    fn graph(names: &[&'static str], edges: &[(usize, usize)]) -> (Graph<TestNode>, Vec<NodeIndex>) {
        let mut graph = Graph::new();
        let indices: Vec<_> = names
            .iter()
            .map(|name| {
                graph.add(TestNode {
                    name: *name,
                    removable: true,
                })
            })
            .collect();
        for (consumer, dependency) in edges {
            graph.connect(indices[*consumer], indices[*dependency]);
        }
        (graph, indices)
    }

    fn names(graph: &Graph<TestNode>, levels: Vec<Vec<NodeIndex>>) -> Vec<Vec<&'static str>> {
        levels
            .into_iter()
            .map(|level| level.into_iter().map(|index| graph.node(index).name).collect())
            .collect()
    }

    #[test]
    fn levels() {
        // d -> b -> a, d -> c -> a
        let (graph, _) = graph(&["a", "b", "c", "d"], &[(1, 0), (2, 0), (3, 1), (3, 2)]);

        let levels = graph.topological_levels().unwrap();
        assert_eq!(names(&graph, levels), vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let (mut graph, indices) = graph(&["a", "b"], &[(1, 0)]);
        graph.connect(indices[1], indices[0]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn cycles_are_reported() {
        let (graph, _) = graph(&["a", "b", "c", "s"], &[(0, 1), (1, 0), (2, 0), (3, 3)]);

        let Err(Error::Cycle { cycles }) = graph.topological_levels() else {
            panic!("cycle must be detected");
        };
        assert_eq!(
            cycles,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["s".to_string()]
            ]
        );
    }

    #[test]
    fn pruning_keeps_dependencies() {
        let (mut graph, indices) = graph(&["a", "b", "c", "d"], &[(1, 0), (3, 2)]);

        let removed = prune_untargeted(&mut graph, |node| node.name == "b");

        assert_eq!(removed, 2);
        assert_eq!(graph.len(), 2);
        assert!(graph.get(indices[2]).is_none());
        // no dangling edges
        assert_eq!(graph.edges(), vec![(indices[1], indices[0])]);
    }

    #[test]
    fn pruning_keeps_unremovable_nodes() {
        let (mut graph, _) = graph(&["a", "b"], &[(1, 0)]);
        let pinned = graph.add(TestNode {
            name: "pinned",
            removable: false,
        });

        prune_untargeted(&mut graph, |_| false);

        assert_eq!(graph.len(), 1);
        assert!(graph.get(pinned).is_some());
    }

    #[test]
    fn describe() {
        let (graph, _) = graph(&["b", "a", "c"], &[(0, 1), (2, 1), (2, 0)]);

        assert_snapshot!(graph.describe(), @r###"
        a
        b
          -> a
        c
          -> a
          -> b
        "###);
        assert_eq!(graph.find("c").map(|index| graph.node(index).name), Some("c"));
    }

    #[test]
    fn dot() {
        let (graph, _) = graph(&["a", "b"], &[(1, 0)]);
        let dot = graph.to_dot();

        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains(r#"label = "a""#));
        assert!(dot.contains(r#"shape = "box""#));
        assert!(dot.contains("1 -> 0"));
    }
}
