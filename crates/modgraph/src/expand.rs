//! Dynamic expansion of static nodes into concrete nodes
//!
//! The engine grows one concrete graph. Nodes are added per static node through
//! [ExpansionEngine::expand_node] and connected afterwards with [ExpansionEngine::connect], which
//! resolves their references against the concrete addresses added so far. Dependencies must
//! therefore be expanded before their dependents.
use crate::addrs::{AbsAddress, ConfigAddress, ModuleInstance, Referenceable};
use crate::builder::{connect_node, ReferenceMap};
use crate::config::Limits;
use crate::error::{BuildErrors, Error};
use crate::eval::EvalContext;
use crate::graph::Graph;
use crate::node::{ConcreteNode, GraphNodeDynamicExpandable, StaticNode};
use parking_lot::Mutex;
use petgraph::stable_graph::NodeIndex;

/// A concrete node was created
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionEvent {
    /// Static node the concrete node was expanded from
    pub origin: ConfigAddress,
    pub address: AbsAddress,
}

/// Receives one event per concrete node the engine creates
pub trait ExpansionObserver: Send + Sync {
    fn node_expanded(&self, event: &ExpansionEvent);
}

/// Emits every event as a `tracing` event
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ExpansionObserver for TracingObserver {
    fn node_expanded(&self, event: &ExpansionEvent) {
        tracing::trace!(origin=%event.origin, address=%event.address, "node expanded");
    }
}

/// Keeps every event, in the order they happened
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ExpansionEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ExpansionEvent> {
        self.events.lock().clone()
    }
}

impl ExpansionObserver for RecordingObserver {
    fn node_expanded(&self, event: &ExpansionEvent) {
        self.events.lock().push(event.clone());
    }
}

pub struct ExpansionEngine<'o> {
    graph: Graph<ConcreteNode>,
    refs: ReferenceMap<ModuleInstance>,
    observer: &'o dyn ExpansionObserver,
    limits: Limits,
}

impl<'o> ExpansionEngine<'o> {
    pub fn new(limits: Limits, observer: &'o dyn ExpansionObserver) -> Self {
        Self {
            graph: Graph::new(),
            refs: ReferenceMap::new().with_call_fallback(),
            observer,
            limits,
        }
    }

    pub fn graph(&self) -> &Graph<ConcreteNode> {
        &self.graph
    }

    pub fn into_graph(self) -> Graph<ConcreteNode> {
        self.graph
    }

    /// Adds the concrete nodes of `node`, without edges
    pub fn expand_node(
        &mut self,
        node: &StaticNode,
        ctx: &dyn EvalContext,
    ) -> Result<Vec<NodeIndex>, Error> {
        let expanded = node.dynamic_expand(ctx)?;

        let total = self.graph.len() + expanded.len();
        if total > self.limits.max_graph_nodes {
            return Err(Error::LimitExceeded {
                what: "graph nodes",
                limit: self.limits.max_graph_nodes,
                actual: total,
            });
        }

        let origin = node.config_addr();
        let mut added = Vec::with_capacity(expanded.len());
        for concrete in expanded.into_nodes() {
            self.observer.node_expanded(&ExpansionEvent {
                origin: origin.clone(),
                address: concrete.addr(),
            });

            let index = self.graph.add(concrete);
            self.refs.insert(index, self.graph.node(index));
            added.push(index);
        }

        if added.is_empty() {
            tracing::debug!(node=%origin, "module has no instances, nothing expanded");
        }
        Ok(added)
    }

    /// Adds the edges of freshly expanded nodes
    ///
    /// Explicit instance keys of module references are checked against the recorded repetition.
    pub fn connect(&mut self, indices: &[NodeIndex], ctx: &dyn EvalContext) -> Result<(), BuildErrors> {
        let expander = ctx.instance_expander();
        let check = |scope: &ModuleInstance, reference: &Referenceable| match reference {
            Referenceable::ModuleCall {
                call,
                key: Some(key),
                ..
            } => expander.check_key(scope, call, key),
            _ => Ok(()),
        };

        let mut issues = BuildErrors::new();
        for index in indices {
            connect_node(&mut self.graph, &self.refs, *index, &check, &mut issues);
        }
        issues.into_result()
    }

    /// Expands a whole static graph at once
    ///
    /// Every module repetition must already be known to the expander of `ctx`.
    pub fn expand_graph(
        mut self,
        graph: &Graph<StaticNode>,
        ctx: &dyn EvalContext,
    ) -> Result<Graph<ConcreteNode>, Error> {
        for level in graph.topological_levels()? {
            let mut added = vec![];
            for index in level {
                added.extend(self.expand_node(graph.node(index), ctx)?);
            }
            self.connect(&added, ctx)?;
        }

        tracing::debug!(
            nodes = self.graph.len(),
            edges = self.graph.edge_count(),
            "graph expanded"
        );
        Ok(self.graph)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::StaticGraphBuilder;
    use crate::config::{Configuration, MemoryLoader};
    use crate::eval::EvalScope;
    use crate::expander::{InstanceExpander, Repetition};
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    /// Only knows the expander, expansion never evaluates
    struct ExpanderOnly(InstanceExpander);

    impl EvalContext for ExpanderOnly {
        fn instance_expander(&self) -> &InstanceExpander {
            &self.0
        }

        fn evaluate(&self, _: &hcl::Expression, _: &EvalScope) -> Result<hcl::Value, String> {
            Err("not available".to_string())
        }

        fn root_input(&self, _: &str) -> Option<hcl::Value> {
            None
        }
    }

    fn static_graph(main: &str, child: &str) -> Graph<StaticNode> {
        let loader = MemoryLoader::new()
            .with_file("main.hcl", main)
            .with_file("child/main.hcl", child);
        let config = Configuration::load(&loader, "", &Limits::default()).unwrap();
        StaticGraphBuilder::new(&config).build().unwrap()
    }

    fn expanded(graph: &Graph<StaticNode>, repetition: Repetition) -> Result<Graph<ConcreteNode>, Error> {
        let mut expander = InstanceExpander::default();
        expander
            .set_repetition(&ModuleInstance::root(), "child", repetition)
            .unwrap();
        let observer = TracingObserver;
        ExpansionEngine::new(Limits::default(), &observer).expand_graph(graph, &ExpanderOnly(expander))
    }

    const MAIN: &str = r#"
        module "child" {
          source = "./child"
          count  = 2
          y      = "v"
        }
        output "all" { value = module.child[*].x }
        output "first" { value = module.child[0].x }
    "#;

    const CHILD: &str = r#"
        variable "y" {}
        locals { x = var.y }
        output "x" { value = local.x }
    "#;

    #[test]
    fn repeated_module() {
        let graph = expanded(&static_graph(MAIN, CHILD), Repetition::Count(2)).unwrap();

        assert_snapshot!(graph.describe(), @r###"
        module.child
        module.child[0].local.x
          -> module.child
          -> module.child[0].var.y
        module.child[0].output.x
          -> module.child
          -> module.child[0].local.x
        module.child[0].var.y
          -> module.child
        module.child[1].local.x
          -> module.child
          -> module.child[1].var.y
        module.child[1].output.x
          -> module.child
          -> module.child[1].local.x
        module.child[1].var.y
          -> module.child
        output.all
          -> module.child[0].output.x
          -> module.child[1].output.x
        output.first
          -> module.child[0].output.x
        "###);
    }

    #[test]
    fn instance_keys_are_checked() {
        let error = expanded(&static_graph(MAIN, CHILD), Repetition::Single).unwrap_err();
        assert_eq!(
            error.to_string(),
            "main.hcl:8:9: output.first: invalid reference: module.child is not repeated and can not be indexed"
        );
    }

    #[test]
    fn events_are_recorded() {
        let graph = static_graph(MAIN, CHILD);
        let mut expander = InstanceExpander::default();
        expander
            .set_repetition(&ModuleInstance::root(), "child", Repetition::Count(2))
            .unwrap();
        let ctx = ExpanderOnly(expander);

        let observer = RecordingObserver::default();
        let mut engine = ExpansionEngine::new(Limits::default(), &observer);
        let local = graph.find("module.child.local.x").unwrap();
        let added = engine.expand_node(graph.node(local), &ctx).unwrap();

        assert_eq!(added.len(), 2);
        assert_eq!(
            observer
                .events()
                .iter()
                .map(|event| format!("{} -> {}", event.origin, event.address))
                .collect::<Vec<_>>(),
            vec![
                "module.child.local.x -> module.child[0].local.x",
                "module.child.local.x -> module.child[1].local.x",
            ]
        );
    }

    #[test]
    fn node_limit() {
        let graph = static_graph(MAIN, CHILD);
        let mut expander = InstanceExpander::default();
        expander
            .set_repetition(&ModuleInstance::root(), "child", Repetition::Count(3))
            .unwrap();

        let limits = Limits {
            max_graph_nodes: 4,
            ..Default::default()
        };
        let observer = TracingObserver;
        let error = ExpansionEngine::new(limits, &observer)
            .expand_graph(&graph, &ExpanderOnly(expander))
            .unwrap_err();

        assert!(matches!(
            error,
            Error::LimitExceeded {
                what: "graph nodes",
                limit: 4,
                ..
            }
        ));
    }
}
