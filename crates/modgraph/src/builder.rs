//! Static graph: one node per declaration per module
use crate::addrs::{ModulePath, Referenceable};
use crate::config::{Configuration, ModuleConfig};
use crate::error::{BuildErrors, Issue};
use crate::graph::Graph;
use crate::node::{
    GraphNodeReferenceable, GraphNodeReferencer, LocalNode, ModuleCallNode,
    OutputNode, ResourceNode, StaticNode, VariableNode,
};
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;
use std::fmt;

/// Referenceable addresses of graph nodes, by the scope they are visible in
#[derive(Debug)]
pub struct ReferenceMap<S> {
    by_scope: HashMap<S, Vec<(Referenceable, NodeIndex)>>,
    call_fallback: bool,
}

impl<S> Default for ReferenceMap<S> {
    fn default() -> Self {
        Self {
            by_scope: HashMap::new(),
            call_fallback: false,
        }
    }
}

impl<S: ModulePath> ReferenceMap<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `module.<call>.<output>` resolve to the call node when no output instance matches
    ///
    /// Concrete graphs need this for calls without instances, their outputs never exist.
    pub fn with_call_fallback(mut self) -> Self {
        self.call_fallback = true;
        self
    }

    /// Records every address `node` advertises
    pub fn insert<N>(&mut self, index: NodeIndex, node: &N)
    where
        N: GraphNodeReferenceable<Scope = S>,
    {
        let Some(scope) = node.referenceable_scope() else {
            return;
        };

        let entries = self.by_scope.entry(scope).or_default();
        for addr in node.referenceable_addrs() {
            entries.push((addr, index));
        }
    }

    /// Nodes reached by a reference made inside `scope`
    pub fn resolve(&self, scope: &S, reference: &Referenceable) -> Vec<NodeIndex> {
        let Some(entries) = self.by_scope.get(scope) else {
            return vec![];
        };

        let mut found: Vec<NodeIndex> = entries
            .iter()
            .filter(|(advertised, _)| reference.covers(advertised))
            .map(|(_, index)| *index)
            .collect();
        found.dedup();

        if found.is_empty() && self.call_fallback {
            if let Referenceable::ModuleCall {
                call,
                key: None,
                output: Some(_),
            } = reference
            {
                let call = Referenceable::module_call(call.clone());
                found.extend(
                    entries
                        .iter()
                        .filter(|(advertised, _)| advertised == &call)
                        .map(|(_, index)| *index),
                );
            }
        }
        found
    }

    /// Module call node that expands the module `scope` belongs to
    pub fn expansion_node(&self, scope: &S) -> Option<NodeIndex> {
        let (parent, call) = scope.parent_call()?;
        let call = Referenceable::module_call(call);

        self.by_scope
            .get(&parent)?
            .iter()
            .find(|(advertised, _)| advertised == &call)
            .map(|(_, index)| *index)
    }
}

/// Adds the edges of one node: one per resolved reference and one to the module call that
/// expands its module
///
/// `check` validates a reference before it is resolved, its error becomes an
/// [Issue::InvalidAddress].
pub(crate) fn connect_node<N>(
    graph: &mut Graph<N>,
    refs: &ReferenceMap<N::Scope>,
    index: NodeIndex,
    check: impl Fn(&N::Scope, &Referenceable) -> Result<(), String>,
    issues: &mut BuildErrors,
) where
    N: GraphNodeReferencer + fmt::Display,
{
    let node = graph.node(index);
    let name = node.to_string();
    let references = node.references();

    for diagnostic in references.diagnostics() {
        if diagnostic.is_error() {
            issues.log(Issue::InvalidAddress {
                node: name.clone(),
                message: diagnostic.to_string(),
                pos: references.pos().cloned(),
            });
        } else {
            tracing::warn!(node=%name, %diagnostic, "references may be incomplete");
        }
    }

    let mut dependencies = vec![];
    if let Some(scope) = node.reference_scope() {
        for reference in references.iter() {
            if reference.subject.is_contextual() {
                continue;
            }

            if let Err(message) = check(&scope, &reference.subject) {
                issues.log(Issue::InvalidAddress {
                    node: name.clone(),
                    message,
                    pos: reference.pos.clone(),
                });
                continue;
            }

            let found = refs.resolve(&scope, &reference.subject);
            if found.is_empty() {
                if reference.subject.is_ordering_only() {
                    continue;
                }

                issues.log(Issue::UnresolvedReference {
                    node: name.clone(),
                    reference: reference.subject.to_string(),
                    pos: reference.pos.clone(),
                });
                continue;
            }

            tracing::trace!(node=%name, reference=%reference.subject, targets = found.len(), "reference resolved");
            dependencies.extend(found);
        }
    }

    dependencies.extend(refs.expansion_node(node.scope()));

    for dependency in dependencies {
        graph.connect(index, dependency);
    }
}

/// Builds the static graph of a [Configuration]
#[derive(derive_new::new)]
pub struct StaticGraphBuilder<'c> {
    config: &'c Configuration,
}

impl<'c> StaticGraphBuilder<'c> {
    pub fn build(&self) -> Result<Graph<StaticNode>, BuildErrors> {
        let mut graph = Graph::new();
        let mut refs = ReferenceMap::new();

        for module in self.config.iter() {
            for node in self.module_nodes(module) {
                let index = graph.add(node);
                refs.insert(index, graph.node(index));
            }
        }

        let mut issues = BuildErrors::new();
        let indices: Vec<_> = graph.indices().collect();
        for index in indices {
            connect_node(&mut graph, &refs, index, |_, _| Ok(()), &mut issues);
        }

        tracing::debug!(
            nodes = graph.len(),
            edges = graph.edge_count(),
            issues = issues.issues().len(),
            "static graph built"
        );

        issues.into_result()?;
        Ok(graph)
    }

    /// The call that declares `module`, if it is not the root module
    fn calling(&self, module: &ModuleConfig) -> Option<&crate::config::ModuleCall> {
        let (parent, call) = module.path.parent()?;
        self.config
            .descendant(&parent)?
            .module
            .module_calls
            .get(call)
            .map(AsRef::as_ref)
    }

    fn module_nodes(&self, module: &Configuration) -> Vec<StaticNode> {
        let config = &module.module;
        let scope = &module.path;
        let call = self.calling(config);

        let locals = config.locals.values().map(|local| {
            StaticNode::Local(LocalNode {
                scope: scope.clone(),
                config: local.clone(),
            })
        });

        let variables = config.variables.values().map(|variable| {
            StaticNode::Variable(VariableNode {
                scope: scope.clone(),
                config: variable.clone(),
                argument: call.and_then(|call| call.arguments.get(&variable.name).cloned()),
            })
        });

        let outputs = config.outputs.values().map(|output| {
            StaticNode::Output(OutputNode {
                scope: scope.clone(),
                config: output.clone(),
            })
        });

        let calls = config.module_calls.values().map(|call| {
            StaticNode::ModuleCall(ModuleCallNode {
                scope: scope.clone(),
                config: call.clone(),
            })
        });

        let resources = config.resources.values().map(|resource| {
            StaticNode::Resource(ResourceNode {
                scope: scope.clone(),
                config: resource.clone(),
            })
        });

        locals
            .chain(variables)
            .chain(outputs)
            .chain(calls)
            .chain(resources)
            .inspect(|node| tracing::trace!(%node, "static node"))
            .collect()
    }
}
