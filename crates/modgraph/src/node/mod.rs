//! Graph nodes
//!
//! Every declaration of the configuration becomes one node per module: a [StaticNode]. Once the
//! module instances are known a static node expands into one [ConcreteNode] per module instance.
//!
//! The graph builder, the expansion engine and the walk only act through the capability traits
//! defined here. Each kind of declaration lives in its own module and is generic over its scope
//! ([Module] while static, [ModuleInstance] while concrete).
mod local;
mod module_call;
mod output;
mod resource;
mod variable;

pub use local::LocalNode;
pub use module_call::ModuleCallNode;
pub use output::OutputNode;
pub use resource::ResourceNode;
pub use variable::VariableNode;

use crate::addrs::{AbsAddress, Address, ConfigAddress, Module, ModuleInstance, ModulePath, Referenceable};
use crate::error::Error;
use crate::eval::{EvalContext, EvalStep};
use crate::graph::Graph;
use crate::references::ReferenceSet;
use indexmap::IndexMap;
use std::fmt;

/// Node with an address inside a module
pub trait GraphNodeAddressable {
    /// [Module] for static nodes, [ModuleInstance] for concrete nodes
    type Scope: ModulePath;

    /// Address relative to the scope
    fn address(&self) -> Address;

    fn scope(&self) -> &Self::Scope;

    /// Full address, used as the name of the node
    fn name(&self) -> String {
        let scope = self.scope().to_string();
        if scope.is_empty() {
            self.address().to_string()
        } else {
            format!("{scope}.{}", self.address())
        }
    }

    fn module_path(&self) -> Module {
        self.scope().to_module()
    }
}

/// Node that can be the subject of references
pub trait GraphNodeReferenceable: GraphNodeAddressable {
    fn referenceable_addrs(&self) -> Vec<Referenceable>;

    /// Scope the addresses are visible in, `None` if they are not visible anywhere
    fn referenceable_scope(&self) -> Option<Self::Scope> {
        Some(self.scope().clone())
    }
}

/// Node with expressions that refer to other nodes
pub trait GraphNodeReferencer: GraphNodeAddressable {
    fn references(&self) -> ReferenceSet;

    /// Scope the references are resolved in, `None` if there is nothing to resolve
    fn reference_scope(&self) -> Option<Self::Scope> {
        Some(self.scope().clone())
    }
}

/// Static node that is replaced by concrete nodes once its module's instances are known
pub trait GraphNodeDynamicExpandable {
    /// One concrete node per instance of the module, without edges
    fn dynamic_expand(&self, ctx: &dyn EvalContext) -> Result<Graph<ConcreteNode>, Error>;
}

/// Concrete node the walk can evaluate
pub trait GraphNodeEvaluable {
    fn eval_step(&self) -> EvalStep<'_>;
}

/// Node that may be dropped when a walk is targeted at other nodes
pub trait RemovableIfNotTargeted {
    fn remove_if_not_targeted(&self) -> bool;
}

/// Node that can be rendered in a dot graph
pub trait GraphNodeDotter {
    fn dot_node(&self, name: &str) -> DotNode;
}

/// Rendering of a single node
#[derive(Debug, Clone, PartialEq)]
pub struct DotNode {
    pub name: String,
    pub attrs: IndexMap<String, String>,
}

impl DotNode {
    pub fn new(name: &str, shape: &str) -> Self {
        let mut attrs = IndexMap::new();
        attrs.insert("label".to_string(), name.to_string());
        attrs.insert("shape".to_string(), shape.to_string());

        Self {
            name: name.to_string(),
            attrs,
        }
    }
}

/// One concrete node for every instance of `module`
fn expand_instances(
    module: &Module,
    ctx: &dyn EvalContext,
    node: impl Fn(ModuleInstance) -> ConcreteNode,
) -> Result<Graph<ConcreteNode>, Error> {
    let mut graph = Graph::new();
    for instance in ctx.instance_expander().expand_module(module)? {
        graph.add(node(instance));
    }
    Ok(graph)
}

/// Runs `$body` with `$kind` bound to the node of whatever variant `$node` is
macro_rules! each_kind {
    ($node:expr, $kind:ident => $body:expr) => {
        match $node {
            Self::Local($kind) => $body,
            Self::Variable($kind) => $body,
            Self::Output($kind) => $body,
            Self::ModuleCall($kind) => $body,
            Self::Resource($kind) => $body,
        }
    };
}

/// Declaration of a module, not yet expanded
#[derive(Debug, Clone)]
pub enum StaticNode {
    Local(LocalNode<Module>),
    Variable(VariableNode<Module>),
    Output(OutputNode<Module>),
    ModuleCall(ModuleCallNode<Module>),
    Resource(ResourceNode<Module>),
}

impl StaticNode {
    pub fn config_addr(&self) -> ConfigAddress {
        ConfigAddress::new(self.module_path(), self.address())
    }
}

impl GraphNodeAddressable for StaticNode {
    type Scope = Module;

    fn address(&self) -> Address {
        each_kind!(self, node => node.address())
    }

    fn scope(&self) -> &Module {
        each_kind!(self, node => node.scope())
    }
}

impl GraphNodeReferenceable for StaticNode {
    fn referenceable_addrs(&self) -> Vec<Referenceable> {
        each_kind!(self, node => node.referenceable_addrs())
    }

    fn referenceable_scope(&self) -> Option<Module> {
        each_kind!(self, node => node.referenceable_scope())
    }
}

impl GraphNodeReferencer for StaticNode {
    fn references(&self) -> ReferenceSet {
        each_kind!(self, node => node.references())
    }

    fn reference_scope(&self) -> Option<Module> {
        each_kind!(self, node => node.reference_scope())
    }
}

impl GraphNodeDynamicExpandable for StaticNode {
    fn dynamic_expand(&self, ctx: &dyn EvalContext) -> Result<Graph<ConcreteNode>, Error> {
        each_kind!(self, node => node.dynamic_expand(ctx))
    }
}

impl RemovableIfNotTargeted for StaticNode {
    fn remove_if_not_targeted(&self) -> bool {
        each_kind!(self, node => node.remove_if_not_targeted())
    }
}

impl GraphNodeDotter for StaticNode {
    fn dot_node(&self, name: &str) -> DotNode {
        each_kind!(self, node => node.dot_node(name))
    }
}

impl fmt::Display for StaticNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Declaration inside one module instance
#[derive(Debug, Clone)]
pub enum ConcreteNode {
    Local(LocalNode<ModuleInstance>),
    Variable(VariableNode<ModuleInstance>),
    Output(OutputNode<ModuleInstance>),
    ModuleCall(ModuleCallNode<ModuleInstance>),
    Resource(ResourceNode<ModuleInstance>),
}

impl ConcreteNode {
    pub fn addr(&self) -> AbsAddress {
        AbsAddress::new(self.scope().clone(), self.address())
    }
}

impl GraphNodeAddressable for ConcreteNode {
    type Scope = ModuleInstance;

    fn address(&self) -> Address {
        each_kind!(self, node => node.address())
    }

    fn scope(&self) -> &ModuleInstance {
        each_kind!(self, node => node.scope())
    }
}

impl GraphNodeReferenceable for ConcreteNode {
    fn referenceable_addrs(&self) -> Vec<Referenceable> {
        each_kind!(self, node => node.referenceable_addrs())
    }

    fn referenceable_scope(&self) -> Option<ModuleInstance> {
        each_kind!(self, node => node.referenceable_scope())
    }
}

impl GraphNodeReferencer for ConcreteNode {
    fn references(&self) -> ReferenceSet {
        each_kind!(self, node => node.references())
    }

    fn reference_scope(&self) -> Option<ModuleInstance> {
        each_kind!(self, node => node.reference_scope())
    }
}

impl GraphNodeEvaluable for ConcreteNode {
    fn eval_step(&self) -> EvalStep<'_> {
        each_kind!(self, node => node.eval_step())
    }
}

impl RemovableIfNotTargeted for ConcreteNode {
    fn remove_if_not_targeted(&self) -> bool {
        each_kind!(self, node => node.remove_if_not_targeted())
    }
}

impl GraphNodeDotter for ConcreteNode {
    fn dot_node(&self, name: &str) -> DotNode {
        each_kind!(self, node => node.dot_node(name))
    }
}

impl fmt::Display for ConcreteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
