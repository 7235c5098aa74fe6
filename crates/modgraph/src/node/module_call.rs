use super::*;
use crate::config;
use crate::references::references_in;
use std::sync::Arc;

/// `module.<name>`, decides how many instances of the called module exist
///
/// Every node inside the called module depends on this node.
#[derive(Debug, Clone)]
pub struct ModuleCallNode<S> {
    /// Module the call is declared in
    pub scope: S,
    pub config: Arc<config::ModuleCall>,
}

impl<S: ModulePath> GraphNodeAddressable for ModuleCallNode<S> {
    type Scope = S;

    fn address(&self) -> Address {
        Address::ModuleCall(self.config.name.clone())
    }

    fn scope(&self) -> &S {
        &self.scope
    }
}

impl<S: ModulePath> GraphNodeReferenceable for ModuleCallNode<S> {
    fn referenceable_addrs(&self) -> Vec<Referenceable> {
        vec![Referenceable::module_call(self.config.name.clone())]
    }
}

impl<S: ModulePath> GraphNodeReferencer for ModuleCallNode<S> {
    fn references(&self) -> ReferenceSet {
        let mut references = references_in(self.config.repetition.expr());
        references.extend(references_in(self.config.depends_on.as_ref()));
        references.at(&self.config.pos)
    }
}

impl<S> RemovableIfNotTargeted for ModuleCallNode<S> {
    fn remove_if_not_targeted(&self) -> bool {
        true
    }
}

impl<S> GraphNodeDotter for ModuleCallNode<S> {
    fn dot_node(&self, name: &str) -> DotNode {
        DotNode::new(name, "box3d")
    }
}

impl GraphNodeDynamicExpandable for ModuleCallNode<Module> {
    fn dynamic_expand(&self, ctx: &dyn EvalContext) -> Result<Graph<ConcreteNode>, Error> {
        expand_instances(&self.scope, ctx, |scope| {
            ConcreteNode::ModuleCall(ModuleCallNode {
                scope,
                config: self.config.clone(),
            })
        })
    }
}

impl GraphNodeEvaluable for ModuleCallNode<ModuleInstance> {
    fn eval_step(&self) -> EvalStep<'_> {
        EvalStep::ModuleExpansion {
            parent: &self.scope,
            call: &self.config.name,
            repetition: &self.config.repetition,
        }
    }
}
