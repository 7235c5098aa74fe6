use super::*;
use crate::config;
use crate::references::references_in_expr;
use std::sync::Arc;

/// `local.<name>`
#[derive(Debug, Clone)]
pub struct LocalNode<S> {
    pub scope: S,
    pub config: Arc<config::Local>,
}

impl<S: ModulePath> GraphNodeAddressable for LocalNode<S> {
    type Scope = S;

    fn address(&self) -> Address {
        Address::Local(self.config.name.clone())
    }

    fn scope(&self) -> &S {
        &self.scope
    }
}

impl<S: ModulePath> GraphNodeReferenceable for LocalNode<S> {
    fn referenceable_addrs(&self) -> Vec<Referenceable> {
        vec![Referenceable::Local(self.config.name.clone())]
    }
}

impl<S: ModulePath> GraphNodeReferencer for LocalNode<S> {
    fn references(&self) -> ReferenceSet {
        references_in_expr(&self.config.expr)
            .at(&self.config.pos)
            .with_destroy_references()
    }
}

impl<S> RemovableIfNotTargeted for LocalNode<S> {
    fn remove_if_not_targeted(&self) -> bool {
        true
    }
}

impl<S> GraphNodeDotter for LocalNode<S> {
    fn dot_node(&self, name: &str) -> DotNode {
        DotNode::new(name, "note")
    }
}

impl GraphNodeDynamicExpandable for LocalNode<Module> {
    fn dynamic_expand(&self, ctx: &dyn EvalContext) -> Result<Graph<ConcreteNode>, Error> {
        expand_instances(&self.scope, ctx, |scope| {
            ConcreteNode::Local(LocalNode {
                scope,
                config: self.config.clone(),
            })
        })
    }
}

impl GraphNodeEvaluable for LocalNode<ModuleInstance> {
    fn eval_step(&self) -> EvalStep<'_> {
        EvalStep::Value {
            addr: AbsAddress::new(self.scope.clone(), self.address()),
            expr: &self.config.expr,
        }
    }
}
