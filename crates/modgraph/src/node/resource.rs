use super::*;
use crate::addrs::ResourceMode;
use crate::config;
use crate::references::{references_in, references_in_expr};
use std::sync::Arc;

/// `<type>.<name>` or `data.<type>.<name>`
///
/// A resource with `count` or `for_each` stays a single node per module instance, its own
/// instances are evaluated together. The node also stands for the destroy phase of the
/// resource.
#[derive(Debug, Clone)]
pub struct ResourceNode<S> {
    pub scope: S,
    pub config: Arc<config::Resource>,
}

impl<S: ModulePath> GraphNodeAddressable for ResourceNode<S> {
    type Scope = S;

    fn address(&self) -> Address {
        Address::Resource(self.config.addr.clone())
    }

    fn scope(&self) -> &S {
        &self.scope
    }
}

impl<S: ModulePath> GraphNodeReferenceable for ResourceNode<S> {
    fn referenceable_addrs(&self) -> Vec<Referenceable> {
        vec![
            Referenceable::Resource {
                resource: self.config.addr.clone(),
                key: None,
            },
            Referenceable::ResourceDestroy(self.config.addr.clone()),
        ]
    }
}

impl<S: ModulePath> GraphNodeReferencer for ResourceNode<S> {
    fn references(&self) -> ReferenceSet {
        let mut references = references_in(self.config.repetition.expr());
        references.extend(references_in_expr(&self.config.body));
        references.extend(references_in(self.config.depends_on.as_ref()));
        references.at(&self.config.pos).with_destroy_references()
    }
}

impl<S> RemovableIfNotTargeted for ResourceNode<S> {
    fn remove_if_not_targeted(&self) -> bool {
        true
    }
}

impl<S> GraphNodeDotter for ResourceNode<S> {
    fn dot_node(&self, name: &str) -> DotNode {
        match self.config.addr.mode {
            ResourceMode::Managed => DotNode::new(name, "box"),
            ResourceMode::Data => DotNode::new(name, "cylinder"),
        }
    }
}

impl GraphNodeDynamicExpandable for ResourceNode<Module> {
    fn dynamic_expand(&self, ctx: &dyn EvalContext) -> Result<Graph<ConcreteNode>, Error> {
        expand_instances(&self.scope, ctx, |scope| {
            ConcreteNode::Resource(ResourceNode {
                scope,
                config: self.config.clone(),
            })
        })
    }
}

impl GraphNodeEvaluable for ResourceNode<ModuleInstance> {
    fn eval_step(&self) -> EvalStep<'_> {
        EvalStep::Resource {
            addr: AbsAddress::new(self.scope.clone(), self.address()),
            repetition: &self.config.repetition,
            body: &self.config.body,
        }
    }
}
