use super::*;
use crate::config;
use crate::references::references_in_expr;
use std::sync::Arc;

/// `var.<name>`
///
/// The value of a variable of a called module is the argument of the module call, so its
/// references belong to the calling module.
#[derive(Debug, Clone)]
pub struct VariableNode<S> {
    pub scope: S,
    pub config: Arc<config::Variable>,
    /// Argument passed by the module call, always `None` in the root module
    pub argument: Option<config::Argument>,
}

impl<S: ModulePath> GraphNodeAddressable for VariableNode<S> {
    type Scope = S;

    fn address(&self) -> Address {
        Address::Variable(self.config.name.clone())
    }

    fn scope(&self) -> &S {
        &self.scope
    }
}

impl<S: ModulePath> GraphNodeReferenceable for VariableNode<S> {
    fn referenceable_addrs(&self) -> Vec<Referenceable> {
        vec![Referenceable::Variable(self.config.name.clone())]
    }
}

impl<S: ModulePath> GraphNodeReferencer for VariableNode<S> {
    fn references(&self) -> ReferenceSet {
        match &self.argument {
            Some(argument) => references_in_expr(&argument.expr).at(&argument.pos),
            None => ReferenceSet::new(),
        }
    }

    fn reference_scope(&self) -> Option<S> {
        self.scope.parent_call().map(|(parent, _)| parent)
    }
}

impl<S> RemovableIfNotTargeted for VariableNode<S> {
    fn remove_if_not_targeted(&self) -> bool {
        true
    }
}

impl<S> GraphNodeDotter for VariableNode<S> {
    fn dot_node(&self, name: &str) -> DotNode {
        DotNode::new(name, "invhouse")
    }
}

impl GraphNodeDynamicExpandable for VariableNode<Module> {
    fn dynamic_expand(&self, ctx: &dyn EvalContext) -> Result<Graph<ConcreteNode>, Error> {
        expand_instances(&self.scope, ctx, |scope| {
            ConcreteNode::Variable(VariableNode {
                scope,
                config: self.config.clone(),
                argument: self.argument.clone(),
            })
        })
    }
}

impl GraphNodeEvaluable for VariableNode<ModuleInstance> {
    fn eval_step(&self) -> EvalStep<'_> {
        EvalStep::Variable {
            addr: AbsAddress::new(self.scope.clone(), self.address()),
            argument: self.argument.as_ref().map(|argument| &argument.expr),
            default: self.config.default.as_ref(),
        }
    }
}
