use super::*;
use crate::config;
use crate::references::{references_in, references_in_expr};
use std::sync::Arc;

/// `output.<name>`
///
/// Outputs are referenced from the calling module as `module.<call>.<name>`. Outputs of the root
/// module can not be referenced at all.
#[derive(Debug, Clone)]
pub struct OutputNode<S> {
    pub scope: S,
    pub config: Arc<config::Output>,
}

impl<S: ModulePath> GraphNodeAddressable for OutputNode<S> {
    type Scope = S;

    fn address(&self) -> Address {
        Address::Output(self.config.name.clone())
    }

    fn scope(&self) -> &S {
        &self.scope
    }
}

impl<S: ModulePath> GraphNodeReferenceable for OutputNode<S> {
    fn referenceable_addrs(&self) -> Vec<Referenceable> {
        let Some((_, call)) = self.scope.parent_call() else {
            return vec![];
        };

        vec![Referenceable::ModuleCall {
            call: call.to_string(),
            key: self.scope.instance_key(),
            output: Some(self.config.name.clone()),
        }]
    }

    fn referenceable_scope(&self) -> Option<S> {
        self.scope.parent_call().map(|(parent, _)| parent)
    }
}

impl<S: ModulePath> GraphNodeReferencer for OutputNode<S> {
    fn references(&self) -> ReferenceSet {
        let mut references = references_in_expr(&self.config.value);
        references.extend(references_in(self.config.depends_on.as_ref()));
        references.at(&self.config.pos)
    }
}

impl<S> RemovableIfNotTargeted for OutputNode<S> {
    fn remove_if_not_targeted(&self) -> bool {
        true
    }
}

impl<S> GraphNodeDotter for OutputNode<S> {
    fn dot_node(&self, name: &str) -> DotNode {
        DotNode::new(name, "house")
    }
}

impl GraphNodeDynamicExpandable for OutputNode<Module> {
    fn dynamic_expand(&self, ctx: &dyn EvalContext) -> Result<Graph<ConcreteNode>, Error> {
        expand_instances(&self.scope, ctx, |scope| {
            ConcreteNode::Output(OutputNode {
                scope,
                config: self.config.clone(),
            })
        })
    }
}

impl GraphNodeEvaluable for OutputNode<ModuleInstance> {
    fn eval_step(&self) -> EvalStep<'_> {
        EvalStep::Value {
            addr: AbsAddress::new(self.scope.clone(), self.address()),
            expr: &self.config.value,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::addrs::InstanceKey;
    use pretty_assertions::assert_eq;

    fn output(name: &str) -> Arc<config::Output> {
        Arc::new(config::Output {
            name: name.to_string(),
            value: hcl::Expression::Null,
            depends_on: None,
            pos: None,
        })
    }

    #[test]
    fn advertised_in_the_calling_module() {
        let root = OutputNode {
            scope: Module::root(),
            config: output("id"),
        };
        assert_eq!(root.referenceable_addrs(), vec![]);
        assert_eq!(root.referenceable_scope(), None);

        let child = OutputNode {
            scope: ModuleInstance::root().child("child", InstanceKey::Int(2)),
            config: output("id"),
        };
        assert_eq!(child.name(), "module.child[2].output.id");
        assert_eq!(child.referenceable_scope(), Some(ModuleInstance::root()));
        assert_eq!(
            child.referenceable_addrs(),
            vec![Referenceable::ModuleCall {
                call: "child".into(),
                key: Some(InstanceKey::Int(2)),
                output: Some("id".into()),
            }]
        );
    }
}
