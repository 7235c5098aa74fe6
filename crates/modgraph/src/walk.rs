//! Walking a configuration: expansion and evaluation, level by level
//!
//! The static graph is split into topological levels. For every level the walk
//! 1. seals the modules of the level and expands its nodes (single threaded),
//! 2. evaluates the new concrete nodes in parallel with [rayon],
//! 3. applies the outcomes to the [State] and the [InstanceExpander].
//!
//! Expander and state are only read while a level evaluates, so no locking is needed. When a
//! node fails to evaluate, the rest of its level still completes but no further level starts.
use crate::addrs::{AbsAddress, Address, InstanceKey, ModuleInstance, Referenceable, ResourceMode, Target};
use crate::builder::StaticGraphBuilder;
use crate::config::{Configuration, Limits};
use crate::error::{Error, EvaluationError};
use crate::eval::{declare_functions, evaluate_step, EvalContext, EvalOutcome, EvalScope};
use crate::expand::{ExpansionEngine, ExpansionObserver, TracingObserver};
use crate::expander::{InstanceExpander, Repetition};
use crate::graph::{prune_untargeted, Graph};
use crate::node::{ConcreteNode, GraphNodeAddressable, GraphNodeEvaluable};
use crate::references::references_in_expr;
use hcl::eval::Evaluate;
use indexmap::IndexMap;
use rayon::prelude::*;

/// Values of evaluated nodes, by module instance
#[derive(Debug, Default, Clone)]
pub struct State {
    modules: IndexMap<ModuleInstance, IndexMap<Address, hcl::Value>>,
}

impl State {
    pub fn insert(&mut self, addr: AbsAddress, value: hcl::Value) {
        tracing::trace!(%addr, "value recorded");
        self.modules
            .entry(addr.module)
            .or_default()
            .insert(addr.addr, value);
    }

    pub fn get(&self, module: &ModuleInstance, addr: &Address) -> Option<&hcl::Value> {
        self.modules.get(module)?.get(addr)
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every value, in the order it was recorded
    pub fn iter(&self) -> impl Iterator<Item = (AbsAddress, &hcl::Value)> {
        self.modules.iter().flat_map(|(module, values)| {
            values
                .iter()
                .map(|(addr, value)| (AbsAddress::new(module.clone(), addr.clone()), value))
        })
    }

    /// Outputs of one module instance, as seen through `module.<call>`
    pub fn outputs(&self, module: &ModuleInstance) -> hcl::value::Map<String, hcl::Value> {
        let Some(values) = self.modules.get(module) else {
            return Default::default();
        };

        values
            .iter()
            .filter_map(|(addr, value)| match addr {
                Address::Output(name) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Everything a walk can be configured with
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Values of the root module's variables
    pub inputs: IndexMap<String, hcl::Value>,
    pub limits: Limits,
    /// Only these declarations and what they depend on are walked; all when empty
    pub targets: Vec<Target>,
}

/// [EvalContext] of a walk, a read-only view on its progress
pub struct WalkContext<'w> {
    config: &'w Configuration,
    state: &'w State,
    expander: &'w InstanceExpander,
    inputs: &'w IndexMap<String, hcl::Value>,
}

impl<'w> WalkContext<'w> {
    pub fn new(
        config: &'w Configuration,
        state: &'w State,
        expander: &'w InstanceExpander,
        inputs: &'w IndexMap<String, hcl::Value>,
    ) -> Self {
        Self {
            config,
            state,
            expander,
            inputs,
        }
    }

    /// Value of `module.<call>`: one object of outputs per instance
    fn module_value(&self, parent: &ModuleInstance, call: &str) -> Option<hcl::Value> {
        let repetition = self.expander.repetition(parent, call)?;
        let outputs =
            |key: InstanceKey| hcl::Value::Object(self.state.outputs(&parent.child(call, key)));

        let value = match repetition {
            Repetition::Single => outputs(InstanceKey::NoKey),
            Repetition::Count(_) => {
                hcl::Value::Array(repetition.keys().into_iter().map(outputs).collect())
            }
            Repetition::ForEach(values) => hcl::Value::Object(
                values
                    .keys()
                    .map(|key| (key.clone(), outputs(InstanceKey::Str(key.clone()))))
                    .collect(),
            ),
        };
        Some(value)
    }

    fn path(&self, module: &ModuleInstance, attribute: &str) -> Option<hcl::Value> {
        let dir = match attribute {
            "module" => self.config.descendant(&module.module())?.source_dir.clone(),
            "root" => self.config.source_dir.clone(),
            "cwd" => std::env::current_dir().ok()?,
            _ => return None,
        };

        Some(hcl::Value::String(dir.display().to_string()))
    }
}

/// Inserts `value` at `keys` inside nested objects
fn nest(namespace: &mut hcl::value::Map<String, hcl::Value>, keys: &[&str], value: hcl::Value) {
    let [first, rest @ ..] = keys else {
        return;
    };

    if rest.is_empty() {
        namespace.insert(first.to_string(), value);
        return;
    }

    let entry = namespace
        .entry(first.to_string())
        .or_insert_with(|| hcl::Value::Object(Default::default()));
    if let hcl::Value::Object(inner) = entry {
        nest(inner, rest, value);
    }
}

impl EvalContext for WalkContext<'_> {
    fn instance_expander(&self) -> &InstanceExpander {
        self.expander
    }

    fn evaluate(&self, expr: &hcl::Expression, scope: &EvalScope) -> Result<hcl::Value, String> {
        let module = &scope.module;
        let mut variables = hcl::value::Map::new();

        for subject in references_in_expr(expr).subjects() {
            match subject {
                Referenceable::Local(name) => {
                    if let Some(value) = self.state.get(module, &Address::Local(name.clone())) {
                        nest(&mut variables, &["local", name.as_str()], value.clone());
                    }
                }
                Referenceable::Variable(name) => {
                    if let Some(value) = self.state.get(module, &Address::Variable(name.clone())) {
                        nest(&mut variables, &["var", name.as_str()], value.clone());
                    }
                }
                Referenceable::ModuleCall { call, .. } => {
                    if let Some(value) = self.module_value(module, call) {
                        nest(&mut variables, &["module", call.as_str()], value);
                    }
                }
                Referenceable::Resource { resource, .. } => {
                    let addr = Address::Resource(resource.clone());
                    if let Some(value) = self.state.get(module, &addr) {
                        let path = match resource.mode {
                            ResourceMode::Managed => vec![resource.type_name.as_str(), resource.name.as_str()],
                            ResourceMode::Data => vec!["data", resource.type_name.as_str(), resource.name.as_str()],
                        };
                        nest(&mut variables, &path, value.clone());
                    }
                }
                Referenceable::Count(_) => {
                    if let Some(index) = scope.repetition.count_index {
                        nest(&mut variables, &["count", "index"], index.into());
                    }
                }
                Referenceable::Each(_) => {
                    if let Some(key) = &scope.repetition.each_key {
                        let value = scope.repetition.each_value.clone().unwrap_or(hcl::Value::Null);
                        nest(&mut variables, &["each", "key"], key.clone().into());
                        nest(&mut variables, &["each", "value"], value);
                    }
                }
                Referenceable::Path(attribute) => {
                    if let Some(value) = self.path(module, attribute) {
                        nest(&mut variables, &["path", attribute.as_str()], value);
                    }
                }
                Referenceable::ResourceDestroy(_) | Referenceable::SelfObject => {}
            }
        }

        let mut context = hcl::eval::Context::new();
        declare_functions(&mut context);
        for (name, value) in variables {
            context.declare_var(hcl::Identifier::unchecked(name), value);
        }

        expr.evaluate(&context).map_err(|errors| errors.to_string())
    }

    fn root_input(&self, name: &str) -> Option<hcl::Value> {
        self.inputs.get(name).cloned()
    }
}

/// Result of a walk
#[derive(Debug)]
pub struct Walk {
    /// Concrete nodes of every level that was reached
    pub graph: Graph<ConcreteNode>,
    pub state: State,
    pub expander: InstanceExpander,
    /// Nodes that failed to evaluate; the walk stopped after their level
    pub failures: Vec<EvaluationError>,
}

impl Walk {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Values of the root module's outputs
    pub fn root_outputs(&self) -> hcl::value::Map<String, hcl::Value> {
        self.state.outputs(&ModuleInstance::root())
    }
}

/// Expands and evaluates a configuration
pub struct Walker<'c> {
    config: &'c Configuration,
    options: WalkOptions,
    observer: &'c dyn ExpansionObserver,
}

impl<'c> Walker<'c> {
    pub fn new(config: &'c Configuration, options: WalkOptions) -> Self {
        Self {
            config,
            options,
            observer: &TracingObserver,
        }
    }

    pub fn with_observer(mut self, observer: &'c dyn ExpansionObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn walk(&self) -> Result<Walk, Error> {
        let mut graph = StaticGraphBuilder::new(self.config).build()?;

        let targets = &self.options.targets;
        if !targets.is_empty() {
            let removed = prune_untargeted(&mut graph, |node| {
                targets
                    .iter()
                    .any(|target| target.selects(&node.module_path(), &node.address()))
            });
            tracing::debug!(removed, remaining = graph.len(), "graph pruned to targets");
        }

        let levels = graph.topological_levels()?;

        let mut state = State::default();
        let mut expander = InstanceExpander::new(self.options.limits.clone());
        let mut engine = ExpansionEngine::new(self.options.limits.clone(), self.observer);
        let mut failures = vec![];

        for (depth, level) in levels.iter().enumerate() {
            let _span = tracing::debug_span!("level", depth, nodes = level.len()).entered();

            for index in level {
                expander.seal(&graph.node(*index).module_path());
            }

            let ctx = WalkContext::new(self.config, &state, &expander, &self.options.inputs);
            let mut added = vec![];
            for index in level {
                added.extend(engine.expand_node(graph.node(*index), &ctx)?);
            }
            engine.connect(&added, &ctx)?;

            let concrete = engine.graph();
            let outcomes: Vec<_> = added
                .par_iter()
                .map(|index| evaluate_step(concrete.node(*index).eval_step(), &ctx))
                .collect();

            for outcome in outcomes {
                match outcome {
                    Ok(EvalOutcome::Value(addr, value)) => state.insert(addr, value),
                    Ok(EvalOutcome::Expansion {
                        parent,
                        call,
                        repetition,
                    }) => expander.set_repetition(&parent, &call, repetition)?,
                    Err(failure) => {
                        tracing::warn!(%failure, "evaluation failed");
                        failures.push(failure);
                    }
                }
            }

            if !failures.is_empty() {
                tracing::warn!(
                    failed = failures.len(),
                    skipped = levels.len() - depth - 1,
                    "walk stopped"
                );
                break;
            }
        }

        tracing::info!(values = state.len(), failures = failures.len(), "walk finished");
        Ok(Walk {
            graph: engine.into_graph(),
            state,
            expander,
            failures,
        })
    }
}
