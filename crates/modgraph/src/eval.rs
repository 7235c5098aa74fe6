//! Evaluation of concrete nodes
//!
//! A node describes what it needs evaluated as an [EvalStep]. [evaluate_step] turns the step into
//! an [EvalOutcome] using an [EvalContext], which owns the expression evaluation and knows the
//! values computed so far. Evaluating a step never mutates anything, the walk applies outcomes
//! once a whole level is done.
use crate::addrs::{AbsAddress, AbsResourceInstance, Address, InstanceKey, ModuleInstance};
use crate::config::RepetitionExpr;
use crate::error::EvaluationError;
use crate::expander::{InstanceExpander, Repetition, RepetitionData};
use hcl::eval::{FuncArgs, FuncDef, ParamType};

/// Everything evaluation needs from the walk
///
/// Implementations are shared between the threads evaluating one level, so they must be
/// read-only while a level runs.
pub trait EvalContext: Sync {
    fn instance_expander(&self) -> &InstanceExpander;

    /// Evaluates `expr` as if written inside `scope`
    fn evaluate(&self, expr: &hcl::Expression, scope: &EvalScope) -> Result<hcl::Value, String>;

    /// Value passed to a variable of the root module
    fn root_input(&self, name: &str) -> Option<hcl::Value>;
}

/// Where an expression is evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct EvalScope {
    pub module: ModuleInstance,
    /// `count.*` and `each.*`
    pub repetition: RepetitionData,
}

impl EvalScope {
    pub fn new(module: ModuleInstance) -> Self {
        Self {
            module,
            repetition: RepetitionData::default(),
        }
    }

    pub fn with_repetition(mut self, repetition: RepetitionData) -> Self {
        self.repetition = repetition;
        self
    }
}

/// Work a concrete node asks for
#[derive(Debug)]
pub enum EvalStep<'a> {
    /// Locals and outputs
    Value {
        addr: AbsAddress,
        expr: &'a hcl::Expression,
    },
    Variable {
        addr: AbsAddress,
        /// Expression passed by the module call, evaluated in the calling module instance
        argument: Option<&'a hcl::Expression>,
        default: Option<&'a hcl::Expression>,
    },
    /// Decides the instances of a called module
    ModuleExpansion {
        parent: &'a ModuleInstance,
        call: &'a str,
        repetition: &'a RepetitionExpr,
    },
    Resource {
        addr: AbsAddress,
        repetition: &'a RepetitionExpr,
        body: &'a hcl::Expression,
    },
}

impl EvalStep<'_> {
    /// Address of the node that asked for this step
    pub fn addr(&self) -> AbsAddress {
        match self {
            EvalStep::Value { addr, .. }
            | EvalStep::Variable { addr, .. }
            | EvalStep::Resource { addr, .. } => addr.clone(),
            EvalStep::ModuleExpansion { parent, call, .. } => {
                AbsAddress::new((*parent).clone(), Address::ModuleCall(call.to_string()))
            }
        }
    }
}

/// Result of an [EvalStep]
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Value(AbsAddress, hcl::Value),
    /// Repetition of a module call, to be recorded in the [InstanceExpander]
    Expansion {
        parent: ModuleInstance,
        call: String,
        repetition: Repetition,
    },
}

pub fn evaluate_step(step: EvalStep<'_>, ctx: &dyn EvalContext) -> Result<EvalOutcome, EvaluationError> {
    let node = step.addr();
    tracing::trace!(%node, "evaluating");

    let outcome = match step {
        EvalStep::Value { addr, expr } => {
            let value = ctx.evaluate(expr, &EvalScope::new(addr.module.clone()));
            value.map(|value| EvalOutcome::Value(addr, value))
        }
        EvalStep::Variable {
            addr,
            argument,
            default,
        } => variable(ctx, &addr, argument, default).map(|value| EvalOutcome::Value(addr, value)),
        EvalStep::ModuleExpansion {
            parent,
            call,
            repetition,
        } => repeat(ctx, repetition, &EvalScope::new(parent.clone())).map(|repetition| {
            EvalOutcome::Expansion {
                parent: parent.clone(),
                call: call.to_string(),
                repetition,
            }
        }),
        EvalStep::Resource {
            addr,
            repetition,
            body,
        } => resource(ctx, &addr, repetition, body).map(|value| EvalOutcome::Value(addr, value)),
    };

    outcome.map_err(|message| EvaluationError::new(node, message))
}

fn variable(
    ctx: &dyn EvalContext,
    addr: &AbsAddress,
    argument: Option<&hcl::Expression>,
    default: Option<&hcl::Expression>,
) -> Result<hcl::Value, String> {
    let Address::Variable(name) = &addr.addr else {
        return Err(format!("{addr} is not a variable"));
    };

    match addr.module.parent() {
        None => {
            if let Some(value) = ctx.root_input(name) {
                return Ok(value);
            }
        }
        Some((parent, _)) => {
            if let Some(argument) = argument {
                let repetition = ctx.instance_expander().repetition_data(&addr.module);
                let scope = EvalScope::new(parent).with_repetition(repetition);
                return ctx.evaluate(argument, &scope);
            }
        }
    }

    match default {
        Some(default) => ctx.evaluate(default, &EvalScope::new(addr.module.clone())),
        None => Err("no value given for a variable without default".to_string()),
    }
}

/// Evaluates `count` / `for_each`
fn repeat(
    ctx: &dyn EvalContext,
    repetition: &RepetitionExpr,
    scope: &EvalScope,
) -> Result<Repetition, String> {
    match repetition {
        RepetitionExpr::Single => Ok(Repetition::Single),
        RepetitionExpr::Count(expr) => count(ctx.evaluate(expr, scope)?).map(Repetition::Count),
        RepetitionExpr::ForEach(expr) => for_each(ctx.evaluate(expr, scope)?),
    }
}

fn count(value: hcl::Value) -> Result<usize, String> {
    let invalid = || format!("count must be a non-negative whole number, got {}", kind(&value));

    let hcl::Value::Number(number) = &value else {
        return Err(invalid());
    };

    if let Some(count) = number.as_u64() {
        return usize::try_from(count).map_err(|_| invalid());
    }

    match number.as_f64() {
        Some(count) if count >= 0.0 && count.fract() == 0.0 && count <= usize::MAX as f64 => {
            Ok(count as usize)
        }
        _ => Err(invalid()),
    }
}

fn for_each(value: hcl::Value) -> Result<Repetition, String> {
    match value {
        hcl::Value::Object(values) => Ok(Repetition::for_each(values)),
        hcl::Value::Array(items) => {
            let mut keys: Vec<String> = Vec::with_capacity(items.len());
            for item in items {
                let key = match item {
                    hcl::Value::String(key) => key,
                    other => {
                        return Err(format!(
                            "for_each over a list requires strings, got {}",
                            kind(&other)
                        ))
                    }
                };
                if keys.contains(&key) {
                    return Err(format!("for_each contains the key {key:?} more than once"));
                }
                keys.push(key);
            }

            Ok(Repetition::for_each(
                keys.into_iter()
                    .map(|key| (key.clone(), hcl::Value::String(key))),
            ))
        }
        other => Err(format!(
            "for_each must be an object or a list of strings, got {}",
            kind(&other)
        )),
    }
}

/// All instances of a resource: an object, a list for `count` or a map for `for_each`
fn resource(
    ctx: &dyn EvalContext,
    addr: &AbsAddress,
    repetition: &RepetitionExpr,
    body: &hcl::Expression,
) -> Result<hcl::Value, String> {
    let Address::Resource(resource) = &addr.addr else {
        return Err(format!("{addr} is not a resource"));
    };

    let scope = EvalScope::new(addr.module.clone());
    let repetition = repeat(ctx, repetition, &scope)?;

    let limit = ctx.instance_expander().limits().max_resource_instances;
    if repetition.len() > limit {
        return Err(format!(
            "{} instances exceed the resource instance limit of {limit}",
            repetition.len()
        ));
    }

    let mut instances = Vec::with_capacity(repetition.len());
    for key in repetition.keys() {
        let scope = scope.clone().with_repetition(repetition.data(&key));
        let instance = AbsResourceInstance {
            module: addr.module.clone(),
            resource: resource.clone(),
            key: key.clone(),
        };

        let mut attributes = match ctx.evaluate(body, &scope)? {
            hcl::Value::Object(attributes) => attributes,
            other => return Err(format!("{instance} must be an object, got {}", kind(&other))),
        };
        attributes
            .entry("id".to_string())
            .or_insert_with(|| hcl::Value::String(instance.to_string()));

        instances.push((key, hcl::Value::Object(attributes)));
    }

    let value = match repetition {
        Repetition::Single => instances
            .into_iter()
            .next()
            .map(|(_, value)| value)
            .unwrap_or(hcl::Value::Null),
        Repetition::Count(_) => hcl::Value::Array(instances.into_iter().map(|(_, value)| value).collect()),
        Repetition::ForEach(_) => hcl::Value::Object(
            instances
                .into_iter()
                .filter_map(|(key, value)| match key {
                    InstanceKey::Str(key) => Some((key, value)),
                    _ => None,
                })
                .collect(),
        ),
    };

    Ok(value)
}

/// Type of a value, for messages
fn kind(value: &hcl::Value) -> &'static str {
    match value {
        hcl::Value::Null => "null",
        hcl::Value::Bool(_) => "a bool",
        hcl::Value::Number(_) => "a number",
        hcl::Value::String(_) => "a string",
        hcl::Value::Array(_) => "a list",
        hcl::Value::Object(_) => "an object",
    }
}

/// Declares the functions available in expressions
pub fn declare_functions(context: &mut hcl::eval::Context) {
    let name = hcl::Identifier::unchecked;

    context.declare_func(name("upper"), FuncDef::builder().param(ParamType::String).build(upper));
    context.declare_func(name("lower"), FuncDef::builder().param(ParamType::String).build(lower));
    context.declare_func(name("length"), FuncDef::builder().param(ParamType::Any).build(length));
    context.declare_func(
        name("join"),
        FuncDef::builder()
            .param(ParamType::String)
            .param(ParamType::Array(Box::new(ParamType::String)))
            .build(join),
    );
}

fn upper(args: FuncArgs) -> Result<hcl::Value, String> {
    match args.first() {
        Some(hcl::Value::String(s)) => Ok(hcl::Value::String(s.to_uppercase())),
        _ => Err("upper expects a string".to_string()),
    }
}

fn lower(args: FuncArgs) -> Result<hcl::Value, String> {
    match args.first() {
        Some(hcl::Value::String(s)) => Ok(hcl::Value::String(s.to_lowercase())),
        _ => Err("lower expects a string".to_string()),
    }
}

fn length(args: FuncArgs) -> Result<hcl::Value, String> {
    let length = match args.first() {
        Some(hcl::Value::String(s)) => s.chars().count(),
        Some(hcl::Value::Array(items)) => items.len(),
        Some(hcl::Value::Object(items)) => items.len(),
        Some(other) => return Err(format!("length of {} is not defined", kind(other))),
        None => return Err("length expects one argument".to_string()),
    };

    Ok(hcl::Value::from(length as u64))
}

fn join(args: FuncArgs) -> Result<hcl::Value, String> {
    let (Some(hcl::Value::String(separator)), Some(hcl::Value::Array(items))) =
        (args.first(), args.get(1))
    else {
        return Err("join expects a separator and a list of strings".to_string());
    };

    let parts: Vec<&str> = items.iter().filter_map(hcl::Value::as_str).collect();
    Ok(hcl::Value::String(parts.join(separator)))
}
