//! Parsing of canonical address strings
//!
//! Addresses are valid HCL traversals, so the hcl parser does the lexing and we only interpret
//! the resulting steps.
use super::{InstanceKey, ModuleInstance};
use crate::error::Error;
use crate::util::{TraversalExt, TraversalStep};
use hcl::Expression;

pub(crate) use crate::util::TraversalStep as Step;

pub(crate) fn invalid(input: &str, reason: impl Into<String>) -> Error {
    Error::InvalidAddress {
        input: input.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    hcl::Identifier::new(name).is_ok()
}

/// Renders a string as a quoted hcl string literal
pub(crate) fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');

    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                quoted.push(c);
                quoted.push(c);
            }
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }

    quoted.push('"');
    quoted
}

/// Splits an address string into its steps, the root variable being the first [Step::Attr]
pub(crate) fn steps(input: &str) -> Result<Vec<Step>, Error> {
    if input.trim().is_empty() {
        return Ok(vec![]);
    }

    let expr: hcl_edit::expr::Expression = input
        .parse()
        .map_err(|err: hcl_edit::parser::Error| invalid(input, err.to_string()))?;

    let (root, operators) = match Expression::from(expr) {
        Expression::Variable(var) => (var.as_str().to_string(), vec![]),
        Expression::Traversal(traversal) => {
            let Some(root) = traversal.root_variable() else {
                return Err(invalid(input, "an address must start with a name"));
            };
            (root.to_string(), traversal.steps())
        }
        _ => return Err(invalid(input, "not an address")),
    };

    let mut steps = vec![Step::Attr(root)];
    for step in operators {
        match step {
            TraversalStep::Attr(_) | TraversalStep::Key(_) => steps.push(step),
            TraversalStep::Splat => return Err(invalid(input, "splat operators are not allowed")),
            TraversalStep::Dynamic => {
                return Err(invalid(input, "instance keys must be literal values"))
            }
        }
    }

    Ok(steps)
}

/// Consumes the leading `module.<name>[<key>]` steps
pub(crate) fn module_instance_prefix<'s>(
    input: &str,
    steps: &'s [Step],
) -> Result<(ModuleInstance, &'s [Step]), Error> {
    let mut instance = ModuleInstance::root();
    let mut rest = steps;

    loop {
        match rest {
            [Step::Attr(keyword), Step::Attr(name), tail @ ..] if keyword == "module" => {
                let (key, tail) = match tail {
                    [Step::Key(key), tail @ ..] => (key.clone(), tail),
                    _ => (InstanceKey::NoKey, tail),
                };
                instance = instance.child(name.clone(), key);
                rest = tail;
            }
            [Step::Attr(keyword), ..] if keyword == "module" => {
                return Err(invalid(
                    input,
                    "the module keyword must be followed by a call name",
                ))
            }
            _ => return Ok((instance, rest)),
        }
    }
}

pub(crate) fn expect_end(input: &str, rest: &[Step]) -> Result<(), Error> {
    if rest.is_empty() {
        return Ok(());
    }

    Err(invalid(input, "unexpected trailing steps"))
}
