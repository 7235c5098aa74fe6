use crate::addrs::InstanceKey;
use hcl::{Expression, Template, Traversal, TraversalOperator};
use std::path::{Component, Path, PathBuf};

/// A single traversal operator, decoded for address purposes
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TraversalStep {
    /// `.name`
    Attr(String),
    /// `[0]`, `["key"]` or the legacy `.0`
    Key(InstanceKey),
    /// `[*]` or `.*`
    Splat,
    /// an index that is not a literal, for example `[count.index]`
    Dynamic,
}

pub(crate) trait TraversalExt {
    /// Name of the variable the traversal starts at
    fn root_variable(&self) -> Option<&str>;
    fn steps(&self) -> Vec<TraversalStep>;
}

impl TraversalExt for Traversal {
    fn root_variable(&self) -> Option<&str> {
        let Expression::Variable(var) = &self.expr else {
            return None;
        };

        Some(var.as_str())
    }

    fn steps(&self) -> Vec<TraversalStep> {
        self.operators
            .iter()
            .map(|operator| match operator {
                TraversalOperator::GetAttr(ident) => TraversalStep::Attr(ident.to_string()),
                TraversalOperator::LegacyIndex(index) => i64::try_from(*index)
                    .map(|index| TraversalStep::Key(InstanceKey::Int(index)))
                    .unwrap_or(TraversalStep::Dynamic),
                TraversalOperator::Index(expr) => literal_key(expr)
                    .map(TraversalStep::Key)
                    .unwrap_or(TraversalStep::Dynamic),
                TraversalOperator::AttrSplat | TraversalOperator::FullSplat => {
                    TraversalStep::Splat
                }
            })
            .collect()
    }
}

/// Interprets a literal index expression as an instance key
pub(crate) fn literal_key(expr: &Expression) -> Option<InstanceKey> {
    match expr {
        Expression::Number(num) if !num.is_f64() => num.as_i64().map(InstanceKey::Int),
        Expression::String(key) => Some(InstanceKey::Str(key.clone())),
        Expression::TemplateExpr(template_expr) => {
            let template = Template::from_expr(template_expr).ok()?;
            let mut key = String::new();
            for element in template.elements() {
                let hcl::template::Element::Literal(literal) = element else {
                    return None;
                };
                key.push_str(literal);
            }
            Some(InstanceKey::Str(key))
        }
        Expression::Parenthesis(inner) => literal_key(inner),
        Expression::Operation(operation) => {
            let hcl::expr::Operation::Unary(unary) = operation.as_ref() else {
                return None;
            };
            if !matches!(unary.operator, hcl::expr::UnaryOperator::Neg) {
                return None;
            }
            match literal_key(&unary.expr)? {
                InstanceKey::Int(index) => Some(InstanceKey::Int(-index)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Lexically normalizes a relative module source path
///
/// `./a/../b/./c` becomes `b/c`. The file system is not consulted.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let ends_in_parent = matches!(
                    normalized.components().next_back(),
                    Some(Component::ParentDir)
                );
                if ends_in_parent || !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn traversal(input: &str) -> Traversal {
        let expr: hcl_edit::expr::Expression = input.parse().expect("expression must parse");
        match Expression::from(expr) {
            Expression::Traversal(traversal) => *traversal,
            other => panic!("not a traversal: {other:?}"),
        }
    }

    #[test]
    fn steps() {
        let traversal = traversal(r#"module.a["k"].out[count.index][*]"#);

        assert_eq!(traversal.root_variable(), Some("module"));
        assert_eq!(
            traversal.steps(),
            vec![
                TraversalStep::Attr("a".into()),
                TraversalStep::Key(InstanceKey::Str("k".into())),
                TraversalStep::Attr("out".into()),
                TraversalStep::Dynamic,
                TraversalStep::Splat,
            ]
        );
    }

    #[test]
    fn legacy_index() {
        let traversal = traversal("res.name.0");
        assert_eq!(
            traversal.steps(),
            vec![
                TraversalStep::Attr("name".into()),
                TraversalStep::Key(InstanceKey::Int(0)),
            ]
        );
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_path(Path::new("./child")), PathBuf::from("child"));
        assert_eq!(
            normalize_path(Path::new("modules/a/../b/./c")),
            PathBuf::from("modules/b/c")
        );
        assert_eq!(normalize_path(Path::new("../shared")), PathBuf::from("../shared"));
        assert_eq!(normalize_path(Path::new(".")), PathBuf::new());
    }
}
