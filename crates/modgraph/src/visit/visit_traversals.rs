use super::TraversalVisitor;
use crate::util::TraversalExt;
use hcl::{
    template::{Directive, Element},
    Expression, ObjectKey, Operation, Template, Traversal, TraversalOperator,
};

/// Recursively visit all [hcl::Traversal]s
pub trait VisitTraversals {
    fn visit_traversals(&self, visitor: &mut dyn TraversalVisitor);
}

impl VisitTraversals for Expression {
    fn visit_traversals(&self, visitor: &mut dyn TraversalVisitor) {
        Walker::new(visitor).expression(self);
    }
}

impl VisitTraversals for Template {
    fn visit_traversals(&self, visitor: &mut dyn TraversalVisitor) {
        Walker::new(visitor).template(self);
    }
}

/// Walks an expression tree, tracking the variables bound by `for` constructs
struct Walker<'v> {
    visitor: &'v mut dyn TraversalVisitor,
    bound: Vec<String>,
}

impl<'v> Walker<'v> {
    fn new(visitor: &'v mut dyn TraversalVisitor) -> Self {
        Self {
            visitor,
            bound: vec![],
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|bound| bound == name)
    }

    /// Runs `f` with the iteration variables in scope
    fn with_bound(
        &mut self,
        key_var: Option<&hcl::Identifier>,
        value_var: &hcl::Identifier,
        f: impl FnOnce(&mut Self),
    ) {
        let scope = self.bound.len();
        self.bound.extend(key_var.map(|var| var.to_string()));
        self.bound.push(value_var.to_string());
        f(self);
        self.bound.truncate(scope);
    }

    fn traversal(&mut self, traversal: &Traversal) {
        let is_bound = traversal
            .root_variable()
            .is_some_and(|root| self.is_bound(root));
        if !is_bound {
            self.visitor.visit_traversal(traversal);
        }

        if !matches!(traversal.expr, Expression::Variable(_)) {
            self.expression(&traversal.expr);
        }

        for operator in &traversal.operators {
            if let TraversalOperator::Index(index) = operator {
                self.expression(index);
            }
        }
    }

    fn expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Variable(variable) => {
                if self.is_bound(variable.as_str()) {
                    return;
                }

                // a standalone variable is a traversal with no operators...kind of
                let traversal = Traversal::new(
                    Expression::Variable(variable.clone()),
                    Vec::<TraversalOperator>::new(),
                );
                self.visitor.visit_traversal(&traversal);
            }
            Expression::Traversal(traversal) => self.traversal(traversal),
            Expression::Array(array) => {
                for expr in array {
                    self.expression(expr);
                }
            }
            Expression::Object(object) => {
                for (key, value) in object.iter() {
                    if let ObjectKey::Expression(key) = key {
                        self.expression(key);
                    }
                    self.expression(value);
                }
            }
            Expression::TemplateExpr(template_expr) => match Template::from_expr(template_expr) {
                Ok(template) => self.template(&template),
                Err(error) => self.visitor.visit_unparseable(template_expr, &error),
            },
            Expression::FuncCall(func_call) => {
                for arg in &func_call.args {
                    self.expression(arg);
                }
            }
            Expression::Parenthesis(expr) => self.expression(expr),
            Expression::Conditional(cond) => {
                self.expression(&cond.cond_expr);
                self.expression(&cond.true_expr);
                self.expression(&cond.false_expr);
            }
            Expression::Operation(operation) => match operation.as_ref() {
                Operation::Binary(binop) => {
                    self.expression(&binop.lhs_expr);
                    self.expression(&binop.rhs_expr);
                }
                Operation::Unary(unop) => self.expression(&unop.expr),
            },
            Expression::ForExpr(for_expr) => {
                // the collection is evaluated outside of the iteration scope
                self.expression(&for_expr.collection_expr);
                self.with_bound(
                    for_expr.key_var.as_ref(),
                    &for_expr.value_var,
                    |walker| {
                        if let Some(key_expr) = &for_expr.key_expr {
                            walker.expression(key_expr);
                        }
                        walker.expression(&for_expr.value_expr);
                        if let Some(cond_expr) = &for_expr.cond_expr {
                            walker.expression(cond_expr);
                        }
                    },
                );
            }
            _ => {}
        }
    }

    fn template(&mut self, template: &Template) {
        for element in template.elements() {
            match element {
                Element::Interpolation(interpolation) => self.expression(&interpolation.expr),
                Element::Directive(directive) => match directive {
                    Directive::If(ifdir) => {
                        self.expression(&ifdir.cond_expr);
                        self.template(&ifdir.true_template);
                        if let Some(false_template) = &ifdir.false_template {
                            self.template(false_template);
                        }
                    }
                    Directive::For(fordir) => {
                        self.expression(&fordir.collection_expr);
                        self.with_bound(fordir.key_var.as_ref(), &fordir.value_var, |walker| {
                            walker.template(&fordir.template)
                        });
                    }
                },
                Element::Literal(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Expression {
        let expr: hcl_edit::expr::Expression = input.parse().expect("expression must parse");
        expr.into()
    }

    fn roots(input: &str) -> Vec<String> {
        let mut roots = vec![];
        parse(input).visit_traversals(&mut |traversal: &Traversal| {
            roots.push(traversal.root_variable().unwrap_or("?").to_string())
        });
        roots
    }

    #[test]
    fn visits_nested_expressions() {
        assert_eq!(
            roots(r#"upper("${local.a}-${var.b}") == (c.d[e.f] ? g : { (h) = i })"#),
            vec!["local", "var", "c", "e", "g", "h", "i"]
        );
    }

    #[test]
    fn skips_bound_variables() {
        assert_eq!(
            roots("[for k, v in var.map : upper(v) if k != local.skip]"),
            vec!["var", "local"]
        );
        assert_eq!(
            roots(r#""%{ for item in var.list }${item.name}${local.sep}%{ endfor }""#),
            vec!["var", "local"]
        );
        // bindings end with their expression
        assert_eq!(
            roots("[[for x in a : x], x]"),
            vec!["a", "x"]
        );
    }
}
