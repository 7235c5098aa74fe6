//! visitor pattern helpers
mod visit_traversals;
pub use visit_traversals::VisitTraversals;

/// Visitor that is shown every [hcl::Traversal] of an expression tree
///
/// Traversals rooted at variables bound by an enclosing `for` expression or directive are not
/// shown, they do not refer to anything outside of the expression.
pub trait TraversalVisitor {
    fn visit_traversal(&mut self, traversal: &hcl::Traversal);

    /// A template could not be decoded, its traversals are unknown
    fn visit_unparseable(&mut self, _template: &hcl::TemplateExpr, _error: &hcl::Error) {}
}

// blanket impl for FnMut
impl<F> TraversalVisitor for F
where
    F: FnMut(&hcl::Traversal),
{
    fn visit_traversal(&mut self, traversal: &hcl::Traversal) {
        self(traversal)
    }
}
