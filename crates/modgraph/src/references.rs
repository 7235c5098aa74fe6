//! Extraction of references from expressions
//!
//! References are a function of the expression alone, nothing here knows about the graph or the
//! expansion of modules.
use crate::addrs::{InstanceKey, Referenceable, ResourceAddr};
use crate::hcl_documents::SourcePos;
use crate::util::{TraversalExt, TraversalStep};
use crate::visit::{TraversalVisitor, VisitTraversals};

/// Attributes of the contextual namespaces
const COUNT_ATTRIBUTES: &[&str] = &["index"];
const EACH_ATTRIBUTES: &[&str] = &["key", "value"];
const PATH_ATTRIBUTES: &[&str] = &["module", "root", "cwd"];

/// Pointer from an expression to something it depends on
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub subject: Referenceable,
    pub pos: Option<SourcePos>,
}

/// Problem found while extracting references
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A traversal that can not refer to anything, for example `local` or `count.foo`
    InvalidReference { text: String, message: String },
    /// Part of the expression could not be decoded, its references are missing
    Unparseable { message: String },
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::InvalidReference { .. })
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::InvalidReference { text, message } => write!(f, "{text}: {message}"),
            Diagnostic::Unparseable { message } => write!(f, "unparseable expression: {message}"),
        }
    }
}

/// Ordered references without duplicate subjects, plus diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSet {
    refs: Vec<Reference>,
    diagnostics: Vec<Diagnostic>,
    /// Position of the expression, see [ReferenceSet::at]
    pos: Option<SourcePos>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reference: Reference) {
        if self
            .refs
            .iter()
            .any(|existing| existing.subject == reference.subject)
        {
            return;
        }
        self.refs.push(reference);
    }

    pub fn extend(&mut self, other: ReferenceSet) {
        for reference in other.refs {
            self.push(reference);
        }
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// `false` when parts of the expression could not be inspected
    pub fn is_complete(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|diagnostic| matches!(diagnostic, Diagnostic::Unparseable { .. }))
    }

    /// Sets the position of the expression and of every reference that has none
    pub fn at(mut self, pos: &Option<SourcePos>) -> Self {
        for reference in self.refs.iter_mut().filter(|r| r.pos.is_none()) {
            reference.pos = pos.clone();
        }
        if self.pos.is_none() {
            self.pos = pos.clone();
        }
        self
    }

    pub fn pos(&self) -> Option<&SourcePos> {
        self.pos.as_ref()
    }

    /// Adds an ordering-only reference to the destroy phase of every referenced resource
    pub fn with_destroy_references(mut self) -> Self {
        let destroy: Vec<Reference> = self
            .refs
            .iter()
            .filter_map(|reference| match &reference.subject {
                Referenceable::Resource { resource, .. } => Some(Reference {
                    subject: Referenceable::ResourceDestroy(resource.clone()),
                    pos: reference.pos.clone(),
                }),
                _ => None,
            })
            .collect();

        for reference in destroy {
            self.push(reference);
        }
        self
    }

    /// Subjects only, in order
    pub fn subjects(&self) -> impl Iterator<Item = &Referenceable> {
        self.refs.iter().map(|reference| &reference.subject)
    }
}

/// All references of an expression
pub fn references_in_expr(expr: &hcl::Expression) -> ReferenceSet {
    let mut collector = Collector::default();
    expr.visit_traversals(&mut collector);
    collector.set
}

/// References of an optional expression
pub fn references_in(expr: Option<&hcl::Expression>) -> ReferenceSet {
    expr.map(references_in_expr).unwrap_or_default()
}

#[derive(Default)]
struct Collector {
    set: ReferenceSet,
}

impl TraversalVisitor for Collector {
    fn visit_traversal(&mut self, traversal: &hcl::Traversal) {
        let Some(root) = traversal.root_variable() else {
            return;
        };

        match decode(root, &traversal.steps()) {
            Ok(subject) => self.set.push(Reference { subject, pos: None }),
            Err(message) => {
                let text = render(root, &traversal.steps());
                tracing::debug!(%text, %message, "invalid reference");
                self.set
                    .diagnostics
                    .push(Diagnostic::InvalidReference { text, message });
            }
        }
    }

    fn visit_unparseable(&mut self, _template: &hcl::TemplateExpr, error: &hcl::Error) {
        tracing::warn!(%error, "template can not be inspected for references");
        self.set.diagnostics.push(Diagnostic::Unparseable {
            message: error.to_string(),
        });
    }
}

fn key(step: Option<&TraversalStep>) -> Option<InstanceKey> {
    match step {
        Some(TraversalStep::Key(key)) => Some(key.clone()),
        _ => None,
    }
}

fn contextual(
    namespace: &str,
    steps: &[TraversalStep],
    allowed: &[&str],
) -> Result<String, String> {
    match steps.first() {
        Some(TraversalStep::Attr(attr)) if allowed.contains(&attr.as_str()) => Ok(attr.clone()),
        Some(TraversalStep::Attr(attr)) => Err(format!("{namespace} has no attribute {attr:?}")),
        _ => Err(format!("{namespace} must be followed by an attribute name")),
    }
}

/// Interprets a traversal as the subject it refers to
fn decode(root: &str, steps: &[TraversalStep]) -> Result<Referenceable, String> {
    use TraversalStep::*;

    let subject = match root {
        "local" | "var" => {
            let Some(Attr(name)) = steps.first() else {
                return Err(format!("{root} must be followed by an attribute name"));
            };

            if root == "local" {
                Referenceable::Local(name.clone())
            } else {
                Referenceable::Variable(name.clone())
            }
        }
        "module" => {
            let Some(Attr(call)) = steps.first() else {
                return Err("module must be followed by a module call name".to_string());
            };

            let (key, rest) = match &steps[1..] {
                [Key(key), rest @ ..] => (Some(key.clone()), rest),
                [Dynamic | Splat, rest @ ..] => (None, rest),
                rest => (None, rest),
            };

            let output = match rest.first() {
                Some(Attr(output)) => Some(output.clone()),
                _ => None,
            };

            Referenceable::ModuleCall {
                call: call.clone(),
                key,
                output,
            }
        }
        "data" => match steps {
            [Attr(type_name), Attr(name), rest @ ..] => Referenceable::Resource {
                resource: ResourceAddr::data(type_name.clone(), name.clone()),
                key: key(rest.first()),
            },
            _ => return Err("data must be followed by a type and a name".to_string()),
        },
        "count" => Referenceable::Count(contextual(root, steps, COUNT_ATTRIBUTES)?),
        "each" => Referenceable::Each(contextual(root, steps, EACH_ATTRIBUTES)?),
        "path" => Referenceable::Path(contextual(root, steps, PATH_ATTRIBUTES)?),
        "self" => Referenceable::SelfObject,
        type_name => match steps {
            [Attr(name), rest @ ..] => Referenceable::Resource {
                resource: ResourceAddr::managed(type_name, name.clone()),
                key: key(rest.first()),
            },
            _ => return Err(format!("unknown variable {type_name:?}")),
        },
    };

    Ok(subject)
}

/// Renders a traversal for diagnostics
fn render(root: &str, steps: &[TraversalStep]) -> String {
    let mut text = root.to_string();
    for step in steps {
        match step {
            TraversalStep::Attr(name) => {
                text.push('.');
                text.push_str(name);
            }
            TraversalStep::Key(key) => text.push_str(&key.to_string()),
            TraversalStep::Splat => text.push_str("[*]"),
            TraversalStep::Dynamic => text.push_str("[...]"),
        }
    }
    text
}
