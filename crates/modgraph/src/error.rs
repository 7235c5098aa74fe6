//! Errors of the library
//!
//! Problems with the configuration are collected as [Issue]s so one pass reports all of them.
//! Everything else is an [Error] that aborts the current operation.
use crate::addrs::{ConfigAddress, Module};
use crate::hcl_documents::{LoadError, SourcePos};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: String },

    /// A module was expanded before the repetition of its call was recorded
    #[error("cannot expand {module}: repetition of {missing} is not known yet")]
    ExpansionPrecondition { module: String, missing: String },

    #[error("repetition of {module} can not change, its expansion has already started")]
    ExpanderSealed { module: String },

    #[error(transparent)]
    Build(#[from] BuildErrors),

    #[error("dependency cycle detected: {}", render_cycles(.cycles))]
    Cycle { cycles: Vec<Vec<String>> },

    #[error("{what} limit of {limit} exceeded (got {actual})")]
    LimitExceeded {
        what: &'static str,
        limit: usize,
        actual: usize,
    },

    #[error("unable to load configuration")]
    Load(#[from] LoadError),
}

fn render_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

fn at(pos: &Option<SourcePos>) -> String {
    pos.as_ref()
        .map(|pos| format!("{pos}: "))
        .unwrap_or_default()
}

fn in_module(module: &Module) -> String {
    if module.is_root() {
        "root module".to_string()
    } else {
        module.to_string()
    }
}

/// A problem with the configuration
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Issue {
    #[error("{}attribute {name:?} is not allowed at the root of {}", at(.pos), in_module(.module))]
    RootAttribute {
        module: Module,
        name: String,
        pos: Option<SourcePos>,
    },

    #[error("{}unknown block type {block:?} in {}", at(.pos), in_module(.module))]
    UnknownBlockType {
        module: Module,
        block: String,
        pos: Option<SourcePos>,
    },

    #[error("{}{block} block requires {expected} label(s), found {found}", at(.pos))]
    BlockLabels {
        module: Module,
        block: String,
        expected: usize,
        found: usize,
        pos: Option<SourcePos>,
    },

    #[error("{}{name:?} is not a valid name", at(.pos))]
    InvalidName {
        module: Module,
        name: String,
        pos: Option<SourcePos>,
    },

    #[error("{}{address} is declared more than once", at(.pos))]
    DuplicateDeclaration {
        address: ConfigAddress,
        pos: Option<SourcePos>,
    },

    #[error("{}{address} is missing the required attribute {attribute:?}", at(.pos))]
    MissingAttribute {
        address: ConfigAddress,
        attribute: &'static str,
        pos: Option<SourcePos>,
    },

    #[error("{}{address} can not use count and for_each at the same time", at(.pos))]
    ConflictingRepetition {
        address: ConfigAddress,
        pos: Option<SourcePos>,
    },

    #[error("{}{address} uses source {module_source:?}, only local paths (./ or ../) are supported", at(.pos))]
    UnsupportedModuleSource {
        address: ConfigAddress,
        module_source: String,
        pos: Option<SourcePos>,
    },

    #[error("{address} exceeds the module nesting limit of {limit}")]
    ModuleDepthExceeded { address: ConfigAddress, limit: usize },

    #[error("unable to load {address}: {message}")]
    ModuleLoad {
        address: ConfigAddress,
        message: String,
    },

    #[error("{}{address} passes {argument:?} which is not a variable of the module", at(.pos))]
    UnsupportedArgument {
        address: ConfigAddress,
        argument: String,
        pos: Option<SourcePos>,
    },

    #[error("{}{address} does not set the required variable {variable:?}", at(.pos))]
    MissingArgument {
        address: ConfigAddress,
        variable: String,
        pos: Option<SourcePos>,
    },

    #[error("{}{node}: invalid reference: {message}", at(.pos))]
    InvalidAddress {
        node: String,
        message: String,
        pos: Option<SourcePos>,
    },

    #[error("{}{node}: reference to undeclared {reference}", at(.pos))]
    UnresolvedReference {
        node: String,
        reference: String,
        pos: Option<SourcePos>,
    },
}

/// All issues found while loading or building a configuration
#[derive(derive_new::new, Debug, Default)]
pub struct BuildErrors {
    #[new(default)]
    issues: Vec<Issue>,
}

impl BuildErrors {
    pub fn log(&mut self, issue: Issue) {
        tracing::debug!(%issue, "issue found");
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: BuildErrors) {
        self.issues.extend(other.issues);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// `Err(self)` when any issue was logged
    pub fn into_result(self) -> Result<(), BuildErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::error::Error for BuildErrors {}

impl std::fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.issues.as_slice() {
            [] => f.write_str("configuration is invalid"),
            [issue] => write!(f, "{issue}"),
            issues => {
                write!(f, "configuration has {} issues:", issues.len())?;
                for issue in issues {
                    write!(f, "\n  {issue}")?;
                }
                Ok(())
            }
        }
    }
}

/// Evaluation of a single node failed
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{node}: {message}")]
pub struct EvaluationError {
    pub node: String,
    pub message: String,
}

impl EvaluationError {
    pub fn new(node: impl ToString, message: impl ToString) -> Self {
        Self {
            node: node.to_string(),
            message: message.to_string(),
        }
    }
}
