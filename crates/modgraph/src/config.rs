//! Configuration model: the declarations of every module, loaded from hcl documents
//!
//! A module is a directory of `*.hcl` files. Module calls point to other directories by relative
//! path (`source = "./network"`), loading follows them recursively and builds the
//! [Configuration] tree.
use crate::addrs::{parse, Address, ConfigAddress, Module, ResourceAddr};
use crate::error::{BuildErrors, Error, Issue};
use crate::hcl_documents::{HclDocuments, LoadError, Source, SourcePos};
use crate::util::normalize_path;
use hcl_edit::structure::{Block, Body};
use hcl_edit::Span;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Size limits that protect against pathological configurations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of nested module calls
    pub max_module_depth: usize,
    /// Maximum number of instances of a single module
    pub max_module_instances: usize,
    /// Maximum number of instances of a single resource
    pub max_resource_instances: usize,
    /// Maximum number of nodes of an expanded graph
    pub max_graph_nodes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_module_depth: 16,
            max_module_instances: 10_000,
            max_resource_instances: 10_000,
            max_graph_nodes: 100_000,
        }
    }
}

/// `count` or `for_each` of a module call or resource
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RepetitionExpr {
    #[default]
    Single,
    Count(hcl::Expression),
    ForEach(hcl::Expression),
}

impl RepetitionExpr {
    pub fn expr(&self) -> Option<&hcl::Expression> {
        match self {
            RepetitionExpr::Single => None,
            RepetitionExpr::Count(expr) | RepetitionExpr::ForEach(expr) => Some(expr),
        }
    }
}

/// `locals { <name> = <expr> }`
#[derive(Debug)]
pub struct Local {
    pub name: String,
    pub expr: hcl::Expression,
    pub pos: Option<SourcePos>,
}

/// `variable "<name>" { default = <expr> }`
#[derive(Debug)]
pub struct Variable {
    pub name: String,
    pub default: Option<hcl::Expression>,
    pub pos: Option<SourcePos>,
}

/// `output "<name>" { value = <expr> }`
#[derive(Debug)]
pub struct Output {
    pub name: String,
    pub value: hcl::Expression,
    pub depends_on: Option<hcl::Expression>,
    pub pos: Option<SourcePos>,
}

/// Value passed to a variable of the called module
#[derive(Debug, Clone)]
pub struct Argument {
    pub expr: hcl::Expression,
    pub pos: Option<SourcePos>,
}

/// `module "<name>" { source = "./path" ... }`
#[derive(Debug)]
pub struct ModuleCall {
    pub name: String,
    pub source: String,
    pub repetition: RepetitionExpr,
    pub depends_on: Option<hcl::Expression>,
    pub arguments: IndexMap<String, Argument>,
    pub pos: Option<SourcePos>,
}

/// `resource "<type>" "<name>" { ... }` or `data "<type>" "<name>" { ... }`
#[derive(Debug)]
pub struct Resource {
    pub addr: ResourceAddr,
    pub repetition: RepetitionExpr,
    pub depends_on: Option<hcl::Expression>,
    /// Attributes and nested blocks as one object expression
    pub body: hcl::Expression,
    pub pos: Option<SourcePos>,
}

/// Arguments of module calls and resources that are not part of their value
const META_ARGUMENTS: &[&str] = &["count", "for_each", "depends_on", "source"];

/// Declarations of a single module
#[derive(Debug, Default)]
pub struct ModuleConfig {
    pub path: Module,
    pub locals: IndexMap<String, Arc<Local>>,
    pub variables: IndexMap<String, Arc<Variable>>,
    pub outputs: IndexMap<String, Arc<Output>>,
    pub module_calls: IndexMap<String, Arc<ModuleCall>>,
    pub resources: IndexMap<ResourceAddr, Arc<Resource>>,
}

impl ModuleConfig {
    pub fn new(hcl_documents: &HclDocuments, path: &Module) -> Result<Self, BuildErrors> {
        let mut config = Self {
            path: path.clone(),
            ..Default::default()
        };
        let mut e = BuildErrors::new();

        for (_index, source, attribute) in hcl_documents.attributes() {
            e.log(Issue::RootAttribute {
                module: path.clone(),
                name: attribute.key.value().as_str().to_string(),
                pos: source.position(attribute.span()),
            });
        }

        for (_index, source, block) in hcl_documents.blocks() {
            match block.ident.value().as_str() {
                "locals" => config.parse_locals(source, block, &mut e),
                "variable" => config.parse_variable(source, block, &mut e),
                "output" => config.parse_output(source, block, &mut e),
                "module" => config.parse_module_call(source, block, &mut e),
                "resource" => config.parse_resource(source, block, false, &mut e),
                "data" => config.parse_resource(source, block, true, &mut e),
                other => e.log(Issue::UnknownBlockType {
                    module: path.clone(),
                    block: other.to_string(),
                    pos: source.position(block.span()),
                }),
            }
        }

        e.into_result()?;
        Ok(config)
    }

    fn address(&self, addr: Address) -> ConfigAddress {
        ConfigAddress::new(self.path.clone(), addr)
    }

    /// Validated block labels, `None` when an issue was logged
    fn labels(
        &self,
        source: &Source,
        block: &Block,
        expected: usize,
        e: &mut BuildErrors,
    ) -> Option<Vec<String>> {
        let pos = source.position(block.span());
        if block.labels.len() != expected {
            e.log(Issue::BlockLabels {
                module: self.path.clone(),
                block: block.ident.value().as_str().to_string(),
                expected,
                found: block.labels.len(),
                pos,
            });
            return None;
        }

        let labels: Vec<String> = block
            .labels
            .iter()
            .map(|label| label.as_str().to_string())
            .collect();

        if let Some(invalid) = labels.iter().find(|label| !parse::is_identifier(label)) {
            e.log(Issue::InvalidName {
                module: self.path.clone(),
                name: invalid.clone(),
                pos,
            });
            return None;
        }

        Some(labels)
    }

    fn parse_locals(&mut self, source: &Source, block: &Block, e: &mut BuildErrors) {
        if let Some(nested) = block.body.blocks().next() {
            e.log(Issue::UnknownBlockType {
                module: self.path.clone(),
                block: nested.ident.value().as_str().to_string(),
                pos: source.position(nested.span()),
            });
        }

        for attribute in block.body.attributes() {
            let name = attribute.key.value().as_str().to_string();
            let pos = source.position(attribute.span());

            if self.locals.contains_key(&name) {
                e.log(Issue::DuplicateDeclaration {
                    address: self.address(Address::Local(name)),
                    pos,
                });
                continue;
            }

            tracing::trace!(module=%self.path, %name, "local declared");
            let local = Local {
                name: name.clone(),
                expr: attribute.value.clone().into(),
                pos,
            };
            self.locals.insert(name, Arc::new(local));
        }
    }

    fn parse_variable(&mut self, source: &Source, block: &Block, e: &mut BuildErrors) {
        let Some(labels) = self.labels(source, block, 1, e) else {
            return;
        };
        let name = labels[0].clone();
        let pos = source.position(block.span());

        if self.variables.contains_key(&name) {
            e.log(Issue::DuplicateDeclaration {
                address: self.address(Address::Variable(name)),
                pos,
            });
            return;
        }

        let variable = Variable {
            name: name.clone(),
            default: attribute_expr(&block.body, "default"),
            pos,
        };
        self.variables.insert(name, Arc::new(variable));
    }

    fn parse_output(&mut self, source: &Source, block: &Block, e: &mut BuildErrors) {
        let Some(labels) = self.labels(source, block, 1, e) else {
            return;
        };
        let name = labels[0].clone();
        let pos = source.position(block.span());
        let address = self.address(Address::Output(name.clone()));

        if self.outputs.contains_key(&name) {
            e.log(Issue::DuplicateDeclaration { address, pos });
            return;
        }

        let Some(value) = attribute_expr(&block.body, "value") else {
            e.log(Issue::MissingAttribute {
                address,
                attribute: "value",
                pos,
            });
            return;
        };

        let output = Output {
            name: name.clone(),
            value,
            depends_on: attribute_expr(&block.body, "depends_on"),
            pos,
        };
        self.outputs.insert(name, Arc::new(output));
    }

    fn parse_module_call(&mut self, source: &Source, block: &Block, e: &mut BuildErrors) {
        let Some(labels) = self.labels(source, block, 1, e) else {
            return;
        };
        let name = labels[0].clone();
        let pos = source.position(block.span());
        let address = self.address(Address::ModuleCall(name.clone()));

        if self.module_calls.contains_key(&name) {
            e.log(Issue::DuplicateDeclaration { address, pos });
            return;
        }

        let module_source = match attribute_expr(&block.body, "source") {
            None => {
                e.log(Issue::MissingAttribute {
                    address,
                    attribute: "source",
                    pos,
                });
                return;
            }
            Some(hcl::Expression::String(module_source)) => module_source,
            Some(_) => {
                e.log(Issue::UnsupportedModuleSource {
                    address,
                    module_source: "<expression>".to_string(),
                    pos,
                });
                return;
            }
        };

        if !(module_source.starts_with("./") || module_source.starts_with("../")) {
            e.log(Issue::UnsupportedModuleSource {
                address,
                module_source,
                pos,
            });
            return;
        }

        let Some(repetition) = repetition(&block.body, &address, &pos, e) else {
            return;
        };

        let arguments = block
            .body
            .attributes()
            .filter(|attribute| !META_ARGUMENTS.contains(&attribute.key.value().as_str()))
            .map(|attribute| {
                let argument = Argument {
                    expr: attribute.value.clone().into(),
                    pos: source.position(attribute.span()),
                };
                (attribute.key.value().as_str().to_string(), argument)
            })
            .collect();

        let call = ModuleCall {
            name: name.clone(),
            source: module_source,
            repetition,
            depends_on: attribute_expr(&block.body, "depends_on"),
            arguments,
            pos,
        };
        self.module_calls.insert(name, Arc::new(call));
    }

    fn parse_resource(&mut self, source: &Source, block: &Block, data: bool, e: &mut BuildErrors) {
        let Some(labels) = self.labels(source, block, 2, e) else {
            return;
        };
        let pos = source.position(block.span());

        if !ResourceAddr::is_valid_type(&labels[0]) {
            e.log(Issue::InvalidName {
                module: self.path.clone(),
                name: labels[0].clone(),
                pos,
            });
            return;
        }

        let addr = if data {
            ResourceAddr::data(&labels[0], &labels[1])
        } else {
            ResourceAddr::managed(&labels[0], &labels[1])
        };
        let address = self.address(Address::Resource(addr.clone()));

        if self.resources.contains_key(&addr) {
            e.log(Issue::DuplicateDeclaration { address, pos });
            return;
        }

        let Some(repetition) = repetition(&block.body, &address, &pos, e) else {
            return;
        };

        let resource = Resource {
            addr: addr.clone(),
            repetition,
            depends_on: attribute_expr(&block.body, "depends_on"),
            body: body_object(&block.body, true),
            pos,
        };
        self.resources.insert(addr, Arc::new(resource));
    }
}

fn attribute_expr(body: &Body, key: &str) -> Option<hcl::Expression> {
    body.attributes()
        .find(|attribute| attribute.key.value().as_str() == key)
        .map(|attribute| attribute.value.clone().into())
}

fn repetition(
    body: &Body,
    address: &ConfigAddress,
    pos: &Option<SourcePos>,
    e: &mut BuildErrors,
) -> Option<RepetitionExpr> {
    match (attribute_expr(body, "count"), attribute_expr(body, "for_each")) {
        (Some(_), Some(_)) => {
            e.log(Issue::ConflictingRepetition {
                address: address.clone(),
                pos: pos.clone(),
            });
            None
        }
        (Some(count), None) => Some(RepetitionExpr::Count(count)),
        (None, Some(for_each)) => Some(RepetitionExpr::ForEach(for_each)),
        (None, None) => Some(RepetitionExpr::Single),
    }
}

/// Turns a block body into an object expression
///
/// Nested blocks become a list of objects under their block type.
fn body_object(body: &Body, skip_meta_arguments: bool) -> hcl::Expression {
    let mut object: hcl::Object<hcl::ObjectKey, hcl::Expression> = Default::default();

    for attribute in body.attributes() {
        let key = attribute.key.value().as_str();
        if skip_meta_arguments && META_ARGUMENTS.contains(&key) {
            continue;
        }

        object.insert(
            hcl::ObjectKey::Identifier(hcl::Identifier::unchecked(key)),
            attribute.value.clone().into(),
        );
    }

    let mut nested: IndexMap<String, Vec<hcl::Expression>> = IndexMap::new();
    for block in body.blocks() {
        nested
            .entry(block.ident.value().as_str().to_string())
            .or_default()
            .push(body_object(&block.body, false));
    }

    for (ident, blocks) in nested {
        object.insert(
            hcl::ObjectKey::Identifier(hcl::Identifier::unchecked(ident)),
            hcl::Expression::Array(blocks),
        );
    }

    hcl::Expression::Object(object)
}

/// Provides the documents of a module directory
pub trait ModuleLoader {
    fn load(&self, dir: &Path) -> Result<HclDocuments, LoadError>;
}

/// Loads modules from the file system
#[derive(Debug, Default)]
pub struct DirectoryLoader;

impl ModuleLoader for DirectoryLoader {
    fn load(&self, dir: &Path) -> Result<HclDocuments, LoadError> {
        let mut documents = HclDocuments::default();
        documents.load_directory(dir)?;
        Ok(documents)
    }
}

/// Loads modules from in-memory files, keyed by their relative path
///
/// ```
/// # use modgraph::config::{Configuration, Limits, MemoryLoader};
/// let loader = MemoryLoader::new()
///     .with_file("main.hcl", r#"module "child" { source = "./child" }"#)
///     .with_file("child/main.hcl", "locals { x = 1 }");
///
/// let config = Configuration::load(&loader, "", &Limits::default()).unwrap();
/// assert_eq!(config.iter().count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MemoryLoader {
    modules: IndexMap<PathBuf, Vec<(PathBuf, String)>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        let path = normalize_path(path.as_ref());
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.modules
            .entry(dir)
            .or_default()
            .push((path, text.into()));
        self
    }
}

impl ModuleLoader for MemoryLoader {
    fn load(&self, dir: &Path) -> Result<HclDocuments, LoadError> {
        let dir = normalize_path(dir);
        let files = self
            .modules
            .get(&dir)
            .ok_or_else(|| LoadError::NoFilesFound(dir.clone()))?;

        let mut documents = HclDocuments::default();
        for (path, text) in files {
            documents.insert_source(text, Some(path.clone()))?;
        }

        Ok(documents)
    }
}

/// A module and, recursively, all modules it calls
#[derive(Debug)]
pub struct Configuration {
    pub path: Module,
    pub source_dir: PathBuf,
    pub module: ModuleConfig,
    /// Called modules, by call name
    pub children: IndexMap<String, Configuration>,
}

impl Configuration {
    /// Loads the root module from `root_dir` and every module it calls
    ///
    /// Issues of all modules are collected and returned together.
    pub fn load(
        loader: &dyn ModuleLoader,
        root_dir: impl AsRef<Path>,
        limits: &Limits,
    ) -> Result<Self, Error> {
        let source_dir = normalize_path(root_dir.as_ref());
        tracing::info!(dir=%source_dir.display(), "loading root module");

        let documents = loader.load(&source_dir)?;
        let module = ModuleConfig::new(&documents, &Module::root())?;

        let mut root = Configuration {
            path: Module::root(),
            source_dir,
            module,
            children: Default::default(),
        };

        let mut errors = BuildErrors::new();
        root.load_children(loader, limits, &mut errors);
        errors.into_result()?;

        Ok(root)
    }

    fn load_children(
        &mut self,
        loader: &dyn ModuleLoader,
        limits: &Limits,
        errors: &mut BuildErrors,
    ) {
        for call in self.module.module_calls.values() {
            let address = ConfigAddress::new(
                self.path.clone(),
                Address::ModuleCall(call.name.clone()),
            );

            let path = self.path.child(&call.name);
            if path.depth() > limits.max_module_depth {
                errors.log(Issue::ModuleDepthExceeded {
                    address,
                    limit: limits.max_module_depth,
                });
                continue;
            }

            let source_dir = normalize_path(&self.source_dir.join(&call.source));
            tracing::debug!(module=%path, dir=%source_dir.display(), "loading module");

            let documents = match loader.load(&source_dir) {
                Ok(documents) => documents,
                Err(err) => {
                    errors.log(Issue::ModuleLoad {
                        address,
                        message: error_chain(&err),
                    });
                    continue;
                }
            };

            let module = match ModuleConfig::new(&documents, &path) {
                Ok(module) => module,
                Err(issues) => {
                    errors.extend(issues);
                    continue;
                }
            };

            check_arguments(&address, call, &module, errors);

            let mut child = Configuration {
                path,
                source_dir,
                module,
                children: Default::default(),
            };
            child.load_children(loader, limits, errors);
            self.children.insert(call.name.clone(), child);
        }
    }

    /// The configuration of a module inside this tree
    pub fn descendant(&self, module: &Module) -> Option<&Configuration> {
        let relative = module.calls().get(self.path.depth()..)?;
        if !module.starts_with(&self.path) {
            return None;
        }

        relative
            .iter()
            .try_fold(self, |config, call| config.children.get(call))
    }

    /// This module and all descendants, parents first
    pub fn iter(&self) -> impl Iterator<Item = &Configuration> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.children.values().rev());
            Some(next)
        })
    }
}

fn check_arguments(
    address: &ConfigAddress,
    call: &ModuleCall,
    child: &ModuleConfig,
    errors: &mut BuildErrors,
) {
    for (name, argument) in &call.arguments {
        if !child.variables.contains_key(name) {
            errors.log(Issue::UnsupportedArgument {
                address: address.clone(),
                argument: name.clone(),
                pos: argument.pos.clone(),
            });
        }
    }

    for variable in child.variables.values() {
        if variable.default.is_none() && !call.arguments.contains_key(&variable.name) {
            errors.log(Issue::MissingArgument {
                address: address.clone(),
                variable: variable.name.clone(),
                pos: call.pos.clone(),
            });
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    std::iter::successors(Some(err), |err| err.source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
