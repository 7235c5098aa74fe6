//! Addresses of declarations, unexpanded ([ConfigAddress]) and expanded ([AbsAddress])
use super::parse::{self, Step};
use super::{InstanceKey, Module, ModuleInstance};
use crate::error::Error;
use std::fmt;

/// Namespaces that can not be used as resource types
const RESERVED_ROOTS: &[&str] = &[
    "local", "var", "output", "module", "data", "count", "each", "path", "self",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceMode {
    /// `resource` blocks
    Managed,
    /// `data` blocks
    Data,
}

/// A resource declaration, relative to its module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceAddr {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
}

impl ResourceAddr {
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub(crate) fn is_valid_type(type_name: &str) -> bool {
        !RESERVED_ROOTS.contains(&type_name)
    }
}

impl fmt::Display for ResourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

/// A declaration relative to the module it is declared in
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    Local(String),
    Variable(String),
    Output(String),
    ModuleCall(String),
    Resource(ResourceAddr),
}

impl Address {
    /// Kind of declaration, as used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Address::Local(_) => "local",
            Address::Variable(_) => "variable",
            Address::Output(_) => "output",
            Address::ModuleCall(_) => "module",
            Address::Resource(ResourceAddr {
                mode: ResourceMode::Managed,
                ..
            }) => "resource",
            Address::Resource(ResourceAddr {
                mode: ResourceMode::Data,
                ..
            }) => "data",
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Local(name) => write!(f, "local.{name}"),
            Address::Variable(name) => write!(f, "var.{name}"),
            Address::Output(name) => write!(f, "output.{name}"),
            Address::ModuleCall(name) => write!(f, "module.{name}"),
            Address::Resource(resource) => fmt::Display::fmt(&resource, f),
        }
    }
}

/// Interprets the steps following the module prefix as a declaration
fn declaration(input: &str, rest: &[Step]) -> Result<Address, Error> {
    let address = match rest {
        [Step::Attr(kind), Step::Attr(name)] if kind == "local" => Address::Local(name.clone()),
        [Step::Attr(kind), Step::Attr(name)] if kind == "var" => Address::Variable(name.clone()),
        [Step::Attr(kind), Step::Attr(name)] if kind == "output" => Address::Output(name.clone()),
        [Step::Attr(kind), Step::Attr(type_name), Step::Attr(name)] if kind == "data" => {
            Address::Resource(ResourceAddr::data(type_name.clone(), name.clone()))
        }
        [Step::Attr(type_name), Step::Attr(name)] if ResourceAddr::is_valid_type(type_name) => {
            Address::Resource(ResourceAddr::managed(type_name.clone(), name.clone()))
        }
        [] => return Err(parse::invalid(input, "missing declaration")),
        _ => return Err(parse::invalid(input, "not a declaration address")),
    };

    Ok(address)
}

fn join(f: &mut fmt::Formatter<'_>, module: &dyn fmt::Display, addr: &dyn fmt::Display) -> fmt::Result {
    let module = module.to_string();
    if module.is_empty() {
        fmt::Display::fmt(addr, f)
    } else {
        write!(f, "{module}.{addr}")
    }
}

/// A declaration inside a (not yet expanded) module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigAddress {
    pub module: Module,
    pub addr: Address,
}

impl ConfigAddress {
    pub fn new(module: Module, addr: Address) -> Self {
        Self { module, addr }
    }

    /// The same declaration inside one instance of its module
    pub fn absolute(&self, module: ModuleInstance) -> AbsAddress {
        debug_assert_eq!(module.module(), self.module);
        AbsAddress::new(module, self.addr.clone())
    }
}

impl fmt::Display for ConfigAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        join(f, &self.module, &self.addr)
    }
}

impl std::str::FromStr for ConfigAddress {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let abs: AbsAddress = input.parse()?;
        if abs.module.steps().iter().any(|step| step.key != InstanceKey::NoKey) {
            return Err(parse::invalid(
                input,
                "a configuration address must not contain instance keys",
            ));
        }

        Ok(Self::new(abs.module.module(), abs.addr))
    }
}

/// A declaration inside one module instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbsAddress {
    pub module: ModuleInstance,
    pub addr: Address,
}

impl AbsAddress {
    pub fn new(module: ModuleInstance, addr: Address) -> Self {
        Self { module, addr }
    }

    /// The unexpanded address this is an instance of
    pub fn config(&self) -> ConfigAddress {
        ConfigAddress::new(self.module.module(), self.addr.clone())
    }
}

impl fmt::Display for AbsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        join(f, &self.module, &self.addr)
    }
}

impl std::str::FromStr for AbsAddress {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let steps = parse::steps(input)?;
        let (module, rest) = parse::module_instance_prefix(input, &steps)?;

        if !rest.is_empty() {
            return Ok(Self::new(module, declaration(input, rest)?));
        }

        // a trailing `module.<name>` is the declaration of a module call
        let Some((parent, step)) = module.parent() else {
            return Err(parse::invalid(input, "missing declaration"));
        };
        if step.key != InstanceKey::NoKey {
            return Err(parse::invalid(
                input,
                "a module call address must not have an instance key",
            ));
        }

        Ok(Self::new(parent, Address::ModuleCall(step.name.clone())))
    }
}

/// One instance of a repeated resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbsResourceInstance {
    pub module: ModuleInstance,
    pub resource: ResourceAddr,
    pub key: InstanceKey,
}

impl fmt::Display for AbsResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        join(f, &self.module, &self.resource)?;
        fmt::Display::fmt(&self.key, f)
    }
}

impl std::str::FromStr for AbsResourceInstance {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let steps = parse::steps(input)?;
        let (module, rest) = parse::module_instance_prefix(input, &steps)?;

        let (rest, key) = match rest {
            [rest @ .., Step::Key(key)] => (rest, key.clone()),
            _ => (rest, InstanceKey::NoKey),
        };

        let Address::Resource(resource) = declaration(input, rest)? else {
            return Err(parse::invalid(input, "not a resource instance address"));
        };

        Ok(Self {
            module,
            resource,
            key,
        })
    }
}

/// Selection of a module subtree or of a single declaration, used for targeting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub module: Module,
    pub addr: Option<Address>,
}

impl Target {
    /// Whether a declaration is selected by this target
    pub fn selects(&self, module: &Module, addr: &Address) -> bool {
        match &self.addr {
            None => module.starts_with(&self.module),
            Some(target) => module == &self.module && target == addr,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.addr {
            None => fmt::Display::fmt(&self.module, f),
            Some(addr) => join(f, &self.module, addr),
        }
    }
}

impl std::str::FromStr for Target {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        // a module call address selects the whole module subtree
        if let Ok(module) = input.parse::<Module>() {
            return Ok(Self { module, addr: None });
        }

        let config: ConfigAddress = input.parse()?;
        Ok(Self {
            module: config.module,
            addr: Some(config.addr),
        })
    }
}
