//! Module paths (declaration sites) and module instances (expanded topology)
use super::parse;
use crate::error::Error;
use std::fmt;

/// Key of one instance of a repeated construct
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceKey {
    /// The construct is not repeated
    NoKey,
    /// `count` index
    Int(i64),
    /// `for_each` key
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::NoKey => Ok(()),
            InstanceKey::Int(index) => write!(f, "[{index}]"),
            InstanceKey::Str(key) => write!(f, "[{}]", parse::quote(key)),
        }
    }
}

impl From<i64> for InstanceKey {
    fn from(value: i64) -> Self {
        InstanceKey::Int(value)
    }
}

impl From<&str> for InstanceKey {
    fn from(value: &str) -> Self {
        InstanceKey::Str(value.to_string())
    }
}

/// Path of module calls leading from the root module to a module
///
/// The root module is the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Module(Vec<String>);

impl Module {
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a module path from a list of call names
    pub fn new<I, S>(calls: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let calls: Vec<String> = calls.into_iter().map(Into::into).collect();
        if let Some(invalid) = calls.iter().find(|call| !parse::is_identifier(call)) {
            return Err(Error::InvalidAddress {
                input: calls.join("."),
                reason: format!("{invalid:?} is not a valid module call name"),
            });
        }

        Ok(Self(calls))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn calls(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn child(&self, call: impl Into<String>) -> Self {
        let mut calls = self.0.clone();
        calls.push(call.into());
        Self(calls)
    }

    /// Parent module and the name of the call declaring this module
    pub fn parent(&self) -> Option<(Module, &str)> {
        let (last, parent) = self.0.split_last()?;
        Some((Module(parent.to_vec()), last.as_str()))
    }

    /// Whether `self` is `other` or one of its descendants
    pub fn starts_with(&self, other: &Module) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, call) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            write!(f, "module.{call}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Module {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let steps = parse::steps(input)?;
        let (instance, rest) = parse::module_instance_prefix(input, &steps)?;
        parse::expect_end(input, rest)?;

        if instance.steps().iter().any(|step| step.key != InstanceKey::NoKey) {
            return Err(parse::invalid(
                input,
                "a module path must not contain instance keys",
            ));
        }

        Ok(instance.module())
    }
}

/// One resolved call step of a [ModuleInstance]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleInstanceStep {
    pub name: String,
    pub key: InstanceKey,
}

impl fmt::Display for ModuleInstanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module.{}{}", self.name, self.key)
    }
}

/// A module with each call step resolved to a concrete instance key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleInstance(Vec<ModuleInstanceStep>);

impl ModuleInstance {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[ModuleInstanceStep] {
        &self.0
    }

    pub fn child(&self, name: impl Into<String>, key: InstanceKey) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleInstanceStep {
            name: name.into(),
            key,
        });
        Self(steps)
    }

    pub fn parent(&self) -> Option<(ModuleInstance, &ModuleInstanceStep)> {
        let (last, parent) = self.0.split_last()?;
        Some((ModuleInstance(parent.to_vec()), last))
    }

    /// The module this is an instance of
    pub fn module(&self) -> Module {
        Module(self.0.iter().map(|step| step.name.clone()).collect())
    }

    /// Key of the last call step
    pub fn key(&self) -> &InstanceKey {
        self.0
            .last()
            .map(|step| &step.key)
            .unwrap_or(&InstanceKey::NoKey)
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            fmt::Display::fmt(&step, f)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ModuleInstance {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let steps = parse::steps(input)?;
        let (instance, rest) = parse::module_instance_prefix(input, &steps)?;
        parse::expect_end(input, rest)?;
        Ok(instance)
    }
}

/// Scope that graph nodes live in: a [Module] for static nodes and a [ModuleInstance] for concrete nodes
pub trait ModulePath:
    Clone + Eq + std::hash::Hash + fmt::Display + fmt::Debug + Send + Sync
{
    /// Parent scope and the name of the module call that leads to `self`
    fn parent_call(&self) -> Option<(Self, &str)>;

    /// Key of the last call step, `None` when keys are not resolved
    fn instance_key(&self) -> Option<InstanceKey>;

    fn to_module(&self) -> Module;
}

impl ModulePath for Module {
    fn parent_call(&self) -> Option<(Self, &str)> {
        self.parent()
    }

    fn instance_key(&self) -> Option<InstanceKey> {
        None
    }

    fn to_module(&self) -> Module {
        self.clone()
    }
}

impl ModulePath for ModuleInstance {
    fn parent_call(&self) -> Option<(Self, &str)> {
        self.parent().map(|(parent, step)| (parent, step.name.as_str()))
    }

    fn instance_key(&self) -> Option<InstanceKey> {
        Some(self.key().clone())
    }

    fn to_module(&self) -> Module {
        self.module()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn module_display() {
        assert_eq!(Module::root().to_string(), "");
        assert_eq!(
            Module::new(["network", "subnets"]).unwrap().to_string(),
            "module.network.module.subnets"
        );
    }

    #[test]
    fn module_rejects_invalid_call_names() {
        assert!(matches!(
            Module::new(["not valid"]),
            Err(Error::InvalidAddress { .. })
        ));
    }

    #[test]
    fn module_instance_display() {
        let instance = ModuleInstance::root()
            .child("a", InstanceKey::Int(0))
            .child("b", InstanceKey::NoKey)
            .child("c", InstanceKey::from("x"));

        assert_eq!(instance.to_string(), r#"module.a[0].module.b.module.c["x"]"#);
        assert_eq!(instance.module().to_string(), "module.a.module.b.module.c");
    }

    #[test]
    fn parents() {
        let module = Module::new(["a", "b"]).unwrap();
        let (parent, call) = module.parent().unwrap();
        assert_eq!(parent, Module::new(["a"]).unwrap());
        assert_eq!(call, "b");
        assert!(Module::root().parent().is_none());

        let instance = ModuleInstance::root().child("a", InstanceKey::Int(2));
        let (parent, call) = instance.parent_call().unwrap();
        assert!(parent.is_root());
        assert_eq!(call, "a");
        assert_eq!(instance.key(), &InstanceKey::Int(2));
    }

    #[test]
    fn round_trip() {
        for input in [
            "",
            "module.a",
            "module.a.module.b",
            "module.a[0]",
            r#"module.a["key"].module.b[3]"#,
            r#"module.a["with \"quotes\""]"#,
        ] {
            let instance: ModuleInstance = input.parse().unwrap();
            assert_eq!(instance.to_string(), input);
        }

        for input in ["", "module.a", "module.a.module.b"] {
            let module: Module = input.parse().unwrap();
            assert_eq!(module.to_string(), input);
        }
    }

    #[test]
    fn module_path_rejects_keys() {
        assert!("module.a[0]".parse::<Module>().is_err());
    }

    #[test]
    fn malformed_module_instances() {
        for input in ["module", "module.a.local.x", "module.a[0][1]", "local", "module.a["] {
            assert!(
                input.parse::<ModuleInstance>().is_err(),
                "{input} must not parse"
            );
        }
    }
}
