//! Per-walk record of how module calls repeat and which module instances exist
use crate::addrs::{InstanceKey, Module, ModuleInstance};
use crate::config::Limits;
use crate::error::Error;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Evaluated `count` / `for_each` of one module call in one parent instance
#[derive(Debug, Clone, PartialEq)]
pub enum Repetition {
    /// neither `count` nor `for_each`
    Single,
    Count(usize),
    /// keys are sorted
    ForEach(IndexMap<String, hcl::Value>),
}

impl Repetition {
    /// Builds a `for_each` repetition, ordering the instances by key
    pub fn for_each(values: impl IntoIterator<Item = (String, hcl::Value)>) -> Self {
        let mut values: IndexMap<String, hcl::Value> = values.into_iter().collect();
        values.sort_keys();
        Repetition::ForEach(values)
    }

    pub fn len(&self) -> usize {
        match self {
            Repetition::Single => 1,
            Repetition::Count(count) => *count,
            Repetition::ForEach(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instance keys, in order
    pub fn keys(&self) -> Vec<InstanceKey> {
        match self {
            Repetition::Single => vec![InstanceKey::NoKey],
            Repetition::Count(count) => (0..*count as i64).map(InstanceKey::Int).collect(),
            Repetition::ForEach(values) => values
                .keys()
                .map(|key| InstanceKey::Str(key.clone()))
                .collect(),
        }
    }

    /// `count.*` / `each.*` of the instance with `key`
    pub fn data(&self, key: &InstanceKey) -> RepetitionData {
        match (self, key) {
            (Repetition::Count(_), InstanceKey::Int(index)) => RepetitionData {
                count_index: Some(*index),
                ..Default::default()
            },
            (Repetition::ForEach(values), InstanceKey::Str(key)) => RepetitionData {
                each_key: Some(key.clone()),
                each_value: values.get(key).cloned(),
                ..Default::default()
            },
            _ => RepetitionData::default(),
        }
    }

    /// Whether `key` names an instance of this repetition
    pub fn check_key(&self, key: &InstanceKey) -> Result<(), String> {
        match (self, key) {
            (_, InstanceKey::NoKey) => Ok(()),
            (Repetition::Single, _) => Err("is not repeated and can not be indexed".to_string()),
            (Repetition::Count(count), InstanceKey::Int(index)) => {
                if (0..*count as i64).contains(index) {
                    Ok(())
                } else {
                    Err(format!("has {count} instance(s), index {index} is out of range"))
                }
            }
            (Repetition::Count(_), InstanceKey::Str(_)) => {
                Err("uses count, its instances are indexed by number".to_string())
            }
            (Repetition::ForEach(values), InstanceKey::Str(key)) => {
                if values.contains_key(key) {
                    Ok(())
                } else {
                    Err(format!("has no instance with key {key:?}"))
                }
            }
            (Repetition::ForEach(_), InstanceKey::Int(_)) => {
                Err("uses for_each, its instances are indexed by key".to_string())
            }
        }
    }
}

/// Values of `count.index`, `each.key` and `each.value` inside one instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepetitionData {
    pub count_index: Option<i64>,
    pub each_key: Option<String>,
    pub each_value: Option<hcl::Value>,
}

/// Maps every module to the module instances it expands to
///
/// Repetitions are recorded by module instance and call name while the walk evaluates module
/// calls. Once the expansion of a module has started (see [InstanceExpander::seal]) the
/// repetition of its calls can no longer change.
#[derive(Debug)]
pub struct InstanceExpander {
    calls: IndexMap<ModuleInstance, IndexMap<String, Repetition>>,
    sealed: HashSet<Module>,
    limits: Limits,
}

impl Default for InstanceExpander {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl InstanceExpander {
    pub fn new(limits: Limits) -> Self {
        Self {
            calls: Default::default(),
            sealed: Default::default(),
            limits,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Records how the call `call` inside `parent` repeats
    pub fn set_repetition(
        &mut self,
        parent: &ModuleInstance,
        call: &str,
        repetition: Repetition,
    ) -> Result<(), Error> {
        let module = parent.module().child(call);
        if self.sealed.contains(&module) {
            return Err(Error::ExpanderSealed {
                module: module.to_string(),
            });
        }

        if repetition.len() > self.limits.max_module_instances {
            return Err(Error::LimitExceeded {
                what: "module instances",
                limit: self.limits.max_module_instances,
                actual: repetition.len(),
            });
        }

        tracing::debug!(%parent, %call, instances = repetition.len(), "module repetition recorded");
        self.calls
            .entry(parent.clone())
            .or_default()
            .insert(call.to_string(), repetition);
        Ok(())
    }

    /// Freezes the repetition of every call leading to instances of `module`
    pub fn seal(&mut self, module: &Module) {
        if self.sealed.insert(module.clone()) {
            tracing::trace!(%module, "module sealed");
        }
    }

    pub fn is_sealed(&self, module: &Module) -> bool {
        self.sealed.contains(module)
    }

    pub fn repetition(&self, parent: &ModuleInstance, call: &str) -> Option<&Repetition> {
        self.calls.get(parent).and_then(|calls| calls.get(call))
    }

    /// All instances of `module`, parents first and in key order
    ///
    /// Fails when the repetition of a call on the way to `module` is not known yet.
    pub fn expand_module(&self, module: &Module) -> Result<Vec<ModuleInstance>, Error> {
        let mut instances = vec![ModuleInstance::root()];

        for call in module.calls() {
            let mut next = vec![];
            for parent in &instances {
                let repetition = self.repetition(parent, call).ok_or_else(|| {
                    Error::ExpansionPrecondition {
                        module: module.to_string(),
                        missing: parent.module().child(call.clone()).to_string(),
                    }
                })?;

                next.extend(
                    repetition
                        .keys()
                        .into_iter()
                        .map(|key| parent.child(call.clone(), key)),
                );
            }

            if next.len() > self.limits.max_module_instances {
                return Err(Error::LimitExceeded {
                    what: "module instances",
                    limit: self.limits.max_module_instances,
                    actual: next.len(),
                });
            }
            instances = next;
        }

        Ok(instances)
    }

    /// `count.*` / `each.*` of a module instance, empty for the root module
    pub fn repetition_data(&self, instance: &ModuleInstance) -> RepetitionData {
        let Some((parent, step)) = instance.parent() else {
            return RepetitionData::default();
        };

        self.repetition(&parent, &step.name)
            .map(|repetition| repetition.data(&step.key))
            .unwrap_or_default()
    }

    /// Whether `key` names an instance of `call` inside `parent`
    ///
    /// Calls with unknown repetition accept every key.
    pub fn check_key(
        &self,
        parent: &ModuleInstance,
        call: &str,
        key: &InstanceKey,
    ) -> Result<(), String> {
        match self.repetition(parent, call) {
            None => Ok(()),
            Some(repetition) => repetition
                .check_key(key)
                .map_err(|reason| format!("{} {reason}", parent.module().child(call))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rendered(instances: Vec<ModuleInstance>) -> Vec<String> {
        instances.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn root_expands_to_itself() {
        let expander = InstanceExpander::default();
        assert_eq!(
            expander.expand_module(&Module::root()).unwrap(),
            vec![ModuleInstance::root()]
        );
    }

    #[test]
    fn nested_expansion() {
        let mut expander = InstanceExpander::default();
        let root = ModuleInstance::root();

        expander
            .set_repetition(&root, "a", Repetition::Count(2))
            .unwrap();
        for index in 0..2 {
            let parent = root.child("a", InstanceKey::Int(index));
            let repetition = Repetition::for_each([
                ("y".to_string(), hcl::Value::from(2)),
                ("x".to_string(), hcl::Value::from(1)),
            ]);
            expander.set_repetition(&parent, "b", repetition).unwrap();
        }

        let module = Module::new(["a", "b"]).unwrap();
        assert_eq!(
            rendered(expander.expand_module(&module).unwrap()),
            vec![
                r#"module.a[0].module.b["x"]"#,
                r#"module.a[0].module.b["y"]"#,
                r#"module.a[1].module.b["x"]"#,
                r#"module.a[1].module.b["y"]"#,
            ]
        );

        let instance: ModuleInstance = r#"module.a[1].module.b["y"]"#.parse().unwrap();
        assert_eq!(
            expander.repetition_data(&instance),
            RepetitionData {
                count_index: None,
                each_key: Some("y".into()),
                each_value: Some(hcl::Value::from(2)),
            }
        );
        assert_eq!(
            expander
                .repetition_data(&root.child("a", InstanceKey::Int(1)))
                .count_index,
            Some(1)
        );
    }

    #[test]
    fn zero_instances() {
        let mut expander = InstanceExpander::default();
        expander
            .set_repetition(&ModuleInstance::root(), "a", Repetition::Count(0))
            .unwrap();

        // children of a module without instances have no instances either
        let module = Module::new(["a", "b"]).unwrap();
        assert_eq!(expander.expand_module(&module).unwrap(), vec![]);
    }

    #[test]
    fn unknown_ancestry_is_a_precondition_violation() {
        let expander = InstanceExpander::default();
        let module = Module::new(["a", "b"]).unwrap();

        let Err(Error::ExpansionPrecondition { missing, .. }) = expander.expand_module(&module)
        else {
            panic!("expansion must fail");
        };
        assert_eq!(missing, "module.a");
    }

    #[test]
    fn sealed_modules_reject_changes() {
        let mut expander = InstanceExpander::default();
        let root = ModuleInstance::root();

        expander.set_repetition(&root, "a", Repetition::Single).unwrap();
        expander.seal(&Module::new(["a"]).unwrap());

        assert!(matches!(
            expander.set_repetition(&root, "a", Repetition::Count(3)),
            Err(Error::ExpanderSealed { .. })
        ));
        assert!(expander.set_repetition(&root, "b", Repetition::Count(3)).is_ok());
    }

    #[test]
    fn instance_limit() {
        let mut expander = InstanceExpander::new(Limits {
            max_module_instances: 4,
            ..Default::default()
        });
        let root = ModuleInstance::root();

        assert!(matches!(
            expander.set_repetition(&root, "a", Repetition::Count(5)),
            Err(Error::LimitExceeded { actual: 5, .. })
        ));

        expander.set_repetition(&root, "a", Repetition::Count(3)).unwrap();
        for index in 0..3 {
            let parent = root.child("a", InstanceKey::Int(index));
            expander
                .set_repetition(&parent, "b", Repetition::Count(2))
                .unwrap();
        }

        let module = Module::new(["a", "b"]).unwrap();
        assert!(matches!(
            expander.expand_module(&module),
            Err(Error::LimitExceeded { actual: 6, .. })
        ));
    }

    #[test]
    fn key_checks() {
        let mut expander = InstanceExpander::default();
        let root = ModuleInstance::root();
        expander.set_repetition(&root, "counted", Repetition::Count(2)).unwrap();
        expander.set_repetition(&root, "single", Repetition::Single).unwrap();

        assert!(expander.check_key(&root, "counted", &InstanceKey::Int(1)).is_ok());
        assert_eq!(
            expander.check_key(&root, "counted", &InstanceKey::Int(2)),
            Err("module.counted has 2 instance(s), index 2 is out of range".to_string())
        );
        assert!(expander
            .check_key(&root, "counted", &InstanceKey::from("a"))
            .is_err());
        assert!(expander
            .check_key(&root, "single", &InstanceKey::Int(0))
            .is_err());
        assert!(expander.check_key(&root, "unknown", &InstanceKey::Int(0)).is_ok());
    }
}
