//! Things an expression can refer to, relative to the module the expression is in
use super::{InstanceKey, ResourceAddr};
use std::fmt;

/// Subject of a reference
///
/// Nodes advertise the subjects they can be referenced as, expressions produce subjects they
/// refer to. [Referenceable::covers] decides whether a reference reaches an advertised subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Referenceable {
    /// `local.<name>`
    Local(String),
    /// `var.<name>`
    Variable(String),
    /// `module.<call>`, `module.<call>[<key>]`, `module.<call>.<output>`, ...
    ModuleCall {
        call: String,
        key: Option<InstanceKey>,
        output: Option<String>,
    },
    /// `<type>.<name>` or `data.<type>.<name>`, optionally indexed
    Resource {
        resource: ResourceAddr,
        key: Option<InstanceKey>,
    },
    /// Destroy phase of a resource, only ever used for ordering
    ResourceDestroy(ResourceAddr),
    /// `count.<attr>`
    Count(String),
    /// `each.<attr>`
    Each(String),
    /// `path.<attr>`
    Path(String),
    /// `self`
    SelfObject,
}

impl Referenceable {
    pub fn module_call(call: impl Into<String>) -> Self {
        Referenceable::ModuleCall {
            call: call.into(),
            key: None,
            output: None,
        }
    }

    /// Subjects that are provided by the evaluation scope instead of a graph node
    pub fn is_contextual(&self) -> bool {
        matches!(
            self,
            Referenceable::Count(_)
                | Referenceable::Each(_)
                | Referenceable::Path(_)
                | Referenceable::SelfObject
        )
    }

    /// Subjects that only influence ordering and may be absent from the graph
    pub fn is_ordering_only(&self) -> bool {
        matches!(self, Referenceable::ResourceDestroy(_))
    }

    /// Whether a reference to `self` reaches the `advertised` subject
    ///
    /// A reference to a whole module call reaches all its outputs, an indexed reference reaches
    /// only outputs of that instance (or outputs advertised for all instances). Resource references
    /// reach the resource regardless of their key.
    pub fn covers(&self, advertised: &Referenceable) -> bool {
        use Referenceable::*;

        match (self, advertised) {
            (
                ModuleCall { call, key, output },
                ModuleCall {
                    call: advertised_call,
                    key: advertised_key,
                    output: advertised_output,
                },
            ) => {
                if call != advertised_call {
                    return false;
                }

                let output_matches = match advertised_output {
                    None => output.is_none(),
                    Some(advertised_output) => {
                        output.is_none() || output.as_ref() == Some(advertised_output)
                    }
                };

                let key_matches = match (advertised_key, key) {
                    (None, _) | (_, None) => true,
                    (Some(advertised_key), Some(key)) => advertised_key == key,
                };

                output_matches && key_matches
            }
            (Resource { resource, .. }, Resource { resource: other, .. }) => resource == other,
            (ResourceDestroy(resource), ResourceDestroy(other)) => resource == other,
            (reference, advertised) => reference == advertised,
        }
    }
}

impl fmt::Display for Referenceable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referenceable::Local(name) => write!(f, "local.{name}"),
            Referenceable::Variable(name) => write!(f, "var.{name}"),
            Referenceable::ModuleCall { call, key, output } => {
                write!(f, "module.{call}")?;
                if let Some(key) = key {
                    fmt::Display::fmt(&key, f)?;
                }
                if let Some(output) = output {
                    write!(f, ".{output}")?;
                }
                Ok(())
            }
            Referenceable::Resource { resource, key } => {
                fmt::Display::fmt(&resource, f)?;
                if let Some(key) = key {
                    fmt::Display::fmt(&key, f)?;
                }
                Ok(())
            }
            Referenceable::ResourceDestroy(resource) => write!(f, "{resource} (destroy)"),
            Referenceable::Count(attr) => write!(f, "count.{attr}"),
            Referenceable::Each(attr) => write!(f, "each.{attr}"),
            Referenceable::Path(attr) => write!(f, "path.{attr}"),
            Referenceable::SelfObject => f.write_str("self"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn output(call: &str, key: Option<InstanceKey>, output: Option<&str>) -> Referenceable {
        Referenceable::ModuleCall {
            call: call.into(),
            key,
            output: output.map(Into::into),
        }
    }

    #[test]
    fn module_references() {
        let whole = output("child", None, None);
        let indexed = output("child", Some(InstanceKey::Int(1)), None);
        let indexed_output = output("child", Some(InstanceKey::Int(1)), Some("id"));

        // static outputs, advertised for every instance
        let advertised = output("child", None, Some("id"));
        assert!(whole.covers(&advertised));
        assert!(indexed.covers(&advertised));
        assert!(indexed_output.covers(&advertised));
        assert!(!output("child", None, Some("other")).covers(&advertised));
        assert!(!output("other", None, None).covers(&advertised));

        // concrete outputs of one instance
        let advertised = output("child", Some(InstanceKey::Int(0)), Some("id"));
        assert!(whole.covers(&advertised));
        assert!(!indexed.covers(&advertised));
        assert!(!indexed_output.covers(&advertised));

        // the call itself is only reached by references to the whole call
        let call = Referenceable::module_call("child");
        assert!(whole.covers(&call));
        assert!(!indexed_output.covers(&call));
    }

    #[test]
    fn resource_references_ignore_keys() {
        let resource = ResourceAddr::managed("server", "web");
        let reference = Referenceable::Resource {
            resource: resource.clone(),
            key: Some(InstanceKey::Int(3)),
        };

        assert!(reference.covers(&Referenceable::Resource {
            resource: resource.clone(),
            key: None
        }));
        assert!(!reference.covers(&Referenceable::ResourceDestroy(resource.clone())));
        assert!(Referenceable::ResourceDestroy(resource.clone())
            .covers(&Referenceable::ResourceDestroy(resource)));
    }

    #[test]
    fn classification() {
        assert!(Referenceable::Count("index".into()).is_contextual());
        assert!(Referenceable::SelfObject.is_contextual());
        assert!(!Referenceable::Local("a".into()).is_contextual());
        assert!(
            Referenceable::ResourceDestroy(ResourceAddr::data("image", "base")).is_ordering_only()
        );
    }

    #[test]
    fn display() {
        assert_eq!(
            output("child", Some(InstanceKey::from("a")), Some("id")).to_string(),
            r#"module.child["a"].id"#
        );
        assert_eq!(
            Referenceable::Resource {
                resource: ResourceAddr::data("image", "base"),
                key: Some(InstanceKey::Int(0))
            }
            .to_string(),
            "data.image.base[0]"
        );
    }
}
