//! Addresses of modules, module instances and declarations
//!
//! Every address has a canonical string form which parses back into the same address.
mod declaration;
mod module;
pub(crate) mod parse;
mod referenceable;

pub use declaration::{
    AbsAddress, AbsResourceInstance, Address, ConfigAddress, ResourceAddr, ResourceMode, Target,
};
pub use module::{InstanceKey, Module, ModuleInstance, ModuleInstanceStep, ModulePath};
pub use referenceable::Referenceable;
