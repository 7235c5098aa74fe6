//! # modgraph - module-aware dependency graphs
//!
//! Builds the dependency graph of a configuration made of modules, expands it once the number of
//! module instances is known and evaluates it.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `modgraph` works internally.
//!
//! ### Configurations
//!
//! A module is a directory of `.hcl` files. It declares `locals`, `variable`s, `output`s,
//! `resource`s / `data` sources and `module` calls. A module call points to another directory and
//! may repeat it with `count` or `for_each`:
//!
//! ```hcl
//! locals {
//!   names = ["a", "b"]
//! }
//!
//! module "server" {
//!   source   = "./server"
//!   for_each = local.names
//!   name     = each.key
//! }
//!
//! output "addresses" {
//!   value = module.server[*].address
//! }
//! ```
//!
//! Files are loaded into [hcl_documents::HclDocuments], which keeps track of where every
//! attribute and block came from. [config::Configuration::load] turns them into a tree of
//! [config::ModuleConfig]s, following module calls through a [config::ModuleLoader]. All problems
//! found on the way are collected as [error::Issue]s.
//!
//! ### Addresses
//!
//! See [addrs].
//!
//! | address | meaning |
//! |---------|---------|
//! | `module.server` | the module called `server`, all of its instances ([addrs::Module]) |
//! | `module.server["a"]` | one instance of it ([addrs::ModuleInstance]) |
//! | `module.server.local.x` | a declaration inside the module ([addrs::ConfigAddress]) |
//! | `module.server["a"].local.x` | the same declaration inside one instance ([addrs::AbsAddress]) |
//!
//! ### Static graph
//!
//! [builder::StaticGraphBuilder] creates one [node::StaticNode] per declaration per module. Edges
//! come from the references inside the expressions of a declaration ([references]), resolved
//! against the addresses other nodes advertise. Every node inside a called module also depends on
//! the module call node, which decides how many instances exist.
//!
//! ### Walk
//!
//! A [walk::Walker] goes through the static graph in topological levels. Each level is first
//! expanded into [node::ConcreteNode]s by the [expand::ExpansionEngine], one per module instance,
//! using the repetitions recorded in the [expander::InstanceExpander]. The concrete nodes of a level
//! are then evaluated in parallel ([eval]) and their results are recorded: values in the
//! [walk::State], module repetitions in the expander.
//!
//! ### Output
//!
//! Evaluated values are converted to [value::Value] which in turn gets serialized via [serde].
//!
pub mod addrs;
pub mod builder;
pub mod config;
pub mod error;
pub mod eval;
pub mod expand;
pub mod expander;
pub mod graph;
pub mod hcl_documents;
pub mod node;
pub mod references;
mod util;
pub mod value;
mod visit;
pub mod walk;
