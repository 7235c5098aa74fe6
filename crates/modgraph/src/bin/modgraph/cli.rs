//! modgraph cli interface

use clap::{Parser, Subcommand, ValueEnum};
use modgraph::addrs::Target;
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; modgraph ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the dependency graph in graphviz dot format
    Graph(GraphCommand),

    /// Walk the configuration and print the root module's outputs
    #[command(alias = "evaluate")]
    Eval(EvalCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct GraphCommand {
    /// Print the expanded graph, evaluates the configuration to find all module instances
    #[clap(short = 'e', long = "expanded")]
    pub expanded: bool,

    /// Only include the given declarations or modules and what they depend on
    #[clap(short = 't', long = "target")]
    pub targets: Vec<Target>,

    #[clap(flatten)]
    pub vars: VarArgs,
}

#[derive(Parser, Debug)]
pub struct EvalCommand {
    #[clap(flatten)]
    pub vars: VarArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Print every evaluated value instead of the root module's outputs
    #[clap(short = 'a', long = "all")]
    pub all: bool,
}

#[derive(Parser, Debug)]
pub struct VarArgs {
    /// Set a variable of the root module, the value is an hcl expression
    #[clap(long = "var", value_name = "NAME=EXPR", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

fn parse_var(input: &str) -> Result<(String, String), String> {
    let (name, expr) = input
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=EXPR, got {input:?}"))?;

    Ok((name.trim().to_string(), expr.trim().to_string()))
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Loaded documents of the root module
    Documents,
    /// Nodes and edges of the static graph
    Static,
    /// Nodes and edges of the expanded graph
    Expanded,
}
