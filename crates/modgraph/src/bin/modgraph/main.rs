mod cli;

use hcl::eval::Evaluate;
use indexmap::IndexMap;
use modgraph::builder::StaticGraphBuilder;
use modgraph::config::{Configuration, DirectoryLoader, Limits};
use modgraph::value::Value;
use modgraph::walk::{Walk, WalkOptions, Walker};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("MODGRAPH_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Graph(graph_cli) => graph(graph_cli),
        cli::Command::Eval(eval_cli) => eval(eval_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn load() -> anyhow::Result<Configuration> {
    let config = Configuration::load(&DirectoryLoader, std::env::current_dir()?, &Limits::default())?;
    Ok(config)
}

/// Evaluates the `--var` expressions, they may only use functions
fn inputs(vars: &cli::VarArgs) -> anyhow::Result<IndexMap<String, hcl::Value>> {
    let mut context = hcl::eval::Context::new();
    modgraph::eval::declare_functions(&mut context);

    let mut inputs = IndexMap::new();
    for (name, expr) in &vars.vars {
        let parsed: hcl_edit::expr::Expression = expr.parse()?;
        let value = hcl::Expression::from(parsed).evaluate(&context)?;
        inputs.insert(name.clone(), value);
    }
    Ok(inputs)
}

/// Walks the configuration, failing when any node failed to evaluate
fn walk(config: &Configuration, options: WalkOptions) -> anyhow::Result<Walk> {
    let walk = Walker::new(config, options).walk()?;

    if let Some(failure) = walk.failures.first() {
        for other in &walk.failures[1..] {
            eprintln!("{other}");
        }
        anyhow::bail!("evaluation failed: {failure}");
    }

    Ok(walk)
}

pub fn graph(cli: cli::GraphCommand) -> anyhow::Result<()> {
    let config = load()?;

    if !cli.expanded {
        let mut graph = StaticGraphBuilder::new(&config).build()?;
        if !cli.targets.is_empty() {
            modgraph::graph::prune_untargeted(&mut graph, |node| {
                use modgraph::node::GraphNodeAddressable;
                cli.targets
                    .iter()
                    .any(|target| target.selects(&node.module_path(), &node.address()))
            });
        }
        println!("{}", graph.to_dot());
        return Ok(());
    }

    let options = WalkOptions {
        inputs: inputs(&cli.vars)?,
        targets: cli.targets,
        ..Default::default()
    };
    let walk = walk(&config, options)?;
    println!("{}", walk.graph.to_dot());

    Ok(())
}

pub fn eval(cli: cli::EvalCommand) -> anyhow::Result<()> {
    let config = load()?;
    let options = WalkOptions {
        inputs: inputs(&cli.vars)?,
        ..Default::default()
    };
    let walk = walk(&config, options)?;

    let value = if cli.all {
        Value::Object(
            walk.state
                .iter()
                .map(|(addr, value)| (addr.to_string(), value.clone().into()))
                .collect(),
        )
    } else {
        walk.root_outputs().into()
    };

    output(&cli.output, &value)
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (modgraph-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Documents => {
            let mut documents = modgraph::hcl_documents::HclDocuments::default();
            documents.load_directory(&std::env::current_dir()?)?;
            println!("{documents:#?}");
        }
        Static => {
            let config = load()?;
            let graph = StaticGraphBuilder::new(&config).build()?;
            println!("{}", graph.describe());
        }
        Expanded => {
            let config = load()?;
            let walk = walk(&config, WalkOptions::default())?;
            println!("{}", walk.graph.describe());
        }
    }

    Ok(())
}
