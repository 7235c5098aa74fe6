//! Walks of small configurations, loaded from memory

use modgraph::addrs::{AbsAddress, Target};
use modgraph::builder::StaticGraphBuilder;
use modgraph::config::{Configuration, Limits, MemoryLoader};
use modgraph::error::Error;
use modgraph::expand::RecordingObserver;
use modgraph::graph::Graph;
use modgraph::node::ConcreteNode;
use modgraph::walk::{Walk, WalkOptions, Walker};
use pretty_assertions::assert_eq;

fn load(files: &[(&str, &str)]) -> Configuration {
    let loader = files
        .iter()
        .fold(MemoryLoader::new(), |loader, (path, text)| {
            loader.with_file(path, *text)
        });
    Configuration::load(&loader, "", &Limits::default()).expect("configuration must load")
}

fn walk(config: &Configuration) -> Walk {
    Walker::new(config, WalkOptions::default())
        .walk()
        .expect("walk must succeed")
}

fn value(walk: &Walk, addr: &str) -> Option<hcl::Value> {
    let addr: AbsAddress = addr.parse().expect("address must parse");
    walk.state.get(&addr.module, &addr.addr).cloned()
}

fn dependencies(graph: &Graph<ConcreteNode>, name: &str) -> Vec<String> {
    let index = graph.find(name).expect("node must exist");
    let mut names: Vec<String> = graph
        .dependencies(index)
        .map(|dependency| graph.node(dependency).to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn single_local() {
    let config = load(&[("main.hcl", r#"locals { greeting = "hi" }"#)]);

    let graph = StaticGraphBuilder::new(&config).build().unwrap();
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.describe(), "local.greeting");

    let walk = walk(&config);
    assert!(walk.is_complete());
    assert_eq!(value(&walk, "local.greeting"), Some("hi".into()));
}

#[test]
fn counted_module() {
    let config = load(&[
        (
            "main.hcl",
            r#"
            module "child" {
              source = "./child"
              count  = 3
              y      = "v${count.index}"
            }
            "#,
        ),
        (
            "child/main.hcl",
            r#"
            variable "y" {}
            locals { x = var.y }
            "#,
        ),
    ]);

    let walk = walk(&config);
    assert_eq!(walk.graph.len(), 7);

    for index in 0..3 {
        let local = format!("module.child[{index}].local.x");
        assert_eq!(
            dependencies(&walk.graph, &local),
            vec![
                "module.child".to_string(),
                format!("module.child[{index}].var.y")
            ]
        );
        assert_eq!(value(&walk, &local), Some(format!("v{index}").into()));
    }
}

#[test]
fn unrepeated_modules_translate_one_to_one() {
    let config = load(&[
        (
            "main.hcl",
            r#"
            locals { prefix = "app" }
            module "child" {
              source = "./child"
              prefix = local.prefix
            }
            output "name" { value = module.child.name }
            "#,
        ),
        (
            "child/main.hcl",
            r#"
            variable "prefix" {}
            output "name" { value = "${var.prefix}-child" }
            "#,
        ),
    ]);

    let graph = StaticGraphBuilder::new(&config).build().unwrap();
    let walk = walk(&config);

    assert_eq!(walk.graph.len(), graph.len());
    assert_eq!(walk.graph.edge_count(), graph.edge_count());
    assert_eq!(walk.graph.describe(), graph.describe());
    assert_eq!(
        walk.root_outputs().get("name"),
        Some(&hcl::Value::from("app-child"))
    );
}

#[test]
fn cycles_abort_the_walk() {
    let config = load(&[("main.hcl", "locals {\n  a = local.b\n  b = local.a\n}\n")]);

    let error = Walker::new(&config, WalkOptions::default())
        .walk()
        .unwrap_err();

    let Error::Cycle { cycles } = &error else {
        panic!("expected a cycle, got {error}");
    };
    assert_eq!(cycles, &vec![vec!["local.a".to_string(), "local.b".to_string()]]);
    assert_eq!(
        error.to_string(),
        "dependency cycle detected: local.a -> local.b"
    );
}

#[test]
fn targets_keep_their_dependencies() {
    let config = load(&[(
        "main.hcl",
        "locals {\n  a = 1\n  b = local.a\n  c = \"unused\"\n}\n",
    )]);

    let options = WalkOptions {
        targets: vec!["local.b".parse::<Target>().unwrap()],
        ..Default::default()
    };
    let walk = Walker::new(&config, options).walk().unwrap();

    let mut evaluated: Vec<String> = walk.state.iter().map(|(addr, _)| addr.to_string()).collect();
    evaluated.sort();
    assert_eq!(evaluated, vec!["local.a", "local.b"]);
    assert_eq!(walk.graph.len(), 2);
}

#[test]
fn module_targets_select_the_subtree() {
    let config = load(&[
        (
            "main.hcl",
            r#"
            locals { other = "x" }
            module "child" { source = "./child" }
            "#,
        ),
        ("child/main.hcl", r#"locals { inner = "y" }"#),
    ]);

    let options = WalkOptions {
        targets: vec!["module.child".parse::<Target>().unwrap()],
        ..Default::default()
    };
    let walk = Walker::new(&config, options).walk().unwrap();

    assert_eq!(value(&walk, "module.child.local.inner"), Some("y".into()));
    assert_eq!(value(&walk, "local.other"), None);
}

#[test]
fn one_event_per_concrete_node() {
    let config = load(&[
        (
            "main.hcl",
            r#"
            module "child" {
              source = "./child"
              count  = 2
            }
            "#,
        ),
        ("child/main.hcl", r#"locals { x = "x" }"#),
    ]);

    let observer = RecordingObserver::default();
    let walk = Walker::new(&config, WalkOptions::default())
        .with_observer(&observer)
        .walk()
        .unwrap();

    let events: Vec<String> = observer
        .events()
        .iter()
        .map(|event| format!("{} -> {}", event.origin, event.address))
        .collect();
    assert_eq!(events.len(), walk.graph.len());
    assert_eq!(
        events,
        vec![
            "module.child -> module.child",
            "module.child.local.x -> module.child[0].local.x",
            "module.child.local.x -> module.child[1].local.x",
        ]
    );
}

#[test]
fn module_outputs_fan_out() {
    let config = load(&[
        (
            "main.hcl",
            r#"
            module "child" {
              source = "./child"
              count  = 2
              n      = count.index
            }
            output "all" { value = module.child[*].label }
            output "second" { value = module.child[1].label }
            "#,
        ),
        (
            "child/main.hcl",
            r#"
            variable "n" {}
            output "label" { value = "item-${var.n}" }
            "#,
        ),
    ]);

    let walk = walk(&config);

    assert_eq!(
        dependencies(&walk.graph, "output.all"),
        vec![
            "module.child[0].output.label",
            "module.child[1].output.label"
        ]
    );
    assert_eq!(
        dependencies(&walk.graph, "output.second"),
        vec!["module.child[1].output.label"]
    );

    let outputs = walk.root_outputs();
    assert_eq!(
        outputs.get("all"),
        Some(&hcl::Value::Array(vec!["item-0".into(), "item-1".into()]))
    );
    assert_eq!(outputs.get("second"), Some(&hcl::Value::from("item-1")));
}

#[test]
fn for_each_modules() {
    let config = load(&[
        (
            "main.hcl",
            r#"
            module "svc" {
              source   = "./svc"
              for_each = ["b", "a"]
              name     = each.key
            }
            output "names" { value = { for k, v in module.svc : k => v.upper } }
            output "a" { value = module.svc["a"].upper }
            "#,
        ),
        (
            "svc/main.hcl",
            r#"
            variable "name" {}
            output "upper" { value = upper(var.name) }
            "#,
        ),
    ]);

    let walk = walk(&config);

    let instances: Vec<String> = walk
        .expander
        .expand_module(&"module.svc".parse().unwrap())
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(instances, vec![r#"module.svc["a"]"#, r#"module.svc["b"]"#]);

    let mut names = hcl::value::Map::new();
    names.insert("a".to_string(), "A".into());
    names.insert("b".to_string(), "B".into());

    let outputs = walk.root_outputs();
    assert_eq!(outputs.get("names"), Some(&hcl::Value::Object(names)));
    assert_eq!(outputs.get("a"), Some(&hcl::Value::from("A")));
}

#[test]
fn resources() {
    let config = load(&[(
        "main.hcl",
        r#"
        resource "server" "web" {
          count = 2
          name  = "web-${count.index}"
        }
        data "image" "base" { name = "ubuntu" }
        output "ids" { value = server.web[*].id }
        output "first" { value = server.web[0].name }
        output "image" { value = data.image.base.name }
        "#,
    )]);

    let walk = walk(&config);
    let outputs = walk.root_outputs();

    assert_eq!(
        outputs.get("ids"),
        Some(&hcl::Value::Array(vec![
            "server.web[0]".into(),
            "server.web[1]".into()
        ]))
    );
    assert_eq!(outputs.get("first"), Some(&hcl::Value::from("web-0")));
    assert_eq!(outputs.get("image"), Some(&hcl::Value::from("ubuntu")));
}

#[test]
fn failures_stop_later_levels() {
    let config = load(&[(
        "main.hcl",
        "locals {\n  a = \"ok\"\n  bad = length(1)\n  c = local.a\n}\n",
    )]);

    let walk = Walker::new(&config, WalkOptions::default()).walk().unwrap();

    assert!(!walk.is_complete());
    assert_eq!(walk.failures.len(), 1);
    assert_eq!(walk.failures[0].node, "local.bad");
    assert_eq!(value(&walk, "local.a"), Some("ok".into()));
    assert_eq!(value(&walk, "local.c"), None);
}

#[test]
fn missing_root_variables() {
    let config = load(&[(
        "main.hcl",
        r#"
        variable "name" {}
        output "name" { value = var.name }
        "#,
    )]);

    let walk = Walker::new(&config, WalkOptions::default()).walk().unwrap();
    assert_eq!(
        walk.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        vec!["var.name: no value given for a variable without default"]
    );
    assert!(walk.root_outputs().is_empty());
}

#[test]
fn invalid_count() {
    let config = load(&[
        (
            "main.hcl",
            r#"
            module "child" {
              source = "./child"
              count  = "many"
            }
            "#,
        ),
        ("child/main.hcl", r#"locals { x = 1 }"#),
    ]);

    let walk = Walker::new(&config, WalkOptions::default()).walk().unwrap();
    assert_eq!(
        walk.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        vec!["module.child: count must be a non-negative whole number, got a string"]
    );
    assert_eq!(walk.graph.len(), 1);
}

#[test]
fn unresolved_references_are_reported() {
    let config = load(&[(
        "main.hcl",
        "locals {\n  a = local.nope\n}\noutput \"x\" { value = module.missing.out }\n",
    )]);

    let error = Walker::new(&config, WalkOptions::default())
        .walk()
        .unwrap_err();
    let Error::Build(issues) = &error else {
        panic!("expected build errors, got {error}");
    };

    let messages: Vec<String> = issues.issues().iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec![
            "main.hcl:2:3: local.a: reference to undeclared local.nope",
            "main.hcl:4:1: output.x: reference to undeclared module.missing.out",
        ]
    );
}

#[test]
fn modules_without_instances() {
    let config = load(&[
        (
            "main.hcl",
            r#"
            module "child" {
              source = "./child"
              count  = 0
            }
            output "all" { value = module.child[*].out }
            output "whole" { value = module.child }
            "#,
        ),
        (
            "child/main.hcl",
            r#"
            locals { x = "x" }
            output "out" { value = local.x }
            "#,
        ),
    ]);

    let walk = walk(&config);

    assert!(walk.is_complete());
    assert_eq!(dependencies(&walk.graph, "output.all"), vec!["module.child"]);
    assert_eq!(walk.graph.describe(), "module.child\noutput.all\n  -> module.child\noutput.whole\n  -> module.child");

    let outputs = walk.root_outputs();
    assert_eq!(outputs.get("all"), Some(&hcl::Value::Array(vec![])));
    assert_eq!(outputs.get("whole"), Some(&hcl::Value::Array(vec![])));
}

#[test]
fn resource_instance_limit() {
    let config = load(&[(
        "main.hcl",
        r#"
        resource "server" "web" {
          count = 100000000000000
        }
        "#,
    )]);

    let walk = Walker::new(&config, WalkOptions::default()).walk().unwrap();
    assert_eq!(
        walk.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        vec!["server.web: 100000000000000 instances exceed the resource instance limit of 10000"]
    );
    assert!(walk.state.is_empty());
}
