use futures::executor::block_on;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::{parse_file, LeafResult, Outcome};

#[derive(Default)]
struct Npc {
    has_target: bool,
    in_range: bool,
    log: Vec<&'static str>,
}

fn find_target(npc: &mut Npc) -> LeafResult {
    npc.log.push("FindTarget");
    Ok(npc.has_target.into())
}

fn melee_attack(npc: &mut Npc) -> LeafResult {
    npc.log.push("MeleeAttack");
    Ok(Outcome::Succeeded)
}

fn approach(npc: &mut Npc) -> LeafResult {
    npc.log.push("Approach");
    Ok(Outcome::Succeeded)
}

fn patrol(npc: &mut Npc) -> LeafResult {
    npc.log.push("Patrol");
    Ok(Outcome::Succeeded)
}

fn in_range(npc: &Npc) -> bool {
    npc.in_range
}

fn registry() -> Registry<Npc> {
    let mut registry = Registry::default();
    registry.register_instant("FindTarget", find_target);
    registry.register_instant("MeleeAttack", melee_attack);
    registry.register_instant("Approach", approach);
    registry.register_instant("Patrol", patrol);
    registry.register_condition("InRange", in_range);
    registry
}

fn run(tree: &Tree<Npc>, npc: &mut Npc) -> Outcome {
    block_on(tree.evaluate(npc, &CancellationToken::new())).unwrap()
}

const SOURCE: &str = r#"
tree main = Selector {
    Sequence {
        FindTarget
        Engage
    }
    Patrol
}

# Inlined wherever it is referenced.
tree Engage = Selector {
    if (InRange) { MeleeAttack }
    if (!InRange) {
        Approach
        Fail
    }
}
"#;

#[test]
fn test_load_and_evaluate() {
    let tree = load_str(SOURCE, &registry()).unwrap();
    assert_eq!(tree.name(), "main");

    let mut npc = Npc {
        has_target: true,
        in_range: true,
        ..Npc::default()
    };
    assert_eq!(run(&tree, &mut npc), Outcome::Succeeded);
    assert_eq!(npc.log, ["FindTarget", "MeleeAttack"]);

    npc.log.clear();
    npc.in_range = false;
    assert_eq!(run(&tree, &mut npc), Outcome::Succeeded);
    assert_eq!(npc.log, ["FindTarget", "Approach", "Patrol"]);

    npc.log.clear();
    npc.has_target = false;
    assert_eq!(run(&tree, &mut npc), Outcome::Succeeded);
    assert_eq!(npc.log, ["FindTarget", "Patrol"]);
}

#[test]
fn test_load_named_tree() {
    let (_, source) = parse_file(SOURCE).unwrap();
    let tree = load_tree(&source, "Engage", &registry()).unwrap();
    assert_eq!(tree.name(), "Engage");

    let mut npc = Npc::default();
    assert_eq!(run(&tree, &mut npc), Outcome::Failed);
    assert_eq!(npc.log, ["Approach"]);
}

#[test]
fn test_missing_tree() {
    let (_, source) = parse_file(SOURCE).unwrap();
    assert!(matches!(
        load_tree(&source, "Flee", &registry()),
        Err(LoadError::MissingTree(name)) if name == "Flee"
    ));
}

#[test]
fn test_missing_node() {
    assert!(matches!(
        load_str("tree main = Sequence { FindTarget Dance }", &registry()),
        Err(LoadError::MissingNode(name)) if name == "Dance"
    ));
}

#[test]
fn test_missing_condition() {
    assert!(matches!(
        load_str("tree main = if (Hungry) { Patrol }", &registry()),
        Err(LoadError::MissingCondition(name)) if name == "Hungry"
    ));
}

#[test]
fn test_recursion() {
    let source = r#"
tree main = Sequence {
    A
}

tree A = Selector {
    B
}

tree B = Sequence {
    Patrol
    A
}
"#;
    assert!(matches!(
        load_str(source, &registry()),
        Err(LoadError::InfiniteRecursion { node }) if node == "A"
    ));
}

#[test]
fn test_main_refers_to_itself() {
    assert!(matches!(
        load_str("tree main = Selector { Patrol main }", &registry()),
        Err(LoadError::InfiniteRecursion { node }) if node == "main"
    ));
}

#[test]
fn test_shared_subtree_is_not_recursion() {
    let source = r#"
tree main = Sequence { Twice Twice }
tree Twice = Sequence { Patrol Patrol }
"#;
    let tree = load_str(source, &registry()).unwrap();
    let mut npc = Npc::default();
    assert_eq!(run(&tree, &mut npc), Outcome::Succeeded);
    assert_eq!(npc.log.len(), 4);
}

#[test]
fn test_parse_error_reports_line() {
    let source = "tree main = Sequence {\n    Patrol\n}\n%oops\n";
    match load_str(source, &registry()) {
        Err(LoadError::Parse(msg)) => {
            assert!(msg.contains("line 4"), "{msg}");
            assert!(msg.contains("%oops"), "{msg}");
        }
        res => panic!("unexpected result {res:?}"),
    }
}

#[test]
fn test_builtins() {
    let tree = load_str("tree main = if (!Never) { Selector { Fail Succeed } }", &registry()).unwrap();
    assert_eq!(run(&tree, &mut Npc::default()), Outcome::Succeeded);
}

#[test]
fn test_display_round_trip() {
    let registry = registry();
    let tree = load_str(SOURCE, &registry).unwrap();
    let rendered = tree.to_string();

    // Subtrees are inlined, so the rendering is a single self-contained tree.
    assert!(!rendered.contains("Engage"));
    assert!(rendered.contains("if (!InRange) {"));

    let reloaded = load_str(&rendered, &registry).unwrap();
    assert_eq!(reloaded.to_string(), rendered);
    assert_eq!(reloaded.len(), tree.len());
    assert_eq!(reloaded.depth(), tree.depth());
}
