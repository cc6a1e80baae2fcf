use nom::combinator::all_consuming;

use super::nom_parser::{parse_file, NodeDef, TreeSource};
use crate::{error::LoadError, Node, Registry, Tree};

/// Instantiate the tree named `main` from a parsed source.
pub fn load<C>(tree_source: &TreeSource, registry: &Registry<C>) -> Result<Tree<C>, LoadError> {
    load_tree(tree_source, "main", registry)
}

/// Instantiate any tree declared in a parsed source.
///
/// Leaf names are looked up in the registry first. A name the registry does
/// not know is resolved against the other trees in the same source, whose
/// nodes are inlined in place of the reference.
pub fn load_tree<C>(
    tree_source: &TreeSource,
    name: &str,
    registry: &Registry<C>,
) -> Result<Tree<C>, LoadError> {
    let tree = tree_source
        .find(name)
        .ok_or_else(|| LoadError::MissingTree(name.to_owned()))?;

    let top = TreeStack {
        name: tree.name,
        parent: None,
    };

    let root = load_recurse(&tree.root, registry, tree_source, &top)?;
    Ok(Tree::new(name, root))
}

/// Parse a whole source text and instantiate its `main` tree.
///
/// Unlike [`parse_file`], trailing input that is not a tree definition is an
/// error.
pub fn load_str<C>(source: &str, registry: &Registry<C>) -> Result<Tree<C>, LoadError> {
    let (_, tree_source) = all_consuming(parse_file)(source).map_err(|err| match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => parse_error(source, e.input),
        nom::Err::Incomplete(_) => LoadError::Parse("unexpected end of input".to_owned()),
    })?;
    load(&tree_source, registry)
}

fn parse_error(source: &str, rest: &str) -> LoadError {
    let offset = source.len() - rest.len();
    let line = source[..offset].matches('\n').count() + 1;
    match rest.lines().next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(near) => LoadError::Parse(format!("line {line}: unexpected {near:?}")),
        None => LoadError::Parse(format!("line {line}: unexpected end of input")),
    }
}

/// A mechanism to detect infinite recursion. It is a linked list in call stack.
/// Walking the links back enumerates the trees being inlined, so a reference
/// to any of them would never terminate.
///
/// Trees are compiled eagerly into a flat arena, so a recursive reference
/// cannot be expanded lazily at evaluation time either; it is a load error.
struct TreeStack<'a, 'src> {
    name: &'src str,
    parent: Option<&'a TreeStack<'a, 'src>>,
}

impl<'a, 'src> TreeStack<'a, 'src> {
    fn find(&self, name: &str) -> bool {
        if self.name == name {
            true
        } else if let Some(parent) = self.parent {
            parent.find(name)
        } else {
            false
        }
    }
}

fn load_recurse<C>(
    node: &NodeDef,
    registry: &Registry<C>,
    tree_source: &TreeSource,
    parent_stack: &TreeStack,
) -> Result<Node<C>, LoadError> {
    let load_children = |children: &[NodeDef]| {
        children
            .iter()
            .map(|child| load_recurse(child, registry, tree_source, parent_stack))
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(match node {
        NodeDef::Sequence(children) => Node::Sequence(load_children(children)?),
        NodeDef::Selector(children) => Node::Selector(load_children(children)?),
        NodeDef::If {
            condition,
            negated,
            children,
        } => {
            let mut cond = registry
                .condition(condition)
                .ok_or_else(|| LoadError::MissingCondition(condition.to_string()))?;
            if *negated {
                cond = cond.negate();
            }
            let children = load_children(children)?;
            let child = match <[_; 1]>::try_from(children) {
                Ok([only]) => only,
                Err(children) => Node::Sequence(children),
            };
            Node::conditional(cond, child)
        }
        NodeDef::Leaf(name) => {
            if let Some(leaf) = registry.leaf(name) {
                return Ok(Node::Action(leaf));
            }

            let tree = tree_source
                .find(name)
                .ok_or_else(|| LoadError::MissingNode(name.to_string()))?;

            // Prevent infinite recursion
            if parent_stack.find(name) {
                return Err(LoadError::InfiniteRecursion {
                    node: name.to_string(),
                });
            }
            let tree_stack = TreeStack {
                name: tree.name,
                parent: Some(parent_stack),
            };
            load_recurse(&tree.root, registry, tree_source, &tree_stack)?
        }
    })
}

#[cfg(test)]
mod test;
