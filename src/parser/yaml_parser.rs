use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use super::{
    loader::load_tree,
    nom_parser::{NodeDef, TreeDef, TreeSource},
};
use crate::{error::LoadYamlError, Registry, Tree};

#[derive(Deserialize)]
struct YamlSource {
    behavior_tree: BTreeMap<String, YamlNode>,
}

#[derive(Deserialize)]
struct YamlNode {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    children: Vec<YamlNode>,
    #[serde(default)]
    condition: Option<String>,
}

fn node_def(node: &YamlNode) -> Result<NodeDef, LoadYamlError> {
    let children = || {
        node.children
            .iter()
            .map(node_def)
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(match node.ty.as_str() {
        "Sequence" | "Sequencer" => NodeDef::Sequence(children()?),
        "Selector" | "Fallback" => NodeDef::Selector(children()?),
        "If" | "if" => {
            let condition = node
                .condition
                .as_deref()
                .map(str::trim)
                .ok_or(LoadYamlError::MissingCondition)?;
            let (condition, negated) = match condition.strip_prefix('!') {
                Some(rest) => (rest.trim_start(), true),
                None => (condition, false),
            };
            NodeDef::If {
                condition,
                negated,
                children: children()?,
            }
        }
        name if node.children.is_empty() => NodeDef::Leaf(name),
        name => return Err(LoadYamlError::UnexpectedChildren(name.to_owned())),
    })
}

/// Instantiate every tree declared under the `behavior_tree` key.
///
/// ```yaml
/// behavior_tree:
///   main:
///     type: Selector
///     children:
///       - type: If
///         condition: "!Blocked"
///         children:
///           - type: Move
///       - type: Idle
/// ```
///
/// Trees may refer to each other by name the same way as in the text
/// format.
pub fn load_yaml<C>(
    yaml: &str,
    registry: &Registry<C>,
) -> Result<HashMap<String, Tree<C>>, LoadYamlError> {
    let source: YamlSource = serde_yaml::from_str(yaml)?;

    let tree_defs: Vec<TreeDef> = source
        .behavior_tree
        .iter()
        .map(|(name, root)| -> Result<_, LoadYamlError> {
            Ok(TreeDef {
                name: name.as_str(),
                root: node_def(root)?,
            })
        })
        .collect::<Result<_, _>>()?;
    let tree_source = TreeSource { tree_defs };

    tree_source
        .tree_defs
        .iter()
        .map(|tree| -> Result<_, LoadYamlError> {
            let loaded = load_tree(&tree_source, tree.name, registry)?;
            Ok((tree.name.to_owned(), loaded))
        })
        .collect()
}
