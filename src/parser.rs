mod loader;
mod nom_parser;
mod yaml_parser;

pub use self::{
    loader::{load, load_str, load_tree},
    nom_parser::{parse_file, parse_node, tree_def, NodeDef, TreeDef, TreeSource},
    yaml_parser::load_yaml,
};
