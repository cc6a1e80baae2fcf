use std::borrow::Cow;

use thiserror::Error;

/// An unexpected failure inside a leaf or a predicate.
///
/// A fault is not caught by any combinator: it terminates the whole traversal
/// and is reported once to the host through the tick result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Fault {
    #[error("leaf {leaf:?} faulted: {error:#}")]
    Leaf {
        leaf: Cow<'static, str>,
        error: anyhow::Error,
    },
    #[error("evaluation panicked: {0}")]
    Panic(String),
}

/// The reasons an evaluation ends without an [`crate::Outcome`].
#[derive(Debug, Error)]
pub enum Interrupt {
    #[error("evaluation was cancelled")]
    Cancelled,
    #[error(transparent)]
    Faulted(#[from] Fault),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("no tokio runtime is available to run evaluations")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

#[derive(Debug, Error)]
#[error("the tick source was dropped")]
pub struct TickSourceClosed;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("failed to parse tree source: {0}")]
    Parse(String),
    #[error("tree {0:?} does not exist")]
    MissingTree(String),
    #[error("leaf type or subtree name not found {0:?}")]
    MissingNode(String),
    #[error("condition not found {0:?}")]
    MissingCondition(String),
    #[error("subtree {node:?} refers to itself")]
    InfiniteRecursion { node: String },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadYamlError {
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("`If` node is missing its condition")]
    MissingCondition,
    #[error("leaf {0:?} cannot have children")]
    UnexpectedChildren(String),
    #[error(transparent)]
    Load(#[from] LoadError),
}
