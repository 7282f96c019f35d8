//! Error types
//!
//! Every error raised while packaging, declaring or synthesizing a stack.
//! None of them are retryable: they all point at a broken source tree or a
//! broken declaration, and carry the node ids needed to fix it.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SynthError>;

#[derive(Debug, Error)]
pub enum SynthError {
    /// Source path missing, unreadable, or staging failed
    #[error("Failed to package {}: {reason}", path.display())]
    Packaging { path: PathBuf, reason: String },

    /// Two declared nodes resolve to the same final name
    #[error("Name collision in {namespace} namespace: '{name}' is claimed by both '{first}' and '{second}'")]
    NameCollision {
        namespace: &'static str,
        name: String,
        first: String,
        second: String,
    },

    /// A user-supplied name does not satisfy the provider's naming rules
    #[error("Invalid {namespace} name '{name}': {reason}")]
    InvalidName {
        namespace: &'static str,
        name: String,
        reason: &'static str,
    },

    /// The same node id was declared twice
    #[error("Node '{0}' is declared more than once")]
    DuplicateNode(String),

    /// Dependency edges form a cycle; `cycle` starts and ends on the same node
    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A reference points at a node or output that does not exist
    #[error("Node '{node}' has an unresolved reference to '{reference}'")]
    UnresolvedReference { node: String, reference: String },

    /// Instance-count bounds, after defaults, that no service config satisfies
    #[error("min_instance_count ({min}) is greater than max_instance_count ({max})")]
    InvalidInstanceBounds { min: u32, max: u32 },
}

impl SynthError {
    pub(crate) fn packaging(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        SynthError::Packaging {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
