//! Resource graph
//!
//! An in-memory DAG of declared resources. Nodes reference each other's
//! outputs through [`Ref`] placeholders and every such reference becomes a
//! "must be resolved before" edge.
//!
//! # Module Structure
//!
//! - [`expr`] - Node ids, output fields and attribute expressions
//! - [`spec`] - Closed attribute structs, one per resource kind
//! - [`builder`] - Declaration API and the frozen [`Graph`]
//!
//! # Example
//!
//! ```ignore
//! use pipesynth::graph::{GraphBuilder, IdentitySpec, LocationSpec};
//!
//! fn example() -> pipesynth::Result<()> {
//!     let mut graph = GraphBuilder::new();
//!     let account = graph.declare_identity("function-account", IdentitySpec::new("function-account"))?;
//!     let bucket = graph.declare_location("source-bucket", LocationSpec::new("source-demo", "us-central1"))?;
//!     let graph = graph.build()?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod expr;
pub mod spec;

pub use builder::{
    ArtifactHandle, BindingHandle, ExternalIdentityHandle, FunctionHandle, Graph, GraphBuilder,
    IdentityHandle, LocationHandle, ObjectHandle, ResourceNode,
};
pub use expr::{Expr, NodeId, Output, Ref};
pub use spec::*;
