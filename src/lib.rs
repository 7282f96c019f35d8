//! pipesynth
//!
//! Declares an event-triggered GCP image-processing pipeline as a resource
//! graph and synthesizes it into a document for a provisioning engine.
//!
//! # Module Structure
//!
//! - [`asset`] - Content-addressed packaging of the function source
//! - [`naming`] - Final names per namespace, hash-derived artifact names
//! - [`graph`] - Declaration API and the dependency graph
//! - [`synth`] - Topological emission of the resource-graph document
//! - [`pipeline`] - The image pipeline stack itself
//! - [`config`] - Stack configuration loading

pub mod asset;
pub mod config;
pub mod error;
pub mod graph;
pub mod naming;
pub mod pipeline;
pub mod synth;

pub use error::{Result, SynthError};
