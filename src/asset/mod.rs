//! Deployable asset packaging
//!
//! Turns a local source tree into a content-addressed artifact that the
//! resource graph can reference before the artifact is uploaded anywhere.
//!
//! # Module Structure
//!
//! - [`packager`] - Hashes a source tree and stages a reproducible archive
//!
//! # Example
//!
//! ```ignore
//! use pipesynth::asset::AssetPackager;
//!
//! fn example() -> pipesynth::Result<()> {
//!     let packager = AssetPackager::new("synth.out");
//!     let asset = packager.package("function".as_ref())?;
//!     println!("{} -> {}", asset.hash, asset.staged_path.display());
//!     Ok(())
//! }
//! ```

pub mod packager;

pub use packager::{AssetDescriptor, AssetPackager, AssetType};
