//! xview-io: Image loading and diff-artifact output.
//!
//! Everything in the consistency engine that touches the network or
//! the filesystem lives here, so `xview-metrics` stays sans-IO:
//!
//! - [`ImageSource`] turns a panel's image reference into raw bytes,
//!   with direct, proxy, fallback and in-memory variants.
//! - [`DiffArtifactWriter`] writes diff images for failed comparisons.

pub mod artifact;
pub mod source;

pub use artifact::{ArtifactError, DiffArtifactWriter};
pub use source::{
    DirectSource, FallbackSource, ImageLoadError, ImageSource, ImageSourceKind, MemorySource,
    ProxySource, describe_reference,
};
