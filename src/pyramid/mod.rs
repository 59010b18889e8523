//! Pyramid writing and multiscale metadata.
//!
//! - [`writer`] copies each native resolution level into its own array
//! - [`multiscale`] derives the per-level coordinate transformations

pub mod multiscale;
pub mod writer;

pub use multiscale::{Axis, CoordinateTransformation, Dataset, Multiscale};
pub use writer::{LevelWriter, TilePlan};
