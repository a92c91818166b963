//! iso-creator - build ISO-9660 images from a directory tree
//!
//! The pipeline runs in three stages:
//! - `naming` maps path segments to ISO-9660 and Joliet identifiers
//! - `plan` walks the source tree into an ordered manifest
//! - `image` lays out and writes the volume
//!
//! `build` ties them together behind a request, progress events and a
//! cancellation token.

pub mod build;
pub mod error;
pub mod image;
pub mod logging;
pub mod naming;
pub mod plan;
pub mod settings;

#[cfg(test)]
mod test_fixtures;

pub use build::{
    BuildEvent, BuildHandle, BuildOptions, BuildRequest, BuildResult, CancelToken, ProgressEvent,
    build_image, spawn_build,
};
pub use error::{BuildError, ErrorKind};
