//! # tokensync Build
//!
//! Runs the external token build tool (Style Dictionary) per platform and
//! gives read access to what it produced.
//!
//! ## Output layout
//!
//! Every platform writes under `<build_dir>/<platform>/`. File access is
//! confined to that directory: any request resolving outside it fails with
//! [`BuildError::AccessDenied`].
//!
//! ## Failure model
//!
//! A build is an opaque, possibly slow, fallible call. Failures are captured
//! per platform in a [`BuildResult`] and never retried.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod platform;
pub mod runner;

pub use builder::{
    BuildError, BuildResult, BuildStatus, BuilderConfig, PlatformFile, StyleDictionaryBuilder,
};
pub use platform::{media_type, Platform};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
