//! Provisioning of pinned third-party library dependencies.
//!
//! This crate provides:
//! - The validated `DependencySpec` model and deterministic archive naming
//! - Parsing of `depforge.toml` manifests, with a built-in default
//! - A single best-effort HTTP fetch per archive
//! - Extraction into a staging directory that is always cleaned up
//! - The two-stage configure / build+install plan and its runner
//! - A commit record so finished dependencies are skipped on re-runs

pub mod build;
pub mod extract;
pub mod fetch;
pub mod index;
mod manifest;
mod provision;
pub mod spec;

pub use build::{BuildPlan, Runner, Stage, Step, StepError, SystemRunner};
pub use fetch::{Fetch, FetchConfig, HttpFetcher};
pub use index::{ProvisionIndex, ProvisionRecord};
pub use manifest::{DependencyEntry, Manifest, ManifestError, Settings, MANIFEST_FILE};
pub use provision::{Outcome, ProvisionError, Provisioner, ProvisionerConfig};
pub use spec::{BuildSystem, DependencySpec, DependencySpecBuilder, SpecError};
