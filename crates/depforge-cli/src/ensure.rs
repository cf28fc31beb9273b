//! Implementation of `depforge ensure` (the default command).

use crate::config::LoadedConfig;
use anyhow::{Context, Result};
use depforge_core::{Outcome, Provisioner, ProvisionerConfig};
use std::path::PathBuf;

/// Options for ensuring dependencies.
#[derive(Debug, Default)]
pub struct EnsureOptions {
    /// Only ensure these dependencies (all when empty).
    pub names: Vec<String>,
    /// Explicit manifest path.
    pub config: Option<PathBuf>,
    /// Suppress progress output.
    pub quiet: bool,
}

/// Summary of an ensure run.
#[derive(Debug, Default)]
pub struct EnsureResult {
    pub provisioned: Vec<String>,
    pub already: Vec<String>,
}

impl EnsureResult {
    pub fn print_summary(&self) {
        if !self.provisioned.is_empty() {
            println!("\nProvisioned: {}", self.provisioned.join(", "));
        }
        if !self.already.is_empty() {
            println!("Already provisioned: {}", self.already.join(", "));
        }
    }
}

/// Provision every selected dependency in manifest order, stopping at the
/// first failure.
pub fn ensure_dependencies(options: EnsureOptions) -> Result<EnsureResult> {
    let loaded = LoadedConfig::load(options.config.as_deref())?;
    let specs = loaded.select(&options.names)?;
    let settings = &loaded.manifest.settings;

    let config = ProvisionerConfig {
        work_dir: loaded.work_dir()?,
        keep_sources: settings.keep_sources,
        quiet: options.quiet || settings.quiet,
    };
    let provisioner = Provisioner::new(config).context("Failed to set up provisioner")?;

    let mut result = EnsureResult::default();
    for spec in &specs {
        let outcome = provisioner
            .ensure(spec)
            .with_context(|| format!("Failed to provision {spec}"))?;
        match outcome {
            Outcome::AlreadyProvisioned => result.already.push(spec.to_string()),
            Outcome::Provisioned { .. } => result.provisioned.push(spec.to_string()),
        }
    }

    Ok(result)
}
