//! Implementation of `depforge plan`: show what `ensure` would run.

use crate::config::LoadedConfig;
use anyhow::Result;
use depforge_core::{BuildPlan, DependencySpec, ProvisionIndex};
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Print the archive, URL and build steps for each selected dependency.
pub fn show_plan(config: Option<PathBuf>, names: &[String]) -> Result<()> {
    let loaded = LoadedConfig::load(config.as_deref())?;
    let work_dir = loaded.work_dir()?;
    let index = ProvisionIndex::load(&ProvisionIndex::path_in(&work_dir))?;

    for spec in loaded.select(names)? {
        print!("{}", describe(&spec, &work_dir, index.contains(&spec)));
    }
    Ok(())
}

fn describe(spec: &DependencySpec, work_dir: &Path, provisioned: bool) -> String {
    let plan = BuildPlan::for_spec(spec);
    let archive = work_dir.join(spec.archive_name());

    let mut out = String::new();
    let _ = writeln!(out, "{spec} ({})", spec.build_system());
    if provisioned {
        let _ = writeln!(out, "  already provisioned, nothing to do");
        return out;
    }
    if archive.exists() {
        let _ = writeln!(out, "  archive:   {} (cached)", archive.display());
    } else {
        let _ = writeln!(out, "  archive:   {}", archive.display());
        let _ = writeln!(out, "  url:       {}", spec.source_url());
    }
    let _ = writeln!(out, "  prefix:    {}", spec.install_prefix().display());
    for step in plan.steps() {
        let _ = writeln!(out, "  {:<10} {step}", format!("{}:", step.stage));
    }
    out
}
