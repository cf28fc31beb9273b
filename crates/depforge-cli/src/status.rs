//! Implementation of `depforge status` and `depforge forget`.

use crate::config::LoadedConfig;
use anyhow::{bail, Result};
use depforge_core::{ProvisionIndex, ProvisionRecord};
use std::path::{Path, PathBuf};

/// List the provisioned dependencies recorded in the working directory.
pub fn show_status(config: Option<PathBuf>) -> Result<()> {
    let loaded = LoadedConfig::load(config.as_deref())?;
    let work_dir = loaded.work_dir()?;
    let index = ProvisionIndex::load(&ProvisionIndex::path_in(&work_dir))?;

    if index.dependencies.is_empty() {
        println!("Nothing provisioned in {}", work_dir.display());
        return Ok(());
    }

    println!("Provisioned in {}:", work_dir.display());
    for record in index.dependencies.values() {
        println!("  {}", format_record(record));
    }
    Ok(())
}

fn format_record(record: &ProvisionRecord) -> String {
    let mut line = format!(
        "{} {} -> {}",
        record.name,
        record.version,
        record.install_prefix.display()
    );
    if !record.build_options.is_empty() {
        let options: Vec<&str> = record.build_options.iter().map(String::as_str).collect();
        line.push_str(&format!(" [{}]", options.join(",")));
    }
    line.push_str(&format!(" ({})", record.provisioned_at));
    line
}

/// Drop the record for `name`.
pub fn forget(config: Option<PathBuf>, name: &str) -> Result<()> {
    let loaded = LoadedConfig::load(config.as_deref())?;
    let work_dir = loaded.work_dir()?;
    forget_in(&work_dir, name)?;
    println!("Forgot {name}; the next `depforge ensure` will provision it again");
    Ok(())
}

fn forget_in(work_dir: &Path, name: &str) -> Result<ProvisionRecord> {
    let path = ProvisionIndex::path_in(work_dir);
    let mut index = ProvisionIndex::load(&path)?;
    let Some(record) = index.remove(name) else {
        bail!("'{}' is not recorded as provisioned in {}", name, work_dir.display());
    };
    index.save(&path)?;
    Ok(record)
}
