//! Locating the manifest and the working directory.

use anyhow::{bail, Context, Result};
use depforge_core::{DependencySpec, Manifest, Settings, MANIFEST_FILE};
use std::path::{Path, PathBuf};

/// Environment variable overriding the working directory.
pub const WORK_DIR_ENV: &str = "DEPFORGE_WORK_DIR";

/// A manifest together with where it came from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub manifest: Manifest,
    /// Directory of the manifest file, if one was read.
    pub base_dir: Option<PathBuf>,
}

impl LoadedConfig {
    /// Load `explicit` if given, else `./depforge.toml` if it exists, else
    /// the built-in default.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Manifest not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => {
                let local = PathBuf::from(MANIFEST_FILE);
                local.exists().then_some(local)
            }
        };

        match path {
            Some(path) => {
                let manifest = Manifest::from_path(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                let base_dir = path
                    .canonicalize()
                    .ok()
                    .and_then(|p| p.parent().map(Path::to_path_buf));
                Ok(Self { manifest, base_dir })
            }
            None => Ok(Self {
                manifest: Manifest::default(),
                base_dir: None,
            }),
        }
    }

    /// Working directory from the environment, the manifest, or the home directory.
    pub fn work_dir(&self) -> Result<PathBuf> {
        resolve_work_dir(
            std::env::var(WORK_DIR_ENV).ok(),
            &self.manifest.settings,
            self.base_dir.as_deref(),
            dirs::home_dir(),
        )
    }

    /// The specs to act on: all of them, or only `names` in manifest order.
    pub fn select(&self, names: &[String]) -> Result<Vec<DependencySpec>> {
        let specs = self.manifest.specs()?;
        if names.is_empty() {
            return Ok(specs);
        }

        for name in names {
            if !specs.iter().any(|s| s.name() == name) {
                bail!("Dependency '{}' is not declared in the manifest", name);
            }
        }
        Ok(specs
            .into_iter()
            .filter(|s| names.iter().any(|n| n == s.name()))
            .collect())
    }
}

fn resolve_work_dir(
    env_value: Option<String>,
    settings: &Settings,
    base_dir: Option<&Path>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = env_value.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    if let Some(ref dir) = settings.work_dir {
        return Ok(match base_dir {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir.clone(),
        });
    }

    home.context("Could not determine home directory")
}
