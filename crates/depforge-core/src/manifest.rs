//! depforge manifest (`depforge.toml`) parsing and validation.

use crate::spec::{BuildSystem, DependencySpec, SpecError, DEFAULT_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Manifest file name looked up in the current directory.
pub const MANIFEST_FILE: &str = "depforge.toml";

const BOOST_URL: &str = "https://sourceforge.net/projects/boost/files/boost/{version}/{name}_{version_underscored}.tar.gz/download";

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("manifest declares no dependencies")]
    Empty,

    #[error("dependency '{0}' is declared more than once")]
    Duplicate(String),

    #[error("invalid dependency '{name}': {source}")]
    Dependency {
        name: String,
        #[source]
        source: SpecError,
    },
}

/// The complete depforge.toml manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,

    /// Dependencies, provisioned in declaration order.
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencyEntry>,
}

/// The `[settings]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Settings {
    /// Directory for archives, staging and state. Relative paths are
    /// relative to the manifest.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Keep built source trees instead of deleting them.
    #[serde(default)]
    pub keep_sources: bool,

    /// Suppress progress output.
    #[serde(default)]
    pub quiet: bool,
}

/// One `[[dependency]]` entry as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct DependencyEntry {
    pub name: String,
    pub version: String,

    /// Source URL template.
    pub url: String,

    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,

    #[serde(default)]
    pub build_system: BuildSystem,

    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default)]
    pub sha256: Option<String>,

    #[serde(default)]
    pub jobs: Option<u32>,

    #[serde(default)]
    pub sudo: bool,
}

fn default_prefix() -> PathBuf {
    PathBuf::from(DEFAULT_PREFIX)
}

impl DependencyEntry {
    /// Validate this entry into a [`DependencySpec`].
    ///
    /// # Errors
    ///
    /// Returns the spec validation error for the first invalid field.
    pub fn to_spec(&self) -> Result<DependencySpec, SpecError> {
        let mut builder = DependencySpec::builder(&self.name, &self.version)
            .url_template(&self.url)
            .install_prefix(&self.prefix)
            .build_system(self.build_system.clone())
            .build_options(&self.options)
            .sudo(self.sudo);
        if let Some(ref sum) = self.sha256 {
            builder = builder.sha256(sum);
        }
        if let Some(jobs) = self.jobs {
            builder = builder.jobs(jobs);
        }
        builder.build()
    }
}

impl Manifest {
    /// Load a manifest from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a dependency fails validation.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.specs()?;
        Ok(manifest)
    }

    /// Validate every entry and return the specs in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty manifest, a duplicated name or an
    /// invalid entry.
    pub fn specs(&self) -> Result<Vec<DependencySpec>, ManifestError> {
        if self.dependencies.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut seen = HashSet::new();
        self.dependencies
            .iter()
            .map(|entry| {
                if !seen.insert(entry.name.as_str()) {
                    return Err(ManifestError::Duplicate(entry.name.clone()));
                }
                entry.to_spec().map_err(|source| ManifestError::Dependency {
                    name: entry.name.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Serialize the manifest to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Boost 1.48.0 with `program_options`, installed under `/usr/local/`.
impl Default for Manifest {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            dependencies: vec![DependencyEntry {
                name: String::from("boost"),
                version: String::from("1.48.0"),
                url: String::from(BOOST_URL),
                prefix: default_prefix(),
                build_system: BuildSystem::Bootstrap,
                options: vec![String::from("program_options")],
                sha256: None,
                jobs: None,
                sudo: false,
            }],
        }
    }
}
