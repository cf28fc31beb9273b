//! The commit record of provisioned dependencies.
//!
//! A dependency counts as provisioned only once its entry is written here,
//! which happens after both build stages succeed. The downloaded archive is
//! just a download cache and says nothing about whether a build finished.

use crate::spec::DependencySpec;
use crate::ProvisionError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory under the working directory that holds depforge state.
pub const STATE_DIR: &str = ".depforge";

/// File name of the index inside [`STATE_DIR`].
pub const INDEX_FILE: &str = "provisioned.toml";

/// One successfully provisioned dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProvisionRecord {
    pub name: String,
    pub version: String,
    pub source_url: String,
    pub install_prefix: PathBuf,
    #[serde(default)]
    pub build_options: BTreeSet<String>,
    /// SHA256 of the archive that was built.
    pub checksum: String,
    /// RFC 3339 timestamp.
    pub provisioned_at: String,
}

impl ProvisionRecord {
    /// Record a successful build of `spec` from an archive with `checksum`.
    #[must_use]
    pub fn new(spec: &DependencySpec, checksum: String) -> Self {
        Self {
            name: spec.name().to_string(),
            version: spec.version().to_string(),
            source_url: spec.source_url().to_string(),
            install_prefix: spec.install_prefix().to_path_buf(),
            build_options: spec.build_options().clone(),
            checksum,
            provisioned_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Whether this record covers `spec`: same version, prefix and options.
    #[must_use]
    pub fn matches(&self, spec: &DependencySpec) -> bool {
        self.name == spec.name()
            && self.version == spec.version()
            && self.install_prefix == spec.install_prefix()
            && &self.build_options == spec.build_options()
    }
}

/// All provisioned dependencies in one working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionIndex {
    /// Version of the index format.
    pub version: u32,
    /// Records keyed by dependency name.
    #[serde(default)]
    pub dependencies: BTreeMap<String, ProvisionRecord>,
}

impl ProvisionIndex {
    /// Current index format version.
    pub const CURRENT_VERSION: u32 = 1;

    #[must_use]
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            dependencies: BTreeMap::new(),
        }
    }

    /// Index location for a working directory.
    #[must_use]
    pub fn path_in(work_dir: &Path) -> PathBuf {
        work_dir.join(STATE_DIR).join(INDEX_FILE)
    }

    /// Load the index, or an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let index: Self =
            toml::from_str(&content).map_err(|e| ProvisionError::Index(e.to_string()))?;
        if index.version > Self::CURRENT_VERSION {
            return Err(ProvisionError::Index(format!(
                "index format version {} is newer than supported version {}",
                index.version,
                Self::CURRENT_VERSION
            )));
        }
        Ok(index)
    }

    /// Save the index, replacing the old file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ProvisionError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ProvisionError::Index(e.to_string()))?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(path).map_err(|e| ProvisionError::Io(e.error))?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProvisionRecord> {
        self.dependencies.get(name)
    }

    /// Whether `spec` is recorded as provisioned.
    #[must_use]
    pub fn contains(&self, spec: &DependencySpec) -> bool {
        self.get(spec.name()).is_some_and(|record| record.matches(spec))
    }

    /// Add or replace a record.
    pub fn insert(&mut self, record: ProvisionRecord) {
        self.dependencies.insert(record.name.clone(), record);
    }

    pub fn remove(&mut self, name: &str) -> Option<ProvisionRecord> {
        self.dependencies.remove(name)
    }
}
