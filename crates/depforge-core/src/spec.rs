//! The `DependencySpec` data model: what to fetch, where from, and how to build it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Install prefix used when none is given.
pub const DEFAULT_PREFIX: &str = "/usr/local/";

/// Extension of every archive depforge downloads.
pub const ARCHIVE_EXT: &str = "tar.gz";

/// Errors raised while constructing a [`DependencySpec`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("invalid dependency name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, &'static str),

    #[error("missing source URL for '{0}'")]
    MissingUrl(String),

    #[error("invalid source URL '{0}': {1}")]
    InvalidUrl(String, &'static str),

    #[error("install prefix must be an absolute path, got '{}'", .0.display())]
    RelativePrefix(PathBuf),

    #[error("invalid build option '{0}'")]
    InvalidOption(String),

    #[error("invalid sha256 checksum '{0}': expected 64 hex digits")]
    InvalidChecksum(String),

    #[error("build jobs must be at least 1")]
    ZeroJobs,

    #[error("custom build system has an empty {0} command")]
    EmptyCommand(&'static str),
}

/// How a dependency's source tree is configured, built and installed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildSystem {
    /// `./bootstrap.sh` followed by `./b2 install` (boost).
    Bootstrap,
    /// `./configure` followed by `make install`.
    #[default]
    Autotools,
    /// `cmake -S . -B build` followed by `cmake --build build --target install`.
    Cmake,
    /// Explicit command lines for both stages.
    ///
    /// Arguments may contain `{prefix}`, `{options}` (comma-joined) and
    /// `{jobs}` placeholders.
    Custom {
        configure: Vec<String>,
        install: Vec<String>,
    },
}

impl BuildSystem {
    /// Short name for display.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Autotools => "autotools",
            Self::Cmake => "cmake",
            Self::Custom { .. } => "custom",
        }
    }
}

impl std::fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully validated description of one external dependency.
///
/// Built once through [`DependencySpec::builder`] and never mutated
/// afterwards. The source URL is derived from the URL template, the name
/// and the version, so two specs with the same name, version and template
/// always point at the same archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    name: String,
    version: String,
    url_template: String,
    source_url: String,
    install_prefix: PathBuf,
    build_options: BTreeSet<String>,
    build_system: BuildSystem,
    sha256: Option<String>,
    jobs: Option<u32>,
    sudo: bool,
}

impl DependencySpec {
    /// Start building a spec for `name` at `version`.
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> DependencySpecBuilder {
        DependencySpecBuilder {
            name: name.into(),
            version: version.into(),
            url_template: None,
            install_prefix: PathBuf::from(DEFAULT_PREFIX),
            build_options: BTreeSet::new(),
            build_system: BuildSystem::default(),
            sha256: None,
            jobs: None,
            sudo: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The version with dots replaced by underscores (`1.48.0` -> `1_48_0`).
    #[must_use]
    pub fn version_underscored(&self) -> String {
        self.version.replace('.', "_")
    }

    #[must_use]
    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    #[must_use]
    pub fn install_prefix(&self) -> &Path {
        &self.install_prefix
    }

    #[must_use]
    pub fn build_options(&self) -> &BTreeSet<String> {
        &self.build_options
    }

    #[must_use]
    pub fn build_system(&self) -> &BuildSystem {
        &self.build_system
    }

    /// Expected SHA256 of the archive, lowercase hex.
    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    #[must_use]
    pub fn jobs(&self) -> Option<u32> {
        self.jobs
    }

    /// Whether the build+install stage runs under `sudo`.
    #[must_use]
    pub fn sudo(&self) -> bool {
        self.sudo
    }

    /// Local archive file name, e.g. `boost_1_48_0.tar.gz`.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{}.{ARCHIVE_EXT}", self.source_dir_name())
    }

    /// Directory name a kept source tree is stored under, e.g. `boost_1_48_0`.
    #[must_use]
    pub fn source_dir_name(&self) -> String {
        format!("{}_{}", self.name, self.version_underscored())
    }

    /// Build options joined with commas, in sorted order.
    #[must_use]
    pub fn joined_options(&self) -> String {
        self.build_options
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Builder for [`DependencySpec`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct DependencySpecBuilder {
    name: String,
    version: String,
    url_template: Option<String>,
    install_prefix: PathBuf,
    build_options: BTreeSet<String>,
    build_system: BuildSystem,
    sha256: Option<String>,
    jobs: Option<u32>,
    sudo: bool,
}

impl DependencySpecBuilder {
    /// Source URL, optionally containing `{name}`, `{version}` and
    /// `{version_underscored}` placeholders.
    #[must_use]
    pub fn url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = Some(template.into());
        self
    }

    #[must_use]
    pub fn install_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.install_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn build_option(mut self, option: impl Into<String>) -> Self {
        self.build_options.insert(option.into());
        self
    }

    #[must_use]
    pub fn build_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_options.extend(options.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn build_system(mut self, system: BuildSystem) -> Self {
        self.build_system = system;
        self
    }

    #[must_use]
    pub fn sha256(mut self, checksum: impl Into<String>) -> Self {
        self.sha256 = Some(checksum.into());
        self
    }

    #[must_use]
    pub fn jobs(mut self, jobs: u32) -> Self {
        self.jobs = Some(jobs);
        self
    }

    #[must_use]
    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Validate and freeze the spec.
    ///
    /// # Errors
    ///
    /// Returns a [`SpecError`] describing the first invalid field.
    pub fn build(self) -> Result<DependencySpec, SpecError> {
        validate_name(&self.name)?;
        validate_version(&self.version)?;

        let template = self
            .url_template
            .ok_or_else(|| SpecError::MissingUrl(self.name.clone()))?;
        let source_url = expand_url_template(&template, &self.name, &self.version)?;

        if !self.install_prefix.is_absolute() {
            return Err(SpecError::RelativePrefix(self.install_prefix));
        }

        for option in &self.build_options {
            if option.is_empty() || option.contains(',') || option.chars().any(char::is_whitespace) {
                return Err(SpecError::InvalidOption(option.clone()));
            }
        }

        let sha256 = match self.sha256 {
            Some(sum) => {
                if sum.len() != 64 || !sum.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(SpecError::InvalidChecksum(sum));
                }
                Some(sum.to_ascii_lowercase())
            }
            None => None,
        };

        if self.jobs == Some(0) {
            return Err(SpecError::ZeroJobs);
        }

        if let BuildSystem::Custom { configure, install } = &self.build_system {
            if configure.is_empty() {
                return Err(SpecError::EmptyCommand("configure"));
            }
            if install.is_empty() {
                return Err(SpecError::EmptyCommand("install"));
            }
        }

        Ok(DependencySpec {
            name: self.name,
            version: self.version,
            url_template: template,
            source_url,
            install_prefix: self.install_prefix,
            build_options: self.build_options,
            build_system: self.build_system,
            sha256,
            jobs: self.jobs,
            sudo: self.sudo,
        })
    }
}

/// Substitute `{name}`, `{version}` and `{version_underscored}` in a URL template.
///
/// # Errors
///
/// Returns an error if the result is not an http(s) URL or still contains
/// an unknown placeholder.
pub fn expand_url_template(template: &str, name: &str, version: &str) -> Result<String, SpecError> {
    let url = template
        .replace("{version_underscored}", &version.replace('.', "_"))
        .replace("{version}", version)
        .replace("{name}", name);

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SpecError::InvalidUrl(
            template.to_string(),
            "must start with http:// or https://",
        ));
    }
    if url.contains('{') || url.contains('}') {
        return Err(SpecError::InvalidUrl(template.to_string(), "unknown placeholder"));
    }

    Ok(url)
}

fn validate_name(name: &str) -> Result<(), SpecError> {
    if name.is_empty() {
        return Err(SpecError::InvalidName(name.to_string(), "name cannot be empty"));
    }

    if name.len() > 64 {
        return Err(SpecError::InvalidName(
            name.to_string(),
            "name cannot exceed 64 characters",
        ));
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(SpecError::InvalidName(
            name.to_string(),
            "name must start with a letter",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SpecError::InvalidName(
            name.to_string(),
            "name can only contain letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

fn validate_version(version: &str) -> Result<(), SpecError> {
    if version.is_empty() {
        return Err(SpecError::InvalidVersion(
            version.to_string(),
            "version cannot be empty",
        ));
    }

    // Versions end up in file names, so no separators or spaces.
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(SpecError::InvalidVersion(
            version.to_string(),
            "version can only contain letters, numbers, '.', '-' and '_'",
        ));
    }

    Ok(())
}
