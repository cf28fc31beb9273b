//! Ensuring a dependency is provisioned: fetch, extract, build, install, record.

use crate::build::{BuildPlan, Runner, Stage, StepError, SystemRunner};
use crate::extract::{extract_archive, source_root};
use crate::fetch::{file_checksum, Fetch, FetchConfig, HttpFetcher};
use crate::index::{ProvisionIndex, ProvisionRecord};
use crate::spec::DependencySpec;
use std::fmt::Display;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while provisioning a dependency.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Connection failure or non-2xx response.
    #[error("failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// The archive does not have the expected SHA256.
    #[error("checksum verification failed for '{archive}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        archive: String,
        expected: String,
        actual: String,
    },

    /// The archive is corrupt, truncated or empty.
    #[error("failed to extract '{}': {reason}", archive.display())]
    Extract { archive: PathBuf, reason: String },

    /// A build stage could not be started or exited non-zero.
    #[error("{stage} stage failed for '{dependency}': {source}")]
    Build {
        dependency: String,
        stage: Stage,
        #[source]
        source: StepError,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The provision index could not be read or written.
    #[error("provision index error: {0}")]
    Index(String),
}

/// What [`Provisioner::ensure`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A matching record already existed; nothing was touched.
    AlreadyProvisioned,
    /// The dependency was built and installed.
    Provisioned {
        /// SHA256 of the archive that was built.
        checksum: String,
        /// Whether the archive was downloaded (as opposed to reused).
        fetched: bool,
    },
}

/// Configuration for a [`Provisioner`].
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Where archives, staging directories and the index live.
    pub work_dir: PathBuf,
    /// Move the built source tree to `<work_dir>/<name>_<version>` instead
    /// of deleting it.
    pub keep_sources: bool,
    /// Suppress progress output.
    pub quiet: bool,
}

impl ProvisionerConfig {
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            keep_sources: false,
            quiet: false,
        }
    }
}

/// Drives the provisioning of dependencies in one working directory.
pub struct Provisioner<F = HttpFetcher, R = SystemRunner> {
    config: ProvisionerConfig,
    fetcher: F,
    runner: R,
}

impl Provisioner {
    /// Create a provisioner that downloads over HTTP and runs real processes.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ProvisionerConfig) -> Result<Self, ProvisionError> {
        let fetcher = HttpFetcher::with_config(&FetchConfig {
            quiet: config.quiet,
            ..FetchConfig::default()
        })?;
        Ok(Self::with_parts(config, fetcher, SystemRunner))
    }
}

impl<F: Fetch, R: Runner> Provisioner<F, R> {
    /// Create a provisioner with a custom fetcher and runner.
    pub fn with_parts(config: ProvisionerConfig, fetcher: F, runner: R) -> Self {
        Self {
            config,
            fetcher,
            runner,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Path of the provision index for this working directory.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        ProvisionIndex::path_in(&self.config.work_dir)
    }

    /// Load the provision index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be loaded.
    pub fn load_index(&self) -> Result<ProvisionIndex, ProvisionError> {
        ProvisionIndex::load(&self.index_path())
    }

    /// Whether `spec` is already recorded as provisioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be loaded.
    pub fn is_provisioned(&self, spec: &DependencySpec) -> Result<bool, ProvisionError> {
        Ok(self.load_index()?.contains(spec))
    }

    /// Drop the record for `name` so the next [`ensure`](Self::ensure)
    /// provisions it again. Installed files are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be loaded or saved.
    pub fn forget(&self, name: &str) -> Result<Option<ProvisionRecord>, ProvisionError> {
        let mut index = self.load_index()?;
        let removed = index.remove(name);
        if removed.is_some() {
            index.save(&self.index_path())?;
        }
        Ok(removed)
    }

    /// Make sure `spec` is installed at its prefix.
    ///
    /// Returns immediately if a matching record exists. Otherwise reuses or
    /// downloads the archive, extracts it into a staging directory, runs
    /// the configure and build+install stages, and records the result. The
    /// staging directory is removed on every exit path.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step: [`ProvisionError::Fetch`] or
    /// [`ProvisionError::ChecksumMismatch`] before anything is extracted,
    /// [`ProvisionError::Extract`] before any build stage runs,
    /// [`ProvisionError::Build`] before anything is recorded.
    pub fn ensure(&self, spec: &DependencySpec) -> Result<Outcome, ProvisionError> {
        let mut index = self.load_index()?;
        if index.contains(spec) {
            self.say(format_args!("{spec} is already provisioned"));
            return Ok(Outcome::AlreadyProvisioned);
        }

        let work_dir = &self.config.work_dir;
        fs::create_dir_all(work_dir)?;

        let archive = work_dir.join(spec.archive_name());
        let fetched = if archive.exists() {
            self.say(format_args!("Using cached {}", archive.display()));
            self.verify_cached(spec, &archive)?;
            false
        } else {
            self.say(format_args!("Fetching {}", spec.source_url()));
            self.download(spec, &archive)?;
            true
        };
        let checksum = file_checksum(&archive)?;

        let staging = tempfile::Builder::new()
            .prefix(".depforge-")
            .tempdir_in(work_dir)?;

        self.say(format_args!("Extracting {}", spec.archive_name()));
        if let Err(e) = extract_archive(&archive, staging.path()) {
            // Don't let a bad archive pose as a download cache.
            remove_if_exists(&archive)?;
            return Err(e);
        }
        let root = source_root(staging.path())?;

        let plan = BuildPlan::for_spec(spec);
        for step in plan.steps() {
            self.say(format_args!("Running {} stage: {step}", step.stage));
            self.runner
                .run(step, &root)
                .map_err(|source| ProvisionError::Build {
                    dependency: spec.to_string(),
                    stage: step.stage,
                    source,
                })?;
        }

        if self.config.keep_sources {
            let kept = work_dir.join(spec.source_dir_name());
            if kept.exists() {
                fs::remove_dir_all(&kept)?;
            }
            fs::rename(&root, &kept)?;
            self.say(format_args!("Kept sources in {}", kept.display()));
        }
        drop(staging);

        index.insert(ProvisionRecord::new(spec, checksum.clone()));
        index.save(&self.index_path())?;

        self.say(format_args!(
            "Provisioned {spec} into {}",
            spec.install_prefix().display()
        ));
        Ok(Outcome::Provisioned { checksum, fetched })
    }

    /// Download into a temporary file and only move it to `archive` once
    /// it is complete and verified.
    fn download(&self, spec: &DependencySpec, archive: &Path) -> Result<(), ProvisionError> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".depforge-download-")
            .tempfile_in(&self.config.work_dir)?;

        self.fetcher.fetch(spec.source_url(), tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;

        if let Some(expected) = spec.sha256() {
            let actual = file_checksum(tmp.path())?;
            if actual != expected {
                return Err(ProvisionError::ChecksumMismatch {
                    archive: spec.archive_name(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tmp.persist(archive).map_err(|e| ProvisionError::Io(e.error))?;
        Ok(())
    }

    /// Check a reused archive against the expected checksum, discarding it
    /// on mismatch so the next run downloads a fresh copy.
    fn verify_cached(&self, spec: &DependencySpec, archive: &Path) -> Result<(), ProvisionError> {
        let Some(expected) = spec.sha256() else {
            return Ok(());
        };
        let actual = file_checksum(archive)?;
        if actual != expected {
            remove_if_exists(archive)?;
            return Err(ProvisionError::ChecksumMismatch {
                archive: spec.archive_name(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    fn say(&self, message: impl Display) {
        if !self.config.quiet {
            println!("{message}");
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
