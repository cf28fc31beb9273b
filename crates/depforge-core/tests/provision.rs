//! End-to-end tests of `Provisioner::ensure` with in-process fetchers and runners.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use depforge_core::{
    BuildSystem, DependencySpec, Fetch, Outcome, ProvisionError, ProvisionIndex, Provisioner,
    ProvisionerConfig, Runner, Stage, Step, StepError,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn boost_tarball() -> Vec<u8> {
    tarball(&[
        ("boost_1_48_0/bootstrap.sh", "#!/bin/sh\n"),
        ("boost_1_48_0/boost/program_options.hpp", "#pragma once\n"),
    ])
}

/// Serves a fixed body, or fails every request, and counts calls.
struct FakeFetcher {
    body: Option<Vec<u8>>,
    calls: Cell<usize>,
}

impl FakeFetcher {
    fn serving(body: Vec<u8>) -> Self {
        Self {
            body: Some(body),
            calls: Cell::new(0),
        }
    }

    fn unreachable() -> Self {
        Self {
            body: None,
            calls: Cell::new(0),
        }
    }
}

impl Fetch for &FakeFetcher {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<(), ProvisionError> {
        self.calls.set(self.calls.get() + 1);
        match &self.body {
            Some(body) => {
                dest.write_all(body)?;
                Ok(())
            }
            None => Err(ProvisionError::Fetch {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

/// Records every step it is asked to run, optionally failing one stage.
#[derive(Default)]
struct RecordingRunner {
    fail_stage: Option<Stage>,
    runs: RefCell<Vec<(Step, PathBuf)>>,
}

impl RecordingRunner {
    fn failing_at(stage: Stage) -> Self {
        Self {
            fail_stage: Some(stage),
            runs: RefCell::default(),
        }
    }

    fn programs(&self) -> Vec<String> {
        self.runs.borrow().iter().map(|(s, _)| s.to_string()).collect()
    }
}

impl Runner for &RecordingRunner {
    fn run(&self, step: &Step, cwd: &Path) -> Result<(), StepError> {
        assert!(cwd.is_dir(), "step must run inside the extracted tree");
        self.runs.borrow_mut().push((step.clone(), cwd.to_path_buf()));
        if self.fail_stage == Some(step.stage) {
            return Err(StepError::Exit {
                program: step.program.clone(),
                code: Some(1),
            });
        }
        Ok(())
    }
}

fn boost_spec() -> DependencySpec {
    DependencySpec::builder("boost", "1.48.0")
        .url_template("https://mirror.example/{name}_{version_underscored}.tar.gz")
        .install_prefix("/usr/local/")
        .build_system(BuildSystem::Bootstrap)
        .build_option("program_options")
        .build()
        .unwrap()
}

fn config(work: &TempDir) -> ProvisionerConfig {
    ProvisionerConfig {
        quiet: true,
        ..ProvisionerConfig::new(work.path())
    }
}

/// Entries in the working directory other than the archive and state dir.
fn leftovers(work: &Path) -> Vec<String> {
    fs::read_dir(work)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name != "boost_1_48_0.tar.gz" && name != ".depforge")
        .collect()
}

#[test]
fn test_ensure_fetches_builds_and_records() {
    let work = TempDir::new().unwrap();
    let fetcher = FakeFetcher::serving(boost_tarball());
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    let outcome = provisioner.ensure(&boost_spec()).unwrap();

    assert!(matches!(outcome, Outcome::Provisioned { fetched: true, .. }));
    assert_eq!(fetcher.calls.get(), 1);
    assert_eq!(
        runner.programs(),
        vec![
            "./bootstrap.sh --prefix=/usr/local/ --with-libraries=program_options".to_string(),
            "./b2 install".to_string(),
        ]
    );
    let runs = runner.runs.borrow();
    assert!(runs[0].1.ends_with("boost_1_48_0"));

    assert!(work.path().join("boost_1_48_0.tar.gz").exists());
    assert!(provisioner.is_provisioned(&boost_spec()).unwrap());
    assert!(leftovers(work.path()).is_empty(), "{:?}", leftovers(work.path()));
}

#[test]
fn test_ensure_is_idempotent() {
    let work = TempDir::new().unwrap();
    let fetcher = FakeFetcher::serving(boost_tarball());
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    provisioner.ensure(&boost_spec()).unwrap();
    let second = provisioner.ensure(&boost_spec()).unwrap();

    assert_eq!(second, Outcome::AlreadyProvisioned);
    assert_eq!(fetcher.calls.get(), 1);
    assert_eq!(runner.runs.borrow().len(), 2);
}

#[test]
fn test_cached_archive_skips_network() {
    let work = TempDir::new().unwrap();
    fs::write(work.path().join("boost_1_48_0.tar.gz"), boost_tarball()).unwrap();
    let fetcher = FakeFetcher::unreachable();
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    let outcome = provisioner.ensure(&boost_spec()).unwrap();

    assert!(matches!(outcome, Outcome::Provisioned { fetched: false, .. }));
    assert_eq!(fetcher.calls.get(), 0);
    assert_eq!(runner.runs.borrow().len(), 2);
}

#[test]
fn test_unreachable_url_is_fetch_error() {
    let work = TempDir::new().unwrap();
    let fetcher = FakeFetcher::unreachable();
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    let err = provisioner.ensure(&boost_spec()).unwrap_err();

    assert!(matches!(err, ProvisionError::Fetch { .. }));
    assert!(runner.runs.borrow().is_empty());
    assert!(!work.path().join("boost_1_48_0.tar.gz").exists());
    assert!(leftovers(work.path()).is_empty(), "{:?}", leftovers(work.path()));
}

#[test]
fn test_corrupt_archive_is_extract_error() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("boost_1_48_0.tar.gz");
    fs::write(&archive, b"<html>mirror error page</html>").unwrap();
    let fetcher = FakeFetcher::unreachable();
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    let err = provisioner.ensure(&boost_spec()).unwrap_err();

    assert!(matches!(err, ProvisionError::Extract { .. }));
    assert_eq!(fetcher.calls.get(), 0);
    assert!(runner.runs.borrow().is_empty());
    assert!(!archive.exists(), "corrupt archive should be discarded");
    assert!(!provisioner.is_provisioned(&boost_spec()).unwrap());
    assert!(leftovers(work.path()).is_empty(), "{:?}", leftovers(work.path()));
}

#[test]
fn test_failed_configure_stops_before_install() {
    let work = TempDir::new().unwrap();
    let fetcher = FakeFetcher::serving(boost_tarball());
    let runner = RecordingRunner::failing_at(Stage::Configure);
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    let err = provisioner.ensure(&boost_spec()).unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Build { stage: Stage::Configure, .. }
    ));
    assert_eq!(runner.runs.borrow().len(), 1);
    assert!(!provisioner.is_provisioned(&boost_spec()).unwrap());
}

#[test]
fn test_failed_install_is_not_recorded_and_retries() {
    let work = TempDir::new().unwrap();
    let fetcher = FakeFetcher::serving(boost_tarball());
    let failing = RecordingRunner::failing_at(Stage::Install);
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &failing);

    let err = provisioner.ensure(&boost_spec()).unwrap_err();
    assert!(matches!(err, ProvisionError::Build { stage: Stage::Install, .. }));
    assert!(!provisioner.is_provisioned(&boost_spec()).unwrap());
    assert!(leftovers(work.path()).is_empty(), "{:?}", leftovers(work.path()));

    // The archive stays as a cache; a second run rebuilds without fetching.
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);
    let outcome = provisioner.ensure(&boost_spec()).unwrap();
    assert!(matches!(outcome, Outcome::Provisioned { fetched: false, .. }));
    assert_eq!(fetcher.calls.get(), 1);
}

#[test]
fn test_checksum_mismatch_discards_download() {
    let work = TempDir::new().unwrap();
    let spec = DependencySpec::builder("boost", "1.48.0")
        .url_template("https://mirror.example/{name}_{version_underscored}.tar.gz")
        .build_system(BuildSystem::Bootstrap)
        .sha256("0".repeat(64))
        .build()
        .unwrap();
    let fetcher = FakeFetcher::serving(boost_tarball());
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    let err = provisioner.ensure(&spec).unwrap_err();

    assert!(matches!(err, ProvisionError::ChecksumMismatch { .. }));
    assert!(!work.path().join(spec.archive_name()).exists());
    assert!(runner.runs.borrow().is_empty());
    assert!(leftovers(work.path()).is_empty(), "{:?}", leftovers(work.path()));
}

#[test]
fn test_checksum_match_is_recorded() {
    let work = TempDir::new().unwrap();
    let body = boost_tarball();
    let expected = {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(&body))
    };
    let spec = DependencySpec::builder("boost", "1.48.0")
        .url_template("https://mirror.example/{name}_{version_underscored}.tar.gz")
        .build_system(BuildSystem::Bootstrap)
        .sha256(expected.clone())
        .build()
        .unwrap();
    let fetcher = FakeFetcher::serving(body);
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    let outcome = provisioner.ensure(&spec).unwrap();

    assert_eq!(
        outcome,
        Outcome::Provisioned {
            checksum: expected.clone(),
            fetched: true
        }
    );
    let index = ProvisionIndex::load(&provisioner.index_path()).unwrap();
    assert_eq!(index.get("boost").unwrap().checksum, expected);
}

#[test]
fn test_keep_sources_moves_tree() {
    let work = TempDir::new().unwrap();
    let fetcher = FakeFetcher::serving(boost_tarball());
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(
        ProvisionerConfig {
            keep_sources: true,
            ..config(&work)
        },
        &fetcher,
        &runner,
    );

    provisioner.ensure(&boost_spec()).unwrap();

    let kept = work.path().join("boost_1_48_0");
    assert!(kept.join("bootstrap.sh").exists());
    assert_eq!(leftovers(work.path()), vec!["boost_1_48_0".to_string()]);
}

#[test]
fn test_changed_options_reprovision() {
    let work = TempDir::new().unwrap();
    let fetcher = FakeFetcher::serving(boost_tarball());
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    provisioner.ensure(&boost_spec()).unwrap();

    let wider = DependencySpec::builder("boost", "1.48.0")
        .url_template("https://mirror.example/{name}_{version_underscored}.tar.gz")
        .install_prefix("/usr/local/")
        .build_system(BuildSystem::Bootstrap)
        .build_options(["program_options", "thread"])
        .build()
        .unwrap();
    let outcome = provisioner.ensure(&wider).unwrap();

    assert!(matches!(outcome, Outcome::Provisioned { fetched: false, .. }));
    assert_eq!(runner.runs.borrow().len(), 4);
}

#[test]
fn test_forget_allows_reprovision() {
    let work = TempDir::new().unwrap();
    let fetcher = FakeFetcher::serving(boost_tarball());
    let runner = RecordingRunner::default();
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, &runner);

    provisioner.ensure(&boost_spec()).unwrap();
    let removed = provisioner.forget("boost").unwrap();
    assert_eq!(removed.unwrap().version, "1.48.0");
    assert!(provisioner.forget("boost").unwrap().is_none());

    let outcome = provisioner.ensure(&boost_spec()).unwrap();
    assert!(matches!(outcome, Outcome::Provisioned { .. }));
}

#[cfg(unix)]
#[test]
fn test_real_build_scripts_install_into_prefix() {
    use depforge_core::SystemRunner;

    let work = TempDir::new().unwrap();
    let prefix = TempDir::new().unwrap();
    let body = tarball(&[
        (
            "demo_1_0/setup.sh",
            "#!/bin/sh\nprintf '%s' \"$1\" > configured\n",
        ),
        (
            "demo_1_0/install.sh",
            "#!/bin/sh\nmkdir -p \"$1/include\" \"$1/lib\"\ncp configured \"$1/lib/libdemo.txt\"\n",
        ),
    ]);
    let spec = DependencySpec::builder("demo", "1.0")
        .url_template("https://mirror.example/{name}-{version}.tar.gz")
        .install_prefix(prefix.path())
        .build_system(BuildSystem::Custom {
            configure: vec!["sh".into(), "setup.sh".into(), "{options}".into()],
            install: vec!["sh".into(), "install.sh".into(), "{prefix}".into()],
        })
        .build_option("program_options")
        .build()
        .unwrap();
    let fetcher = FakeFetcher::serving(body);
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, SystemRunner);

    provisioner.ensure(&spec).unwrap();

    assert!(prefix.path().join("include").is_dir());
    let installed = fs::read_to_string(prefix.path().join("lib/libdemo.txt")).unwrap();
    assert_eq!(installed, "program_options");
}

#[cfg(unix)]
#[test]
fn test_real_failing_build_script() {
    use depforge_core::SystemRunner;

    let work = TempDir::new().unwrap();
    let body = tarball(&[("broken_1_0/setup.sh", "#!/bin/sh\nexit 7\n")]);
    let spec = DependencySpec::builder("broken", "1.0")
        .url_template("https://mirror.example/{name}-{version}.tar.gz")
        .build_system(BuildSystem::Custom {
            configure: vec!["sh".into(), "setup.sh".into()],
            install: vec!["sh".into(), "-c".into(), "exit 0".into()],
        })
        .build()
        .unwrap();
    let fetcher = FakeFetcher::serving(body);
    let provisioner = Provisioner::with_parts(config(&work), &fetcher, SystemRunner);

    let err = provisioner.ensure(&spec).unwrap_err();

    match err {
        ProvisionError::Build { stage, source, .. } => {
            assert_eq!(stage, Stage::Configure);
            assert!(matches!(source, StepError::Exit { code: Some(7), .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}
