//! The two-stage build: configure/bootstrap, then build+install.

use crate::spec::{BuildSystem, DependencySpec};
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Which half of the build a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Configure or bootstrap the source tree.
    Configure,
    /// Compile and install into the prefix.
    Install,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Install => "build+install",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single command line, run from the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub stage: Stage,
    pub program: String,
    pub args: Vec<String>,
}

impl Step {
    fn new(stage: Stage, program: &str, args: Vec<String>) -> Self {
        Self {
            stage,
            program: program.to_string(),
            args,
        }
    }

    /// Run this step under `sudo`.
    fn elevated(self) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            stage: self.stage,
            program: "sudo".to_string(),
            args,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// The configure and build+install steps for one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub configure: Step,
    pub install: Step,
}

impl BuildPlan {
    /// Derive the build plan from a spec's build system, prefix and options.
    #[must_use]
    pub fn for_spec(spec: &DependencySpec) -> Self {
        let prefix = spec.install_prefix().display().to_string();
        let options: Vec<String> = spec.build_options().iter().cloned().collect();
        let jobs = spec.jobs();

        let (configure, install) = match spec.build_system() {
            BuildSystem::Bootstrap => {
                let mut configure_args = vec![format!("--prefix={prefix}")];
                if !options.is_empty() {
                    configure_args.push(format!("--with-libraries={}", spec.joined_options()));
                }
                let mut install_args = Vec::new();
                if let Some(n) = jobs {
                    install_args.push(format!("-j{n}"));
                }
                install_args.push("install".to_string());
                (
                    Step::new(Stage::Configure, "./bootstrap.sh", configure_args),
                    Step::new(Stage::Install, "./b2", install_args),
                )
            }
            BuildSystem::Autotools => {
                let mut configure_args = vec![format!("--prefix={prefix}")];
                configure_args.extend(options);
                let mut install_args = Vec::new();
                if let Some(n) = jobs {
                    install_args.push(format!("-j{n}"));
                }
                install_args.push("install".to_string());
                (
                    Step::new(Stage::Configure, "./configure", configure_args),
                    Step::new(Stage::Install, "make", install_args),
                )
            }
            BuildSystem::Cmake => {
                let mut configure_args: Vec<String> = ["-S", ".", "-B", "build"]
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                configure_args.push(format!("-DCMAKE_INSTALL_PREFIX={prefix}"));
                configure_args.extend(options);
                let mut install_args: Vec<String> = ["--build", "build", "--target", "install"]
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                if let Some(n) = jobs {
                    install_args.push("--parallel".to_string());
                    install_args.push(n.to_string());
                }
                (
                    Step::new(Stage::Configure, "cmake", configure_args),
                    Step::new(Stage::Install, "cmake", install_args),
                )
            }
            BuildSystem::Custom { configure, install } => {
                let vars = Substitutions {
                    prefix: &prefix,
                    options: &spec.joined_options(),
                    jobs: jobs.unwrap_or(1),
                };
                (
                    custom_step(Stage::Configure, configure, &vars),
                    custom_step(Stage::Install, install, &vars),
                )
            }
        };

        let install = if spec.sudo() { install.elevated() } else { install };
        Self { configure, install }
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> [&Step; 2] {
        [&self.configure, &self.install]
    }
}

struct Substitutions<'a> {
    prefix: &'a str,
    options: &'a str,
    jobs: u32,
}

fn custom_step(stage: Stage, argv: &[String], vars: &Substitutions<'_>) -> Step {
    let mut words = argv.iter().map(|word| {
        word.replace("{prefix}", vars.prefix)
            .replace("{options}", vars.options)
            .replace("{jobs}", &vars.jobs.to_string())
    });
    // argv is non-empty; DependencySpec::build rejects empty custom commands.
    let program = words.next().unwrap_or_default();
    Step {
        stage,
        program,
        args: words.collect(),
    }
}

/// Why a build step did not succeed.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' exited with {}", describe_exit(.code))]
    Exit { program: String, code: Option<i32> },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Executes build steps.
pub trait Runner {
    /// Run `step` with `cwd` as working directory, blocking until it exits.
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`] if the step cannot be started or exits non-zero.
    fn run(&self, step: &Step, cwd: &Path) -> Result<(), StepError>;
}

/// Runs steps as child processes with inherited stdio, so the tools'
/// own output goes straight to the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, step: &Step, cwd: &Path) -> Result<(), StepError> {
        // `./script` must resolve against the source root, not our own cwd.
        let program = match step.program.strip_prefix("./") {
            Some(local) => cwd.join(local).into_os_string(),
            None => step.program.clone().into(),
        };

        let status = Command::new(&program)
            .args(&step.args)
            .current_dir(cwd)
            .status()
            .map_err(|source| StepError::Spawn {
                program: step.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(StepError::Exit {
                program: step.program.clone(),
                code: status.code(),
            });
        }

        Ok(())
    }
}
