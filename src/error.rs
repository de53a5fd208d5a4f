//! Error types for the sandbox.
//!
//! Only [`SandboxError`] ever leaves [`Sandbox::evaluate`](crate::sandbox::Sandbox::evaluate)
//! as an `Err`. Build and run failures are caused by the submitted code and are
//! folded into the verdict instead.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Infrastructure failure not attributable to the submitted code.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The execution workspace could not be created.
    #[error("failed to create workspace under {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The prepared source could not be written into the workspace.
    #[error("failed to write source file {path}: {source}")]
    SourceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The toolchain binary could not be started at all.
    #[error("failed to launch toolchain `{program}`: {source}")]
    Toolchain {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The configured toolchain command has no program.
    #[error("toolchain command is empty")]
    EmptyCommand,

    /// The problem's test cases are not a valid JSON array.
    #[error("invalid test cases: {0}")]
    TestCases(#[from] serde_json::Error),

    /// Any other I/O error on the sandbox side.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a submission failed to build.
#[derive(Error, Debug)]
pub enum BuildFailure {
    #[error("compilation time limit exceeded ({}s)", .0.as_secs_f64())]
    TimedOut(Duration),

    /// Carries the toolchain's standard error verbatim.
    #[error("compilation error: {0}")]
    Failed(String),
}

/// Why a single test run could not produce an outcome.
#[derive(Error, Debug)]
pub enum RunFailure {
    #[error("execution time limit exceeded ({}s)", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("failed to start program: {0}")]
    Launch(#[source] std::io::Error),

    #[error("I/O error while running program: {0}")]
    Io(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
