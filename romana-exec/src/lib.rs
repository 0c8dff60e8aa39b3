//! Utilities for running host tools through [`std::process::Command`].
//!
//! Every call blocks until the child exits. There is no timeout and no
//! retry: a command either succeeds or its failure is returned as-is.
#![doc(issue_tracker_base_url = "https://github.com/romana/romana-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::{io, process, sync::Arc};

/// Errors returned by an [`Execute`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No program was given.
    #[error("empty command provided")]
    Empty,
    /// The program could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// The program ran and exited unsuccessfully.
    #[error("{program} returned non-zero status {:?}: {}", output.code, output.stderr.trim())]
    NonZero {
        /// Program that was run.
        program: String,
        /// What it printed before exiting.
        output: Output,
    },
}

impl Error {
    /// The captured output, if the command ran at all.
    pub fn output(&self) -> Option<&Output> {
        match self {
            Self::NonZero { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Exit code, `None` if the child was terminated by a signal.
    pub code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl Output {
    /// A zero exit with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self { code: Some(0), stdout: stdout.into(), stderr: String::new() }
    }

    /// A non-zero exit with the given stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self { code: Some(code), stdout: String::new(), stderr: stderr.into() }
    }

    /// Whether the command exited with status 0.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<process::Output> for Output {
    fn from(value: process::Output) -> Self {
        Self {
            code: value.status.code(),
            stdout: String::from_utf8_lossy(&value.stdout).to_string(),
            stderr: String::from_utf8_lossy(&value.stderr).to_string(),
        }
    }
}

/// Result alias for command execution.
pub type Result<T> = std::result::Result<T, Error>;

/// Runs a program with arguments and reports its output.
///
/// A non-zero exit must be reported as [`Error::NonZero`].
pub trait Execute {
    /// Runs `program` with `args` and waits for it to exit.
    fn execute(&self, program: &str, args: &[String]) -> Result<Output>;
}

impl<T: Execute + ?Sized> Execute for &T {
    fn execute(&self, program: &str, args: &[String]) -> Result<Output> {
        (**self).execute(program, args)
    }
}

impl<T: Execute + ?Sized> Execute for Box<T> {
    fn execute(&self, program: &str, args: &[String]) -> Result<Output> {
        (**self).execute(program, args)
    }
}

impl<T: Execute + ?Sized> Execute for Arc<T> {
    fn execute(&self, program: &str, args: &[String]) -> Result<Output> {
        (**self).execute(program, args)
    }
}

/// [`Execute`] backed by child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner;

impl Runner {
    /// Runs the command provided as strings, separating args with whitespaces.
    pub fn by_str(cmd: &str) -> Result<Output> {
        let mut iter = cmd.split_ascii_whitespace();
        let program = iter.next().ok_or(Error::Empty)?;
        let args: Vec<String> = iter.map(str::to_owned).collect();

        Self.execute(program, &args)
    }
}

impl Execute for Runner {
    fn execute(&self, program: &str, args: &[String]) -> Result<Output> {
        if program.is_empty() {
            return Err(Error::Empty);
        }

        let mut cmd = process::Command::new(program);
        cmd.args(args).stderr(process::Stdio::piped()).stdout(process::Stdio::piped());

        tracing::debug!(?cmd, "running command");

        let output: Output = cmd
            .spawn()
            .and_then(|child| child.wait_with_output())
            .map_err(|source| Error::Spawn { program: program.to_owned(), source })?
            .into();

        if !output.is_success() {
            tracing::debug!(?output.stderr, ?output.code, ?cmd, "command returned non-zero status");
            return Err(Error::NonZero { program: program.to_owned(), output });
        }

        Ok(output)
    }
}
