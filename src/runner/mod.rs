/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The subprocess execution substrate (§4.1).

mod mock;
mod process;

pub use mock::{MockInvocation, MockRunner};
pub use process::ProcessRunner;

use std::time::Duration;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Error, Result};

/// Everything captured from a completed, non-interactive invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// The process exit code. A non-zero value is not itself an error of the
    /// runner — classification is the driver's job (§4.1, §4.5).
    pub exit_code: i32,
    pub duration: Duration,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// The subprocess abstraction every driver invokes through. Implemented by
/// [`ProcessRunner`] in production and [`MockRunner`] in tests.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run `program args...` to completion, capturing its streams and exit
    /// code. `extra_env` is appended after the mandatory `LC_ALL=C` pin
    /// (§4.1, §6); a caller may override the pin by repeating the variable.
    async fn run(
        &self,
        ctx: &Context,
        program: &str,
        args: &[String],
        extra_env: &[(String, String)],
    ) -> Result<RunResult>;

    /// Run `program args...` with the parent's stdin/stdout/stderr attached
    /// directly to the child. No capture or parsing occurs; only an error
    /// (or success) is reported.
    async fn run_interactive(
        &self,
        ctx: &Context,
        program: &str,
        args: &[String],
        extra_env: &[(String, String)],
    ) -> Result<()>;
}

/// Error produced when a context is cancelled or its deadline elapses
/// before the child process finishes.
pub fn cancellation_error(ctx: &Context) -> Error {
    match ctx.deadline() {
        Some(_) if ctx.is_cancelled() => Error::Cancelled,
        Some(deadline) => {
            let now = tokio::time::Instant::now();
            Error::TimedOut(deadline.saturating_duration_since(now))
        }
        None => Error::Cancelled,
    }
}
