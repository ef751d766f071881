/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::process::Stdio;
use std::time::Instant as StdInstant;

use async_trait::async_trait;
use tokio::process::Command;

use super::{cancellation_error, RunResult, Runner};
use crate::context::Context;
use crate::defaults::LOCALE_PIN;
use crate::error::{Error, Result};

/// Production [`Runner`]: spawns real subprocesses with a pinned locale,
/// captured streams, and cancellation bound to a [`Context`] (§4.1).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(program: &str, args: &[String], extra_env: &[(String, String)]) -> Command {
        let (locale_key, locale_val) = LOCALE_PIN
            .split_once('=')
            .expect("LOCALE_PIN is a KEY=VALUE constant");
        let mut cmd = Command::new(program);
        cmd.args(args);
        // Ensure cancellation (dropping the in-flight future) actually
        // terminates the child instead of leaving it to run to completion
        // in the background (§4.1, §5).
        cmd.kill_on_drop(true);
        cmd.env(locale_key, locale_val);
        for (k, v) in extra_env {
            cmd.env(k, v);
        }
        cmd
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        ctx: &Context,
        program: &str,
        args: &[String],
        extra_env: &[(String, String)],
    ) -> Result<RunResult> {
        let mut cmd = Self::build_command(program, args, extra_env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let start = StdInstant::now();
        let child = cmd.spawn().map_err(|e| {
            Error::Unavailable(program.to_string(), e.to_string())
        })?;

        tokio::select! {
            result = child.wait_with_output() => {
                let output = result.map_err(|e| Error::General(format!("{program}: {e}")))?;
                Ok(RunResult {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_code: output.status.code().unwrap_or(-1),
                    duration: start.elapsed(),
                })
            }
            _ = ctx.cancelled_or_expired() => {
                Err(cancellation_error(ctx))
            }
        }
    }

    async fn run_interactive(
        &self,
        ctx: &Context,
        program: &str,
        args: &[String],
        extra_env: &[(String, String)],
    ) -> Result<()> {
        let mut cmd = Self::build_command(program, args, extra_env);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Unavailable(program.to_string(), e.to_string()))?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| Error::General(format!("{program}: {e}")))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::General(format!(
                        "{program} exited with status {:?}",
                        status.code()
                    )))
                }
            }
            _ = ctx.cancelled_or_expired() => {
                let _ = child.start_kill();
                Err(cancellation_error(ctx))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_includes_locale_pin() {
        let runner = ProcessRunner::new();
        let ctx = Context::background();
        let result = runner.run(&ctx, "env", &[], &[]).await.unwrap();
        assert!(result.success());
        let out = result.stdout_utf8();
        assert!(out.lines().any(|l| l == "LC_ALL=C"), "env output was: {out}");
    }

    #[tokio::test]
    async fn extra_env_can_override_pin() {
        let runner = ProcessRunner::new();
        let ctx = Context::background();
        let extra = vec![("LC_ALL".to_string(), "en_US.UTF-8".to_string())];
        let result = runner.run(&ctx, "env", &[], &extra).await.unwrap();
        let out = result.stdout_utf8();
        assert!(out.lines().any(|l| l == "LC_ALL=en_US.UTF-8"), "env output was: {out}");
    }

    #[tokio::test]
    async fn exit_code_is_not_a_runner_error() {
        let runner = ProcessRunner::new();
        let ctx = Context::background();
        let result = runner
            .run(&ctx, "sh", &["-c".to_string(), "exit 7".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(result.exit_code, 7);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable_error() {
        let runner = ProcessRunner::new();
        let ctx = Context::background();
        let err = runner
            .run(&ctx, "definitely-not-a-real-binary-xyz", &[], &[])
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::status::StatusCategory::UnavailableError);
    }

    #[tokio::test]
    async fn deadline_kills_child_and_returns_timeout() {
        let runner = ProcessRunner::new();
        let ctx = Context::background().with_timeout(std::time::Duration::from_millis(50));
        let err = runner
            .run(&ctx, "sleep", &["5".to_string()], &[])
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::status::StatusCategory::GeneralError);
    }
}
