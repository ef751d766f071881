/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{RunResult, Runner};
use crate::context::Context;
use crate::error::{Error, Result};

/// A single recorded call to [`MockRunner::run`] or
/// [`MockRunner::run_interactive`], kept for test assertions (§4.1).
#[derive(Debug, Clone)]
pub struct MockInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub extra_env: Vec<(String, String)>,
    pub interactive: bool,
}

#[derive(Clone)]
struct Programmed {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
    error: Option<String>,
    delay: Duration,
}

/// Deterministic test double for [`Runner`], keyed by `(program,
/// normalized-args)` (§4.1). Lookup of an unprogrammed pair fails with an
/// error naming the command, so a test mis-programming a mock fails loudly
/// instead of hanging on a real subprocess.
#[derive(Default)]
pub struct MockRunner {
    responses: Mutex<HashMap<(String, Vec<String>), Programmed>>,
    invocations: Mutex<Vec<MockInvocation>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(program: &str, args: &[String]) -> (String, Vec<String>) {
        (program.to_string(), args.to_vec())
    }

    /// Program a successful or failing response for `program args...`.
    pub fn add_response(
        &self,
        program: &str,
        args: &[&str],
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
        exit_code: i32,
    ) {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.responses.lock().unwrap().insert(
            Self::key(program, &args),
            Programmed {
                stdout: stdout.into(),
                stderr: stderr.into(),
                exit_code,
                error: None,
                delay: Duration::ZERO,
            },
        );
    }

    /// Program a response that additionally sleeps `delay` before resolving,
    /// so fan-out parallelism tests can assert wall-clock bounds (§8).
    pub fn add_response_with_delay(
        &self,
        program: &str,
        args: &[&str],
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
        exit_code: i32,
        delay: Duration,
    ) {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.responses.lock().unwrap().insert(
            Self::key(program, &args),
            Programmed {
                stdout: stdout.into(),
                stderr: stderr.into(),
                exit_code,
                error: None,
                delay,
            },
        );
    }

    /// Program `program args...` to fail the runner call itself (as opposed
    /// to succeeding with a non-zero exit code).
    pub fn add_error(&self, program: &str, args: &[&str], message: impl Into<String>) {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.responses.lock().unwrap().insert(
            Self::key(program, &args),
            Programmed {
                stdout: Vec::new(),
                stderr: Vec::new(),
                exit_code: 0,
                error: Some(message.into()),
                delay: Duration::ZERO,
            },
        );
    }

    pub fn invocations(&self) -> Vec<MockInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Whether any recorded invocation of `program args...` was made in
    /// interactive mode.
    pub fn was_interactive(&self, program: &str, args: &[&str]) -> bool {
        self.invocations()
            .iter()
            .any(|inv| inv.program == program && inv.args == args && inv.interactive)
    }

    /// The extra-env seen by the most recent matching invocation, if any.
    pub fn extra_env_for(&self, program: &str, args: &[&str]) -> Option<Vec<(String, String)>> {
        self.invocations()
            .iter()
            .rev()
            .find(|inv| inv.program == program && inv.args == args)
            .map(|inv| inv.extra_env.clone())
    }

    async fn record_and_lookup(
        &self,
        program: &str,
        args: &[String],
        extra_env: &[(String, String)],
        interactive: bool,
    ) -> Result<Programmed> {
        self.invocations.lock().unwrap().push(MockInvocation {
            program: program.to_string(),
            args: args.to_vec(),
            extra_env: extra_env.to_vec(),
            interactive,
        });
        let programmed = self
            .responses
            .lock()
            .unwrap()
            .get(&Self::key(program, args))
            .cloned()
            .ok_or_else(|| {
                Error::General(format!(
                    "mock runner: no response programmed for `{program} {}`",
                    args.join(" ")
                ))
            })?;
        if !programmed.delay.is_zero() {
            tokio::time::sleep(programmed.delay).await;
        }
        if let Some(message) = &programmed.error {
            return Err(Error::General(message.clone()));
        }
        Ok(programmed)
    }
}

#[async_trait]
impl Runner for MockRunner {
    async fn run(
        &self,
        _ctx: &Context,
        program: &str,
        args: &[String],
        extra_env: &[(String, String)],
    ) -> Result<RunResult> {
        let programmed = self.record_and_lookup(program, args, extra_env, false).await?;
        Ok(RunResult {
            stdout: programmed.stdout,
            stderr: programmed.stderr,
            exit_code: programmed.exit_code,
            duration: programmed.delay,
        })
    }

    async fn run_interactive(
        &self,
        _ctx: &Context,
        program: &str,
        args: &[String],
        extra_env: &[(String, String)],
    ) -> Result<()> {
        let programmed = self.record_and_lookup(program, args, extra_env, true).await?;
        if programmed.exit_code == 0 {
            Ok(())
        } else {
            Err(Error::General(format!(
                "{program} exited with status {}",
                programmed.exit_code
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unprogrammed_lookup_names_the_command() {
        let mock = MockRunner::new();
        let ctx = Context::background();
        let err = mock.run(&ctx, "apt-get", &["update".into()], &[]).await.unwrap_err();
        assert!(err.to_string().contains("apt-get update"), "{err}");
    }

    #[tokio::test]
    async fn records_extra_env_and_interactive_flag() {
        let mock = MockRunner::new();
        mock.add_response("snap", &["install", "foo"], "", "", 0);
        let ctx = Context::background();
        mock.run_interactive(
            &ctx,
            "snap",
            &["install".into(), "foo".into()],
            &[("FOO".into(), "bar".into())],
        )
        .await
        .unwrap();
        assert!(mock.was_interactive("snap", &["install", "foo"]));
        assert_eq!(
            mock.extra_env_for("snap", &["install", "foo"]).unwrap(),
            vec![("FOO".to_string(), "bar".to_string())]
        );
    }

    #[tokio::test]
    async fn add_error_fails_the_call_not_just_the_exit_code() {
        let mock = MockRunner::new();
        mock.add_error("apt-get", &["update"], "network unreachable");
        let ctx = Context::background();
        let err = mock.run(&ctx, "apt-get", &["update".into()], &[]).await.unwrap_err();
        assert!(err.to_string().contains("network unreachable"));
    }
}
