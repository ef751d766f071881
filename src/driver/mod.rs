/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The unified driver contract (§4.4, §4.5) and the adapters that implement
//! it for each package-management tool.

pub mod apk;
pub mod apt;
pub mod flatpak;
pub mod snap;
pub mod yum;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::Context;
use crate::defaults::DEFAULT_TIMEOUT;
use crate::error::{Error, Result};
use crate::logger::{default_logger, Logger};
use crate::options::Options;
use crate::record::{ManagerStatus, PackageRecord};
use crate::runner::{Runner, RunResult};
use crate::validate::validate_package_names;

/// The capability set every driver implements (§4.4). Operations a driver
/// doesn't support keep the default body, which returns
/// [`Error::NotSupported`] — a half-implemented driver is still usable for
/// whatever it does support.
#[async_trait]
pub trait PackageDriver: Send + Sync {
    /// Stable registry key, e.g. `"apt"`, `"yum"`, `"snap"`.
    fn name(&self) -> &str;

    /// Driver class used for best-match selection (§4.6), e.g. `"system"`,
    /// `"app"`.
    fn category(&self) -> &str;

    /// Static priority declared at registration time; within a category the
    /// highest wins (§4.6).
    fn priority(&self) -> i32;

    /// Whether the underlying tool is present and usable right now.
    async fn is_available(&self) -> bool;

    async fn search(&self, _ctx: &Context, _names: &[String], _opts: &Options) -> Result<Vec<PackageRecord>> {
        Err(self.not_supported("search"))
    }

    async fn list_installed(&self, _ctx: &Context, _opts: &Options) -> Result<Vec<PackageRecord>> {
        Err(self.not_supported("list_installed"))
    }

    async fn list_upgradable(&self, _ctx: &Context, _opts: &Options) -> Result<Vec<PackageRecord>> {
        Err(self.not_supported("list_upgradable"))
    }

    async fn install(&self, _ctx: &Context, _names: &[String], _opts: &Options) -> Result<Vec<PackageRecord>> {
        Err(self.not_supported("install"))
    }

    async fn remove(&self, _ctx: &Context, _names: &[String], _opts: &Options) -> Result<Vec<PackageRecord>> {
        Err(self.not_supported("remove"))
    }

    /// Upgrade the named packages, or every upgradable package if `names` is
    /// empty.
    async fn upgrade(&self, _ctx: &Context, _names: &[String], _opts: &Options) -> Result<Vec<PackageRecord>> {
        Err(self.not_supported("upgrade"))
    }

    /// Refresh the tool's package metadata cache.
    async fn refresh(&self, _ctx: &Context, _opts: &Options) -> Result<()> {
        Err(self.not_supported("refresh"))
    }

    /// Clean the tool's local cache. Tools without a cache concept keep the
    /// default no-op (§4.4).
    async fn clean(&self, _ctx: &Context, _opts: &Options) -> Result<()> {
        Ok(())
    }

    async fn auto_remove(&self, _ctx: &Context, _opts: &Options) -> Result<Vec<PackageRecord>> {
        Err(self.not_supported("auto_remove"))
    }

    async fn verify(&self, _ctx: &Context, _names: &[String], _opts: &Options) -> Result<Vec<PackageRecord>> {
        Err(self.not_supported("verify"))
    }

    /// Full detail on a single package; a non-existent package must yield
    /// [`Error::PackageNotFound`] (§4.5).
    async fn info(&self, _ctx: &Context, _name: &str, _opts: &Options) -> Result<PackageRecord> {
        Err(self.not_supported("info"))
    }

    /// Snapshot of availability, health, and cache state. The default
    /// reports availability only; drivers refine with repo-cache
    /// statistics (§4.4).
    async fn status(&self, _ctx: &Context, _opts: &Options) -> Result<ManagerStatus> {
        let available = self.is_available().await;
        Ok(ManagerStatus {
            manager: self.name().to_string(),
            available,
            healthy: available,
            version: String::new(),
            last_refresh: String::new(),
            cache_size_bytes: 0,
            total_packages: 0,
            installed_packages: 0,
            issues: if available {
                Vec::new()
            } else {
                vec![format!("{} is not available on this host", self.name())]
            },
            metadata: Default::default(),
        })
    }

    /// Convenience for the default method bodies above; also usable by
    /// adapters that partially implement an operation family.
    fn not_supported(&self, op: &'static str) -> Error {
        Error::NotSupported {
            driver: self.name().to_string(),
            op,
        }
    }
}

/// Shared scaffolding every adapter embeds as a field and delegates to
/// (§4.4). Composition, not inheritance: an adapter is a struct with a
/// `base: DriverBase` plus whatever tool-specific state it needs.
pub struct DriverBase {
    name: String,
    category: String,
    priority: i32,
    runner: Arc<dyn Runner>,
    logger: Arc<dyn Logger>,
    default_timeout: Duration,
}

impl DriverBase {
    pub fn new(name: impl Into<String>, category: impl Into<String>, priority: i32, runner: Arc<dyn Runner>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            priority,
            runner,
            logger: default_logger(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn runner(&self) -> &Arc<dyn Runner> {
        &self.runner
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Timeout to apply for this call: the caller's [`Options::timeout`] if
    /// set, else this driver's configured default (§3, §4.4).
    pub fn derive_timeout(&self, opts: &Options) -> Duration {
        opts.timeout.unwrap_or(self.default_timeout)
    }

    /// Derive a child context bounded by this call's effective timeout
    /// (§4.1, §5).
    pub fn derive_context(&self, ctx: &Context, opts: &Options) -> Context {
        ctx.with_timeout(self.derive_timeout(opts))
    }

    pub fn validate_names<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        validate_package_names(names)
    }

    pub fn log_dry_run(&self, opts: &Options, message: &str) {
        if opts.dry_run {
            self.logger.info(&format!("[dry-run] {message}"));
        }
    }

    pub fn log_verbose(&self, opts: &Options, message: &str) {
        if opts.verbose && !opts.quiet {
            self.logger.info(message);
        }
    }

    pub fn log_debug(&self, opts: &Options, message: &str) {
        if opts.debug && !opts.quiet {
            self.logger.debug(message);
        }
    }

    /// Default `is_available` (§4.4): probe `--version`, falling back to
    /// `--help`. A driver overrides this when its tool needs something
    /// different (e.g. checking a daemon socket for snapd).
    pub async fn probe_version(&self, binary: &str) -> bool {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        for flag in ["--version", "--help"] {
            if let Ok(result) = self.runner.run(&ctx, binary, &[flag.to_string()], &[]).await {
                if result.success() {
                    return true;
                }
            }
        }
        false
    }

    /// Fold a non-zero exit's stderr into a [`Error::General`], stripping
    /// the usual tool prefixes (§7). Adapters call this once they've ruled
    /// out every sentinel condition they recognize.
    pub fn general_error_from(&self, result: &RunResult) -> Error {
        let stderr = result.stderr_utf8();
        let first_line = stderr.lines().next().unwrap_or("");
        let stripped = crate::error::strip_stderr_prefix(first_line);
        if stripped.is_empty() {
            Error::General(format!(
                "{} exited with status {}",
                self.name, result.exit_code
            ))
        } else {
            Error::General(format!(
                "{} exited with status {}: {}",
                self.name, result.exit_code, stripped
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MockRunner;

    struct StubDriver {
        base: DriverBase,
    }

    #[async_trait]
    impl PackageDriver for StubDriver {
        fn name(&self) -> &str {
            self.base.name()
        }
        fn category(&self) -> &str {
            self.base.category()
        }
        fn priority(&self) -> i32 {
            self.base.priority()
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn unimplemented_operations_report_not_supported() {
        let driver = StubDriver {
            base: DriverBase::new("stub", "system", 10, Arc::new(MockRunner::new())),
        };
        let ctx = Context::background();
        let opts = Options::default();
        let err = driver.search(&ctx, &[], &opts).await.unwrap_err();
        assert_eq!(err.category(), crate::status::StatusCategory::OperationNotSupported);
        assert!(driver.clean(&ctx, &opts).await.is_ok());
    }

    #[tokio::test]
    async fn default_status_reflects_availability() {
        let driver = StubDriver {
            base: DriverBase::new("stub", "system", 10, Arc::new(MockRunner::new())),
        };
        let status = driver.status(&Context::background(), &Options::default()).await.unwrap();
        assert!(status.available);
        assert!(status.healthy);
        assert!(status.issues.is_empty());
    }
}
