/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Alpine (`apk`) adapter.
//!
//! Exit-code contract (§4.5, refined for apk): 0 = success; 1 = general
//! failure, with stderr inspected for the well-known `ERROR:` sentinels
//! apk emits for missing packages and permission failures.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::driver::{DriverBase, PackageDriver};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::record::{PackageRecord, PackageStatus};
use crate::runner::{Runner, RunResult};

pub struct ApkDriver {
    base: DriverBase,
}

impl ApkDriver {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self {
            base: DriverBase::new("apk", "system", crate::defaults::PRIORITY_APK, runner),
        }
    }

    fn classify_exit(&self, result: &RunResult) -> Option<Error> {
        if result.success() {
            return None;
        }
        let stderr = result.stderr_utf8();
        if stderr.contains("is not available") || stderr.contains("unsatisfiable constraints") {
            return Some(Error::PackageNotFound(String::new()));
        }
        if stderr.contains("Permission denied") || stderr.contains("you cannot perform this operation") {
            return Some(Error::Permission(stderr.lines().next().unwrap_or("").to_string()));
        }
        Some(self.base.general_error_from(result))
    }

    async fn run_sub(&self, ctx: &Context, opts: &Options, mut args: Vec<String>) -> Result<RunResult> {
        args.extend(opts.custom_args.iter().cloned());
        let ctx = self.base.derive_context(ctx, opts);
        self.base.runner().run(&ctx, "apk", &args, &[]).await
    }
}

#[async_trait]
impl PackageDriver for ApkDriver {
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
        self.base.probe_version("apk").await
    }

    #[tracing::instrument(name = "apk::search", skip(self, ctx, opts), err)]
    async fn search(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["search".to_string(), "-v".to_string(), "--".to_string()];
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_apk_search(&result.stdout_utf8(), self.name()))
    }

    #[tracing::instrument(name = "apk::list_installed", skip(self, ctx, opts), err)]
    async fn list_installed(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let result = self
            .run_sub(ctx, opts, vec!["list".to_string(), "--installed".to_string()])
            .await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_apk_list(&result.stdout_utf8(), self.name()))
    }

    #[tracing::instrument(name = "apk::list_upgradable", skip(self, ctx, opts), err)]
    async fn list_upgradable(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let result = self
            .run_sub(ctx, opts, vec!["list".to_string(), "--upgradable".to_string()])
            .await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_apk_upgradable(&result.stdout_utf8(), self.name()))
    }

    #[tracing::instrument(name = "apk::install", skip(self, ctx, opts), err)]
    async fn install(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["add".to_string()];
        if opts.dry_run {
            args.push("--simulate".to_string());
            self.base.log_dry_run(opts, &format!("would install: {}", names.join(", ")));
        }
        if opts.quiet {
            args.push("-q".to_string());
        }
        args.push("--".to_string());
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        if opts.dry_run {
            return Ok(Vec::new());
        }
        Ok(parse_apk_transaction(&result.stdout_utf8(), self.name(), "Installing", PackageStatus::Installed))
    }

    #[tracing::instrument(name = "apk::remove", skip(self, ctx, opts), err)]
    async fn remove(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["del".to_string(), "--".to_string()];
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_apk_transaction(&result.stdout_utf8(), self.name(), "Purging", PackageStatus::Available))
    }

    #[tracing::instrument(name = "apk::upgrade", skip(self, ctx, opts), err)]
    async fn upgrade(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        let mut args = vec!["upgrade".to_string()];
        if !names.is_empty() {
            args.push("--".to_string());
            args.extend(names.iter().cloned());
        }
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_apk_transaction(&result.stdout_utf8(), self.name(), "Upgrading", PackageStatus::Installed))
    }

    #[tracing::instrument(name = "apk::refresh", skip(self, ctx, opts), err)]
    async fn refresh(&self, ctx: &Context, opts: &Options) -> Result<()> {
        let result = self.run_sub(ctx, opts, vec!["update".to_string()]).await?;
        match self.classify_exit(&result) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[tracing::instrument(name = "apk::clean", skip(self, ctx, opts), err)]
    async fn clean(&self, ctx: &Context, opts: &Options) -> Result<()> {
        let result = self.run_sub(ctx, opts, vec!["cache".to_string(), "clean".to_string()]).await?;
        match self.classify_exit(&result) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[tracing::instrument(name = "apk::info", skip(self, ctx, opts), err)]
    async fn info(&self, ctx: &Context, name: &str, opts: &Options) -> Result<PackageRecord> {
        self.base.validate_names(&[name])?;
        let result = self
            .run_sub(ctx, opts, vec!["info".to_string(), "-a".to_string(), name.to_string()])
            .await?;
        if result.stdout_utf8().trim().is_empty() {
            return Err(Error::PackageNotFound(name.to_string()));
        }
        if let Some(err) = self.classify_exit(&result) {
            return Err(match err {
                Error::PackageNotFound(_) => Error::PackageNotFound(name.to_string()),
                other => other,
            });
        }
        parse_apk_info(&result.stdout_utf8(), self.name()).ok_or_else(|| Error::PackageNotFound(name.to_string()))
    }
}

/// Split a `name-version-release` token on the last two hyphens, apk's
/// package-version convention (no architecture embedded; `apk search -v`
/// and `list` report architecture separately or not at all).
fn split_apk_nvr(token: &str) -> (String, String) {
    let parts: Vec<&str> = token.rsplitn(3, '-').collect();
    if parts.len() == 3 {
        (parts[2].to_string(), format!("{}-{}", parts[1], parts[0]))
    } else {
        (token.to_string(), String::new())
    }
}

/// Parse `apk search -v` output: `name-version description` lines.
fn parse_apk_search(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let (token, description) = match line.split_once(' ') {
            Some((t, d)) => (t, d.trim_start_matches('-').trim()),
            None => (line, ""),
        };
        let (name, version) = split_apk_nvr(token);
        let mut record = PackageRecord::new(name, manager, PackageStatus::Available);
        record.new_version = version;
        record.description = description.to_string();
        records.push(record);
    }
    records
}

/// Parse `apk list --installed` output:
/// `name-version arch {origin} (license) [installed]`.
fn parse_apk_list(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let Some(token) = line.split_whitespace().next() else { continue };
        let (name, version) = split_apk_nvr(token);
        let mut record = PackageRecord::new(name, manager, PackageStatus::Installed);
        record.version = version;
        if let Some(arch) = line.split_whitespace().nth(1) {
            record.metadata.insert("arch".to_string(), arch.to_string());
        }
        records.push(record);
    }
    records
}

/// Parse `apk list --upgradable` output: same shape as `--installed`, but
/// also the `-> newversion` suffix apk appends.
fn parse_apk_upgradable(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let Some(token) = line.split_whitespace().next() else { continue };
        let (name, version) = split_apk_nvr(token);
        let mut record = PackageRecord::new(name, manager, PackageStatus::Upgradable);
        record.version = version;
        if let Some(idx) = line.find("-> ") {
            record.new_version = line[idx + 3..].split_whitespace().next().unwrap_or("").to_string();
        }
        records.push(record);
    }
    records
}

/// Parse `apk add`/`del`/`upgrade` transaction output: numbered
/// `(i/n) Verb name (version)` progress lines.
fn parse_apk_transaction(output: &str, manager: &str, verb: &str, status: PackageStatus) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    let marker = format!("{verb} ");
    for line in output.lines() {
        let line = line.trim_end_matches('\r').trim();
        let Some(idx) = line.find(&marker) else { continue };
        let rest = &line[idx + marker.len()..];
        let (name, version) = match rest.split_once(" (") {
            Some((n, v)) => (n.trim().to_string(), v.trim_end_matches(')').to_string()),
            None => (rest.trim().to_string(), String::new()),
        };
        let mut record = PackageRecord::new(name, manager, status);
        if status == PackageStatus::Installed {
            record.version = version;
        }
        records.push(record);
    }
    records
}

/// Parse `apk info -a <name>` verbose stanza into one record.
fn parse_apk_info(output: &str, manager: &str) -> Option<PackageRecord> {
    let header = output.lines().next()?.trim();
    let token = header.trim_start_matches('_').trim_end_matches(':').trim();
    if token.is_empty() {
        return None;
    }
    let (name, version) = split_apk_nvr(token);
    let mut record = PackageRecord::new(name, manager, PackageStatus::Available);
    record.new_version = version;
    for line in output.lines().skip(1) {
        let line = line.trim();
        if !line.is_empty() && !line.ends_with(':') && record.description.is_empty() {
            record.description = line.to_string();
        }
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_name_version_release() {
        let (name, version) = split_apk_nvr("vim-9.0.1367-r0");
        assert_eq!(name, "vim");
        assert_eq!(version, "9.0.1367-r0");
    }

    #[test]
    fn search_parses_version_and_description() {
        let out = "vim-9.0.1367-r0 - Vi IMproved - enhanced vi editor\nvim-doc-9.0.1367-r0 - Documentation for vim\n";
        let records = parse_apk_search(out, "apk");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "vim");
        assert_eq!(records[0].new_version, "9.0.1367-r0");
        assert!(records[0].description.contains("enhanced vi editor"));
    }

    #[test]
    fn list_installed_sets_version_and_status() {
        let out = "vim-9.0.1367-r0 x86_64 {vim} (GPL2) [installed]\n";
        let records = parse_apk_list(out, "apk");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PackageStatus::Installed);
        assert_eq!(records[0].version, "9.0.1367-r0");
    }

    #[test]
    fn upgradable_captures_both_versions() {
        let out = "vim-9.0.1367-r0 x86_64 {vim} (GPL2) [installed] -> 9.0.1400-r0\n";
        let records = parse_apk_upgradable(out, "apk");
        assert_eq!(records[0].version, "9.0.1367-r0");
        assert_eq!(records[0].new_version, "9.0.1400-r0");
    }

    #[test]
    fn transaction_parses_installing_lines() {
        let out = "(1/1) Installing vim (9.0.1367-r0)\nOK: 45 MiB in 60 packages\n";
        let records = parse_apk_transaction(out, "apk", "Installing", PackageStatus::Installed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "vim");
        assert_eq!(records[0].version, "9.0.1367-r0");
    }

    #[test]
    fn not_available_classifies_as_package_not_found() {
        let result = RunResult {
            stdout: Vec::new(),
            stderr: b"ERROR: unsatisfiable constraints:\n  zzz9999nonexistent (no such package):\n    required by: world[zzz9999nonexistent]\n".to_vec(),
            exit_code: 1,
            duration: Default::default(),
        };
        let driver = ApkDriver {
            base: DriverBase::new("apk", "system", 80, Arc::new(crate::runner::MockRunner::new())),
        };
        let err = driver.classify_exit(&result).unwrap();
        assert_eq!(err.category(), crate::status::StatusCategory::PackageNotFound);
    }
}
