/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Flatpak (`flatpak`) adapter.
//!
//! Exit-code contract (§4.5): poorly specified upstream; 0 = success,
//! non-zero = general-error, refined by stderr inspection where flatpak
//! happens to be specific enough to classify further.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::driver::{DriverBase, PackageDriver};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::record::{PackageRecord, PackageStatus};
use crate::runner::{Runner, RunResult};

pub struct FlatpakDriver {
    base: DriverBase,
}

impl FlatpakDriver {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self {
            base: DriverBase::new("flatpak", "app", crate::defaults::PRIORITY_FLATPAK, runner),
        }
    }

    fn classify_exit(&self, result: &RunResult) -> Option<Error> {
        if result.success() {
            return None;
        }
        let stderr = result.stderr_utf8();
        if stderr.contains("not installed") || stderr.contains("No such ref") || stderr.contains("not found") {
            return Some(Error::PackageNotFound(String::new()));
        }
        if stderr.contains("Permission denied") {
            return Some(Error::Permission(stderr.lines().next().unwrap_or("").to_string()));
        }
        Some(self.base.general_error_from(result))
    }

    async fn run_sub(&self, ctx: &Context, opts: &Options, mut args: Vec<String>) -> Result<RunResult> {
        args.extend(opts.custom_args.iter().cloned());
        let ctx = self.base.derive_context(ctx, opts);
        self.base.runner().run(&ctx, "flatpak", &args, &[]).await
    }
}

#[async_trait]
impl PackageDriver for FlatpakDriver {
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
        self.base.probe_version("flatpak").await
    }

    #[tracing::instrument(name = "flatpak::search", skip(self, ctx, opts), err)]
    async fn search(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["search".to_string(), "--".to_string()];
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_flatpak_tsv(&result.stdout_utf8(), self.name(), TsvKind::Search))
    }

    #[tracing::instrument(name = "flatpak::list_installed", skip(self, ctx, opts), err)]
    async fn list_installed(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let result = self
            .run_sub(ctx, opts, vec!["list".to_string(), "--app".to_string()])
            .await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_flatpak_tsv(&result.stdout_utf8(), self.name(), TsvKind::List))
    }

    #[tracing::instrument(name = "flatpak::list_upgradable", skip(self, ctx, opts), err)]
    async fn list_upgradable(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let result = self
            .run_sub(ctx, opts, vec!["remote-ls".to_string(), "--updates".to_string()])
            .await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        let mut records = parse_flatpak_tsv(&result.stdout_utf8(), self.name(), TsvKind::Updates);
        // `remote-ls --updates` only reports the candidate version; join
        // against `flatpak list --app`, which reports the installed one,
        // the same sibling-probe pattern yum's check-update/rpm join uses.
        let installed_ctx = self.base.derive_context(ctx, opts);
        if let Ok(installed) = self
            .base
            .runner()
            .run(&installed_ctx, "flatpak", &["list".to_string(), "--app".to_string()], &[])
            .await
        {
            if installed.success() {
                let installed = parse_flatpak_tsv(&installed.stdout_utf8(), self.name(), TsvKind::List);
                for record in &mut records {
                    if let Some(current) = installed.iter().find(|r| r.name == record.name) {
                        record.version = current.version.clone();
                    }
                }
            }
        }
        Ok(records)
    }

    #[tracing::instrument(name = "flatpak::install", skip(self, ctx, opts), err)]
    async fn install(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        if opts.dry_run {
            self.base.log_dry_run(opts, &format!("would install: {}", names.join(", ")));
            return Ok(Vec::new());
        }
        let mut args = vec!["install".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        args.push("--".to_string());
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_flatpak_transaction(&result.stdout_utf8(), self.name(), "Installing", PackageStatus::Installed))
    }

    #[tracing::instrument(name = "flatpak::remove", skip(self, ctx, opts), err)]
    async fn remove(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["uninstall".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        args.push("--".to_string());
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_flatpak_transaction(&result.stdout_utf8(), self.name(), "Uninstalling", PackageStatus::Available))
    }

    #[tracing::instrument(name = "flatpak::upgrade", skip(self, ctx, opts), err)]
    async fn upgrade(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        let mut args = vec!["update".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        if !names.is_empty() {
            args.push("--".to_string());
            args.extend(names.iter().cloned());
        }
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_flatpak_transaction(&result.stdout_utf8(), self.name(), "Updating", PackageStatus::Installed))
    }

    #[tracing::instrument(name = "flatpak::refresh", skip(self, ctx, opts), err)]
    async fn refresh(&self, ctx: &Context, opts: &Options) -> Result<()> {
        let result = self
            .run_sub(ctx, opts, vec!["update".to_string(), "--appstream".to_string()])
            .await?;
        match self.classify_exit(&result) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[tracing::instrument(name = "flatpak::info", skip(self, ctx, opts), err)]
    async fn info(&self, ctx: &Context, name: &str, opts: &Options) -> Result<PackageRecord> {
        self.base.validate_names(&[name])?;
        let result = self.run_sub(ctx, opts, vec!["info".to_string(), name.to_string()]).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(match err {
                Error::PackageNotFound(_) => Error::PackageNotFound(name.to_string()),
                other => other,
            });
        }
        parse_flatpak_info(&result.stdout_utf8(), self.name(), name)
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TsvKind {
    Search,
    List,
    Updates,
}

/// Parse flatpak's tab-separated listing formats. Column layout varies by
/// subcommand but the application ID and version are always present;
/// columns beyond those land in metadata.
fn parse_flatpak_tsv(output: &str, manager: &str, kind: TsvKind) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 2 {
            continue;
        }
        let (app_id, version) = match kind {
            TsvKind::Search => (cols.get(2).copied().unwrap_or(""), cols.get(3).copied().unwrap_or("")),
            TsvKind::List | TsvKind::Updates => (cols.get(1).copied().unwrap_or(""), cols.get(2).copied().unwrap_or("")),
        };
        if app_id.is_empty() {
            continue;
        }
        let status = match kind {
            TsvKind::Search => PackageStatus::Available,
            TsvKind::List => PackageStatus::Installed,
            TsvKind::Updates => PackageStatus::Upgradable,
        };
        let mut record = PackageRecord::new(app_id, manager, status);
        record.description = cols.first().copied().unwrap_or("").to_string();
        match status {
            PackageStatus::Installed => record.version = version.to_string(),
            PackageStatus::Upgradable => record.new_version = version.to_string(),
            _ => record.new_version = version.to_string(),
        }
        if let Some(branch) = cols.get(4) {
            record.metadata.insert("branch".to_string(), branch.to_string());
        }
        records.push(record);
    }
    records
}

/// Parse `flatpak install|uninstall|update` progress output, which reports
/// one `Verb app.id/arch/branch` line per affected ref.
fn parse_flatpak_transaction(output: &str, manager: &str, verb: &str, status: PackageStatus) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    let marker = format!("{verb} ");
    for line in output.lines() {
        let line = line.trim_end_matches('\r').trim();
        let Some(rest) = line.strip_prefix(&marker) else { continue };
        let app_id = rest.split('/').next().unwrap_or(rest).trim();
        if app_id.is_empty() {
            continue;
        }
        records.push(PackageRecord::new(app_id, manager, status));
    }
    records
}

/// Parse `flatpak info <id>` key-value stanza.
fn parse_flatpak_info(output: &str, manager: &str, fallback_name: &str) -> Option<PackageRecord> {
    let mut id = None;
    let mut version = None;
    for line in output.lines() {
        let line = line.trim();
        if let Some(v) = line.strip_prefix("ID:") {
            id = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("Version:") {
            version = Some(v.trim().to_string());
        }
    }
    let name = id.unwrap_or_else(|| fallback_name.to_string());
    let mut record = PackageRecord::new(name, manager, PackageStatus::Installed);
    record.version = version.unwrap_or_default();
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_tsv_parses_app_id_and_version() {
        let out = "Vi IMproved\tVi editor\torg.vim.Vim\t9.0\tstable\tflathub\n";
        let records = parse_flatpak_tsv(out, "flatpak", TsvKind::Search);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "org.vim.Vim");
        assert_eq!(records[0].new_version, "9.0");
        assert_eq!(records[0].status, PackageStatus::Available);
    }

    #[test]
    fn list_tsv_marks_installed_with_version() {
        let out = "Vi IMproved\torg.vim.Vim\t9.0\tstable\tsystem\n";
        let records = parse_flatpak_tsv(out, "flatpak", TsvKind::List);
        assert_eq!(records[0].status, PackageStatus::Installed);
        assert_eq!(records[0].version, "9.0");
    }

    #[test]
    fn transaction_parses_installing_line() {
        let out = "Installing org.vim.Vim/x86_64/stable\nInstalling org.vim.Vim.Locale/x86_64/stable\n";
        let records = parse_flatpak_transaction(out, "flatpak", "Installing", PackageStatus::Installed);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "org.vim.Vim");
    }

    #[tokio::test]
    async fn list_upgradable_backfills_installed_version_via_list_probe() {
        let mock = Arc::new(crate::runner::MockRunner::new());
        mock.add_response(
            "flatpak",
            &["remote-ls", "--updates"],
            "Vi IMproved\torg.vim.Vim\t9.1\tstable\tflathub\n",
            "",
            0,
        );
        mock.add_response(
            "flatpak",
            &["list", "--app"],
            "Vi IMproved\torg.vim.Vim\t9.0\tstable\tsystem\n",
            "",
            0,
        );
        let driver = FlatpakDriver::new(mock);
        let records = driver
            .list_upgradable(&Context::background(), &Options::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.status, PackageStatus::Upgradable);
        assert!(!r.version.is_empty(), "installed version must be backfilled");
        assert!(!r.new_version.is_empty());
        assert_ne!(r.version, r.new_version);
    }

    #[test]
    fn not_installed_classifies_as_package_not_found() {
        let result = RunResult {
            stdout: Vec::new(),
            stderr: b"error: App org.foo.Bar not installed\n".to_vec(),
            exit_code: 1,
            duration: Default::default(),
        };
        let driver = FlatpakDriver {
            base: DriverBase::new("flatpak", "app", 50, Arc::new(crate::runner::MockRunner::new())),
        };
        let err = driver.classify_exit(&result).unwrap();
        assert_eq!(err.category(), crate::status::StatusCategory::PackageNotFound);
    }
}
