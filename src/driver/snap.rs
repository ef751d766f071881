/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Snap (`snap`) adapter.
//!
//! Exit-code contract (§4.5): 0 = success; 64 = usage-error (POSIX
//! `EX_USAGE`); other non-zero = general-error, refined by stderr
//! inspection for the package-not-found and permission sentinels snapd
//! reports.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::driver::{DriverBase, PackageDriver};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::record::{PackageRecord, PackageStatus};
use crate::runner::{Runner, RunResult};

const EX_USAGE: i32 = 64;

pub struct SnapDriver {
    base: DriverBase,
}

impl SnapDriver {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self {
            base: DriverBase::new("snap", "app", crate::defaults::PRIORITY_SNAP, runner),
        }
    }

    fn classify_exit(&self, result: &RunResult) -> Option<Error> {
        if result.success() {
            return None;
        }
        let stderr = result.stderr_utf8();
        if stderr.contains("no snap found") || stderr.contains("not installed") {
            return Some(Error::PackageNotFound(String::new()));
        }
        if stderr.contains("access denied") || stderr.contains("permission denied") {
            return Some(Error::Permission(stderr.lines().next().unwrap_or("").to_string()));
        }
        if result.exit_code == EX_USAGE {
            return Some(Error::General(format!(
                "usage error: {}",
                stderr.lines().next().unwrap_or("")
            )));
        }
        Some(self.base.general_error_from(result))
    }

    async fn run_sub(&self, ctx: &Context, opts: &Options, mut args: Vec<String>) -> Result<RunResult> {
        args.extend(opts.custom_args.iter().cloned());
        let ctx = self.base.derive_context(ctx, opts);
        self.base.runner().run(&ctx, "snap", &args, &[]).await
    }
}

#[async_trait]
impl PackageDriver for SnapDriver {
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
        self.base.probe_version("snap").await
    }

    #[tracing::instrument(name = "snap::search", skip(self, ctx, opts), err)]
    async fn search(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["find".to_string(), "--".to_string()];
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_snap_table(&result.stdout_utf8(), self.name(), PackageStatus::Available))
    }

    #[tracing::instrument(name = "snap::list_installed", skip(self, ctx, opts), err)]
    async fn list_installed(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let result = self.run_sub(ctx, opts, vec!["list".to_string()]).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_snap_table(&result.stdout_utf8(), self.name(), PackageStatus::Installed))
    }

    #[tracing::instrument(name = "snap::list_upgradable", skip(self, ctx, opts), err)]
    async fn list_upgradable(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let result = self
            .run_sub(ctx, opts, vec!["refresh".to_string(), "--list".to_string()])
            .await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        let mut records = parse_snap_refresh_list(&result.stdout_utf8(), self.name());
        // `snap refresh --list` reports only the candidate version; join
        // against `snap list <name>` for the currently installed one, the
        // same sibling-probe pattern yum's check-update/rpm join uses.
        let probe_ctx = self.base.derive_context(ctx, opts);
        for record in &mut records {
            if let Ok(probe) = self
                .base
                .runner()
                .run(&probe_ctx, "snap", &["list".to_string(), record.name.clone()], &[])
                .await
            {
                if probe.success() {
                    if let Some(installed) = parse_snap_table(&probe.stdout_utf8(), self.name(), PackageStatus::Installed).into_iter().next() {
                        record.version = installed.version;
                    }
                }
            }
        }
        Ok(records)
    }

    #[tracing::instrument(name = "snap::install", skip(self, ctx, opts), err)]
    async fn install(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        if opts.dry_run {
            self.base.log_dry_run(opts, &format!("would install: {}", names.join(", ")));
            return Ok(Vec::new());
        }
        let mut args = vec!["install".to_string(), "--".to_string()];
        args.extend(names.iter().cloned());
        let result = if opts.interactive {
            self.base
                .runner()
                .run_interactive(&self.base.derive_context(ctx, opts), "snap", &args, &[])
                .await
                .map(|_| None)
        } else {
            self.run_sub(ctx, opts, args).await.map(Some)
        };
        match result {
            Ok(Some(result)) => {
                if let Some(err) = self.classify_exit(&result) {
                    return Err(err);
                }
                Ok(parse_snap_transaction(&result.stdout_utf8(), self.name(), "installed", PackageStatus::Installed))
            }
            Ok(None) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(name = "snap::remove", skip(self, ctx, opts), err)]
    async fn remove(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["remove".to_string(), "--".to_string()];
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_snap_transaction(&result.stdout_utf8(), self.name(), "removed", PackageStatus::Available))
    }

    #[tracing::instrument(name = "snap::upgrade", skip(self, ctx, opts), err)]
    async fn upgrade(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        let mut args = vec!["refresh".to_string()];
        if !names.is_empty() {
            args.push("--".to_string());
            args.extend(names.iter().cloned());
        }
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_snap_transaction(&result.stdout_utf8(), self.name(), "refreshed", PackageStatus::Installed))
    }

    #[tracing::instrument(name = "snap::refresh", skip(self, ctx, opts), err)]
    async fn refresh(&self, ctx: &Context, opts: &Options) -> Result<()> {
        // snapd refreshes its catalog automatically; there is no
        // metadata-only refresh subcommand distinct from `snap refresh`
        // (which also performs upgrades). Treat it as a no-op success.
        let _ = (ctx, opts);
        Ok(())
    }

    #[tracing::instrument(name = "snap::info", skip(self, ctx, opts), err)]
    async fn info(&self, ctx: &Context, name: &str, opts: &Options) -> Result<PackageRecord> {
        self.base.validate_names(&[name])?;
        let result = self.run_sub(ctx, opts, vec!["info".to_string(), name.to_string()]).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(match err {
                Error::PackageNotFound(_) => Error::PackageNotFound(name.to_string()),
                other => other,
            });
        }
        parse_snap_info(&result.stdout_utf8(), self.name()).ok_or_else(|| Error::PackageNotFound(name.to_string()))
    }
}

/// Parse a `snap find`/`snap list` table: header row then space-aligned
/// columns `Name Version ...`. Column boundaries are whitespace runs, which
/// is safe because snap names never contain spaces.
fn parse_snap_table(output: &str, manager: &str, status: PackageStatus) -> Vec<PackageRecord> {
    let mut lines = output.lines();
    let Some(header) = lines.next() else { return Vec::new() };
    if !header.trim_start().starts_with("Name") {
        return Vec::new();
    }
    let mut records = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else { continue };
        let version = fields.next().unwrap_or("").to_string();
        let mut record = PackageRecord::new(name, manager, status);
        match status {
            PackageStatus::Installed => record.version = version,
            _ => record.new_version = version,
        }
        records.push(record);
    }
    records
}

/// Parse `snap refresh --list` output (`Name Version Rev Size Publisher
/// Notes`). The table only reports the candidate version; `list_upgradable`
/// backfills the installed version via a `snap list <name>` probe per record.
fn parse_snap_refresh_list(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut lines = output.lines();
    let Some(header) = lines.next() else { return Vec::new() };
    if !header.trim_start().starts_with("Name") {
        return Vec::new();
    }
    let mut records = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else { continue };
        let Some(version) = fields.next() else { continue };
        let mut record = PackageRecord::new(name, manager, PackageStatus::Upgradable);
        record.new_version = version.to_string();
        records.push(record);
    }
    records
}

/// Parse `snap install|remove|refresh` summary lines, e.g.
/// `vim 9.0.1367 from Canonical✓ installed`.
fn parse_snap_transaction(output: &str, manager: &str, verb: &str, status: PackageStatus) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r').trim();
        if !line.ends_with(verb) {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else { continue };
        let version = fields.next().filter(|v| *v != "from").map(|v| v.to_string());
        let mut record = PackageRecord::new(name, manager, status);
        if status == PackageStatus::Installed {
            if let Some(version) = version {
                record.version = version;
            }
        }
        records.push(record);
    }
    records
}

/// Parse `snap info <name>` key-value stanza.
fn parse_snap_info(output: &str, manager: &str) -> Option<PackageRecord> {
    let mut name = None;
    let mut version = None;
    let mut summary = String::new();
    for line in output.lines() {
        if let Some(v) = line.strip_prefix("name:") {
            name = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("version:") {
            version = Some(v.split_whitespace().next().unwrap_or("").to_string());
        } else if let Some(v) = line.strip_prefix("summary:") {
            summary = v.trim().trim_matches('|').trim().to_string();
        }
    }
    let name = name?;
    let mut record = PackageRecord::new(name, manager, PackageStatus::Available);
    record.new_version = version.unwrap_or_default();
    record.description = summary;
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_table_yields_available_records() {
        let out = "Name  Version  Publisher       Notes  Summary\nvim   9.0      computerlyrik   -      Vi IMproved\n";
        let records = parse_snap_table(out, "snap", PackageStatus::Available);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "vim");
        assert_eq!(records[0].new_version, "9.0");
        assert_eq!(records[0].status, PackageStatus::Available);
    }

    #[test]
    fn list_table_yields_installed_records() {
        let out = "Name  Version  Rev   Tracking       Publisher     Notes\ncore  16-2.5   1234  latest/stable  canonical     -\n";
        let records = parse_snap_table(out, "snap", PackageStatus::Installed);
        assert_eq!(records[0].status, PackageStatus::Installed);
        assert_eq!(records[0].version, "16-2.5");
    }

    #[test]
    fn refresh_list_yields_upgradable_with_candidate() {
        let out = "Name  Version  Rev   Size   Publisher  Notes\ncore  16-2.6   1235  100MB  canonical  -\n";
        let records = parse_snap_refresh_list(out, "snap");
        assert_eq!(records[0].status, PackageStatus::Upgradable);
        assert_eq!(records[0].new_version, "16-2.6");
    }

    #[test]
    fn transaction_parses_installed_summary_line() {
        let out = "vim 9.0.1367 from Computer Lyrik installed\n";
        let records = parse_snap_transaction(out, "snap", "installed", PackageStatus::Installed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "vim");
    }

    #[tokio::test]
    async fn list_upgradable_backfills_installed_version_via_snap_list_probe() {
        let mock = Arc::new(crate::runner::MockRunner::new());
        mock.add_response(
            "snap",
            &["refresh", "--list"],
            "Name  Version  Rev   Size   Publisher  Notes\ncore  16-2.6   1235  100MB  canonical  -\n",
            "",
            0,
        );
        mock.add_response(
            "snap",
            &["list", "core"],
            "Name  Version  Rev   Tracking       Publisher     Notes\ncore  16-2.5   1234  latest/stable  canonical     -\n",
            "",
            0,
        );
        let driver = SnapDriver::new(mock);
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
    fn usage_error_exit_code_classified_as_general_with_usage_prefix() {
        let result = RunResult {
            stdout: Vec::new(),
            stderr: b"error: unknown command\n".to_vec(),
            exit_code: EX_USAGE,
            duration: Default::default(),
        };
        let driver = SnapDriver {
            base: DriverBase::new("snap", "app", 50, Arc::new(crate::runner::MockRunner::new())),
        };
        let err = driver.classify_exit(&result).unwrap();
        assert!(err.to_string().contains("usage error"));
    }
}
