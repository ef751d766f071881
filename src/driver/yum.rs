/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! RPM/YUM-family adapter (RHEL/CentOS/Rocky/Fedora: `yum`/`dnf`, `rpm`).
//!
//! Exit-code contract (§4.5): 0 = success; 1 = failure, classified further
//! by stderr substring; `yum check-update` uses 100 to mean "updates are
//! available", which is *not* an error.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::driver::{DriverBase, PackageDriver};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::record::{PackageRecord, PackageStatus};
use crate::runner::{Runner, RunResult};

pub struct YumDriver {
    base: DriverBase,
    /// `"yum"` on RHEL7/8-family hosts, `"dnf"` on Fedora/RHEL9+. Both tools
    /// accept the same subcommands and produce compatible output.
    binary: String,
}

impl YumDriver {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self::with_binary(runner, "yum")
    }

    pub fn with_binary(runner: Arc<dyn Runner>, binary: impl Into<String>) -> Self {
        Self {
            base: DriverBase::new("yum", "system", crate::defaults::PRIORITY_YUM, runner),
            binary: binary.into(),
        }
    }

    /// Classify a non-zero exit by the stderr substrings the tool is known
    /// to emit (§4.5). `check_update` gates the 100-means-updates-available
    /// carve-out, since 100 is general-error everywhere else in this family.
    fn classify_exit(&self, result: &RunResult, check_update: bool) -> Option<Error> {
        if result.success() {
            return None;
        }
        if check_update && result.exit_code == 100 {
            return None;
        }
        let stderr = result.stderr_utf8();
        if stderr.contains("No match for argument")
            || stderr.contains("Unable to find a match")
            || stderr.contains("No matching Packages to list")
        {
            return Some(Error::PackageNotFound(String::new()));
        }
        if stderr.contains("superuser privileges") {
            return Some(Error::Permission(stderr.lines().next().unwrap_or("").to_string()));
        }
        if stderr.contains("No Packages marked for removal") {
            return Some(Error::PackageNotFound(String::new()));
        }
        if stderr.contains("No such command") {
            return Some(Error::General(format!("usage error: {}", stderr.lines().next().unwrap_or(""))));
        }
        Some(self.base.general_error_from(result))
    }

    async fn run_sub(&self, ctx: &Context, opts: &Options, mut args: Vec<String>) -> Result<RunResult> {
        args.extend(opts.custom_args.iter().cloned());
        let ctx = self.base.derive_context(ctx, opts);
        self.base.runner().run(&ctx, &self.binary, &args, &[]).await
    }
}

#[async_trait]
impl PackageDriver for YumDriver {
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
        self.base.probe_version(&self.binary).await
    }

    #[tracing::instrument(name = "yum::search", skip(self, ctx, opts), err)]
    async fn search(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["search".to_string(), "--".to_string()];
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result, false) {
            return Err(err);
        }
        let mut records = parse_yum_search(&result.stdout_utf8(), self.name());
        if opts.show_status {
            // Per-package `rpm -q` probe to refine available vs installed
            // (§4.5). Partial failure demotes the enhancement to "basic"
            // and returns the unenhanced records — the primary search
            // still succeeded.
            let ctx = self.base.derive_context(ctx, opts);
            let mut enhancement_failed = false;
            for record in &mut records {
                match self
                    .base
                    .runner()
                    .run(&ctx, "rpm", &["-q".to_string(), record.name.clone()], &[])
                    .await
                {
                    Ok(probe) if probe.success() => {
                        let installed_version = parse_rpm_q_version(&probe.stdout_utf8());
                        if let Some(version) = installed_version {
                            record.status = PackageStatus::Installed;
                            record.version = version;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => {
                        enhancement_failed = true;
                        break;
                    }
                }
            }
            if enhancement_failed {
                return Ok(parse_yum_search(&result.stdout_utf8(), self.name()));
            }
        }
        Ok(records)
    }

    #[tracing::instrument(name = "yum::list_installed", skip(self, ctx, opts), err)]
    async fn list_installed(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let result = self.run_sub(ctx, opts, vec!["list".to_string(), "installed".to_string()]).await?;
        if let Some(err) = self.classify_exit(&result, false) {
            return Err(err);
        }
        Ok(parse_yum_list(&result.stdout_utf8(), self.name(), ListKind::Installed))
    }

    #[tracing::instrument(name = "yum::list_upgradable", skip(self, ctx, opts), err)]
    async fn list_upgradable(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let result = self.run_sub(ctx, opts, vec!["check-update".to_string()]).await?;
        if let Some(err) = self.classify_exit(&result, true) {
            return Err(err);
        }
        let mut records = parse_yum_check_update(&result.stdout_utf8(), self.name());
        // `check-update` only reports the candidate version; the currently
        // installed version comes from the same `rpm -q` sibling probe
        // `search`'s show-status enhancement uses (§4.5).
        let probe_ctx = self.base.derive_context(ctx, opts);
        for record in &mut records {
            if let Ok(probe) = self
                .base
                .runner()
                .run(&probe_ctx, "rpm", &["-q".to_string(), record.name.clone()], &[])
                .await
            {
                if probe.success() {
                    if let Some(version) = parse_rpm_q_version(&probe.stdout_utf8()) {
                        record.version = version;
                    }
                }
            }
        }
        Ok(records)
    }

    #[tracing::instrument(name = "yum::install", skip(self, ctx, opts), err)]
    async fn install(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["install".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        if opts.dry_run {
            args.push("--assumeno".to_string());
            self.base.log_dry_run(opts, &format!("would install: {}", names.join(", ")));
        }
        args.push("--".to_string());
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result, false) {
            return Err(err);
        }
        if opts.dry_run {
            return Ok(Vec::new());
        }
        Ok(parse_yum_transaction(&result.stdout_utf8(), self.name(), "Installed", PackageStatus::Installed))
    }

    #[tracing::instrument(name = "yum::remove", skip(self, ctx, opts), err)]
    async fn remove(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["remove".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        args.push("--".to_string());
        args.extend(names.iter().cloned());
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result, false) {
            return Err(err);
        }
        Ok(parse_yum_transaction(&result.stdout_utf8(), self.name(), "Removed", PackageStatus::Available))
    }

    #[tracing::instrument(name = "yum::upgrade", skip(self, ctx, opts), err)]
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
        if let Some(err) = self.classify_exit(&result, false) {
            return Err(err);
        }
        Ok(parse_yum_transaction(&result.stdout_utf8(), self.name(), "Upgraded", PackageStatus::Installed))
    }

    #[tracing::instrument(name = "yum::refresh", skip(self, ctx, opts), err)]
    async fn refresh(&self, ctx: &Context, opts: &Options) -> Result<()> {
        let result = self.run_sub(ctx, opts, vec!["makecache".to_string()]).await?;
        match self.classify_exit(&result, false) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[tracing::instrument(name = "yum::clean", skip(self, ctx, opts), err)]
    async fn clean(&self, ctx: &Context, opts: &Options) -> Result<()> {
        let result = self.run_sub(ctx, opts, vec!["clean".to_string(), "all".to_string()]).await?;
        match self.classify_exit(&result, false) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[tracing::instrument(name = "yum::auto_remove", skip(self, ctx, opts), err)]
    async fn auto_remove(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let mut args = vec!["autoremove".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result, false) {
            return Err(err);
        }
        Ok(parse_yum_transaction(&result.stdout_utf8(), self.name(), "Removed", PackageStatus::Available))
    }

    #[tracing::instrument(name = "yum::info", skip(self, ctx, opts), err)]
    async fn info(&self, ctx: &Context, name: &str, opts: &Options) -> Result<PackageRecord> {
        self.base.validate_names(&[name])?;
        let result = self.run_sub(ctx, opts, vec!["info".to_string(), name.to_string()]).await?;
        if let Some(err) = self.classify_exit(&result, false) {
            return Err(match err {
                Error::PackageNotFound(_) => Error::PackageNotFound(name.to_string()),
                other => other,
            });
        }
        parse_yum_info(&result.stdout_utf8(), self.name())
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Installed,
}

/// A name-version-release-epoch-architecture tuple, the RPM family's unit of
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nevra {
    pub name: String,
    pub epoch: Option<String>,
    pub version: String,
    pub release: String,
    pub arch: String,
}

/// Parse an RPM-style `name-[epoch:]version-release.arch` token.
///
/// Names may themselves contain dots and hyphens, so the architecture is
/// located first (the suffix after the final dot), then the remainder is
/// split by seeking the first hyphen-prefixed component whose leading run is
/// digits — that component starts the version (§4.5).
pub fn parse_nevra(token: &str) -> Option<Nevra> {
    let (rest, arch) = token.rsplit_once('.')?;
    if arch.is_empty() {
        return None;
    }
    let bytes = rest.as_bytes();
    let mut version_start = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'-' {
            let after = &rest[i + 1..];
            if after.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                version_start = Some(i);
                break;
            }
        }
        i += 1;
    }
    let version_start = version_start?;
    let name = rest[..version_start].to_string();
    let version_release = &rest[version_start + 1..];
    let (version_part, release) = version_release.rsplit_once('-')?;
    let (epoch, version) = match version_part.split_once(':') {
        Some((e, v)) => (Some(e.to_string()), v.to_string()),
        None => (None, version_part.to_string()),
    };
    Some(Nevra {
        name,
        epoch,
        version,
        release: release.to_string(),
        arch: arch.to_string(),
    })
}

fn nevra_to_record(nevra: &Nevra, manager: &str, status: PackageStatus) -> PackageRecord {
    let mut record = PackageRecord::new(nevra.name.clone(), manager, status);
    record.metadata.insert("arch".to_string(), nevra.arch.clone());
    record.metadata.insert("release".to_string(), nevra.release.clone());
    if let Some(epoch) = &nevra.epoch {
        record.metadata.insert("epoch".to_string(), epoch.clone());
    }
    record
}

/// Parse `yum list installed` output: `Installed Packages` header followed
/// by `name.arch   version   repo` rows.
fn parse_yum_list(output: &str, manager: &str, _kind: ListKind) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    let mut in_section = false;
    for line in normalized_lines(output) {
        if line.trim() == "Installed Packages" {
            in_section = true;
            continue;
        }
        if !in_section || line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(name_arch) = fields.next() else { continue };
        let Some(version) = fields.next() else { continue };
        let (name, arch) = name_arch.rsplit_once('.').unwrap_or((name_arch, ""));
        let mut record = PackageRecord::new(name, manager, PackageStatus::Installed);
        record.version = version.to_string();
        record.metadata.insert("arch".to_string(), arch.to_string());
        records.push(record);
    }
    records
}

/// Parse `yum check-update` output: blank-line-preceded rows of
/// `name.arch   version   repo`, one per upgradable package.
fn parse_yum_check_update(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in normalized_lines(output) {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Last metadata") || line.starts_with("Obsoleting") {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(name_arch) = fields.next() else { continue };
        let Some(version) = fields.next() else { continue };
        if fields.next().is_none() {
            continue;
        }
        let (name, arch) = name_arch.rsplit_once('.').unwrap_or((name_arch, ""));
        let mut record = PackageRecord::new(name, manager, PackageStatus::Upgradable);
        record.new_version = version.to_string();
        record.metadata.insert("arch".to_string(), arch.to_string());
        records.push(record);
    }
    records
}

/// Parse `yum search` output: `name.arch : summary` rows under
/// `=== ... Matched: ... ===` section headers. `No matches found.` yields no
/// records and is not an error (§4.5, §8 scenario 2).
fn parse_yum_search(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in normalized_lines(output) {
        if !line.contains(" : ") || line.starts_with('=') {
            continue;
        }
        let (name_arch, summary) = line.split_once(" : ").unwrap();
        let (name, arch) = name_arch.trim().rsplit_once('.').unwrap_or((name_arch.trim(), ""));
        let mut record = PackageRecord::new(name, manager, PackageStatus::Available);
        record.description = summary.trim().to_string();
        record.metadata.insert("arch".to_string(), arch.to_string());
        records.push(record);
    }
    records
}

/// Parse the `rpm -q <name>` single-line NEVRA response into just the
/// installed version (epoch:version-release folded per §3's rule that
/// `version` is a plain comparable string).
fn parse_rpm_q_version(output: &str) -> Option<String> {
    let token = output.trim().lines().next()?;
    let nevra = parse_nevra(token)?;
    Some(match nevra.epoch {
        Some(epoch) => format!("{epoch}:{}-{}", nevra.version, nevra.release),
        None => format!("{}-{}", nevra.version, nevra.release),
    })
}

/// Parse the final transaction summary block of `yum install|remove|update
/// -y`, which lists one NEVRA token per acted-upon package under a
/// `verb_heading` section, e.g.:
/// ```text
/// Installed:
///   vim-enhanced-2:8.0.1763-19.el8.x86_64
/// ```
fn parse_yum_transaction(output: &str, manager: &str, heading: &str, status: PackageStatus) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    let mut in_section = false;
    for line in normalized_lines(output) {
        let trimmed = line.trim();
        if trimmed == format!("{heading}:") {
            in_section = true;
            continue;
        }
        if trimmed.is_empty() {
            if in_section {
                in_section = false;
            }
            continue;
        }
        if !in_section {
            continue;
        }
        for token in trimmed.split_whitespace() {
            if let Some(nevra) = parse_nevra(token) {
                records.push(nevra_to_record(&nevra, manager, status));
            }
        }
    }
    records
}

/// Parse `yum info <name>` output's single package stanza.
fn parse_yum_info(output: &str, manager: &str) -> Option<PackageRecord> {
    let mut name = None;
    let mut version = None;
    let mut release = None;
    let mut arch = None;
    let mut description = String::new();
    let mut in_description = false;
    for line in normalized_lines(output) {
        if let Some(v) = line.strip_prefix("Name").and_then(|r| r.trim_start().strip_prefix(": ")) {
            name = Some(v.trim().to_string());
            in_description = false;
        } else if let Some(v) = line.strip_prefix("Version").and_then(|r| r.trim_start().strip_prefix(": ")) {
            version = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("Release").and_then(|r| r.trim_start().strip_prefix(": ")) {
            release = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("Architecture").and_then(|r| r.trim_start().strip_prefix(": ")) {
            arch = Some(v.trim().to_string());
        } else if line.starts_with("Description") {
            in_description = true;
        } else if in_description && !line.trim().is_empty() {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(line.trim());
        }
    }
    let name = name?;
    let mut record = PackageRecord::new(name, manager, PackageStatus::Available);
    record.new_version = match (&version, &release) {
        (Some(v), Some(r)) => format!("{v}-{r}"),
        (Some(v), None) => v.clone(),
        _ => String::new(),
    };
    record.description = description;
    if let Some(arch) = arch {
        record.metadata.insert("arch".to_string(), arch);
    }
    Some(record)
}

fn normalized_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(|l| l.trim_end_matches('\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_NOTFOUND: &str =
        include_str!("../../fixtures/search-zzz9999nonexistent.clean-system.rocky-8.txt");
    const INFO_NOTFOUND: &str = include_str!("../../fixtures/info-zzz9999nonexistent.clean-system.rocky-8.txt");

    #[test]
    fn nevra_handles_dotted_and_hyphenated_names() {
        let n = parse_nevra("gcc-c++-8.5.0-18.el8.x86_64").unwrap();
        assert_eq!(n.name, "gcc-c++");
        assert_eq!(n.version, "8.5.0");
        assert_eq!(n.release, "18.el8");
        assert_eq!(n.arch, "x86_64");
        assert_eq!(n.epoch, None);
    }

    #[test]
    fn nevra_handles_epoch() {
        let n = parse_nevra("vim-enhanced-2:8.0.1763-19.el8.x86_64").unwrap();
        assert_eq!(n.name, "vim-enhanced");
        assert_eq!(n.epoch.as_deref(), Some("2"));
        assert_eq!(n.version, "8.0.1763");
        assert_eq!(n.release, "19.el8");
        assert_eq!(n.arch, "x86_64");
    }

    #[test]
    fn search_for_nonexistent_package_yields_empty_not_error() {
        let records = parse_yum_search(SEARCH_NOTFOUND, "yum");
        assert!(records.is_empty());
    }

    #[test]
    fn info_for_nonexistent_package_is_classified_not_found() {
        let result = RunResult {
            stdout: Vec::new(),
            stderr: INFO_NOTFOUND.as_bytes().to_vec(),
            exit_code: 1,
            duration: Default::default(),
        };
        let driver = YumDriver {
            base: DriverBase::new("yum", "system", 80, Arc::new(crate::runner::MockRunner::new())),
            binary: "yum".to_string(),
        };
        let err = driver.classify_exit(&result, false).unwrap();
        assert_eq!(err.category(), crate::status::StatusCategory::PackageNotFound);
    }

    #[test]
    fn transaction_parses_installed_section() {
        let out = "\nInstalled:\n  vim-enhanced-2:8.0.1763-19.el8.x86_64\n\nComplete!\n";
        let records = parse_yum_transaction(out, "yum", "Installed", PackageStatus::Installed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "vim-enhanced");
        assert_eq!(records[0].status, PackageStatus::Installed);
    }

    #[test]
    fn list_installed_parses_rows_under_header() {
        let out = "Installed Packages\nvim-enhanced.x86_64     2:8.0.1763-19.el8     @anaconda\n";
        let records = parse_yum_list(out, "yum", ListKind::Installed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "vim-enhanced");
        assert_eq!(records[0].status, PackageStatus::Installed);
    }

    #[test]
    fn check_update_parses_candidate_version_from_tool_output() {
        let out = "vim-enhanced.x86_64    2:8.2.2637-20.el8_5.3    updates\n";
        let records = parse_yum_check_update(out, "yum");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PackageStatus::Upgradable);
        assert!(!records[0].new_version.is_empty());
    }

    #[tokio::test]
    async fn list_upgradable_backfills_installed_version_via_rpm_probe() {
        let mock = Arc::new(crate::runner::MockRunner::new());
        mock.add_response(
            "yum",
            &["check-update"],
            "vim-enhanced.x86_64    2:8.2.2637-20.el8_5.3    updates\n",
            "",
            0,
        );
        mock.add_response(
            "rpm",
            &["-q", "vim-enhanced"],
            "vim-enhanced-2:8.0.1763-19.el8.x86_64\n",
            "",
            0,
        );
        let driver = YumDriver::new(mock);
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
}
