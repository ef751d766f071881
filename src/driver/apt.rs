/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! APT-family adapter (Debian/Ubuntu: `apt`, `apt-cache`, `apt-get`).
//!
//! Exit-code contract (§4.5): 0 = success; 100 = locked/network/user-abort
//! (general-error); any other non-zero = general-error. `apt search`
//! returns 0 even when nothing matches.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::driver::{DriverBase, PackageDriver};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::record::{PackageRecord, PackageStatus};
use crate::runner::{Runner, RunResult};

pub struct AptDriver {
    base: DriverBase,
}

impl AptDriver {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self {
            base: DriverBase::new("apt", "system", crate::defaults::PRIORITY_APT, runner),
        }
    }

    fn env_for(opts: &Options) -> Vec<(String, String)> {
        let mut env = vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())];
        if opts.assume_yes {
            env.push(("APT_LISTCHANGES_FRONTEND".to_string(), "none".to_string()));
        }
        env
    }

    fn classify_exit(&self, result: &RunResult) -> Option<Error> {
        if result.success() {
            return None;
        }
        // 100 covers lock contention, network failure, and user abort —
        // none of which are more specifically nameable than general-error
        // (§4.5).
        Some(self.base.general_error_from(result))
    }

    async fn run_sub(&self, ctx: &Context, opts: &Options, mut args: Vec<String>) -> Result<RunResult> {
        args.extend(opts.custom_args.iter().cloned());
        let ctx = self.base.derive_context(ctx, opts);
        self.base.runner().run(&ctx, "apt-get", &args, &Self::env_for(opts)).await
    }
}

#[async_trait]
impl PackageDriver for AptDriver {
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
        self.base.probe_version("apt-get").await
    }

    #[tracing::instrument(name = "apt::search", skip(self, ctx, opts), err)]
    async fn search(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let query = names.join(" ");
        let mut args = vec!["search".to_string()];
        args.extend(opts.custom_args.iter().cloned());
        args.push(query);
        let ctx = self.base.derive_context(ctx, opts);
        let result = self.base.runner().run(&ctx, "apt", &args, &[]).await?;
        if !result.success() {
            return Err(self.base.general_error_from(&result));
        }
        let mut records = parse_apt_search(&result.stdout_utf8(), self.name());
        if opts.show_status {
            for record in &mut records {
                if record.status == PackageStatus::Available {
                    if let Ok(info) = self.info(&ctx, &record.name, opts).await {
                        if info.status == PackageStatus::Installed {
                            record.status = PackageStatus::Installed;
                            record.version = info.version;
                        }
                    }
                }
            }
        }
        Ok(records)
    }

    #[tracing::instrument(name = "apt::list_installed", skip(self, ctx, opts), err)]
    async fn list_installed(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let ctx = self.base.derive_context(ctx, opts);
        let result = self.base.runner().run(&ctx, "apt", &["list".into(), "--installed".into()], &[]).await?;
        if !result.success() {
            return Err(self.base.general_error_from(&result));
        }
        Ok(parse_apt_list(&result.stdout_utf8(), self.name(), ListKind::Installed))
    }

    #[tracing::instrument(name = "apt::list_upgradable", skip(self, ctx, opts), err)]
    async fn list_upgradable(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let ctx = self.base.derive_context(ctx, opts);
        let result = self.base.runner().run(&ctx, "apt", &["list".into(), "--upgradable".into()], &[]).await?;
        if !result.success() {
            return Err(self.base.general_error_from(&result));
        }
        Ok(parse_apt_list(&result.stdout_utf8(), self.name(), ListKind::Upgradable))
    }

    #[tracing::instrument(name = "apt::install", skip(self, ctx, opts), err)]
    async fn install(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["install".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        if opts.dry_run {
            args.push("--simulate".to_string());
            self.base.log_dry_run(opts, &format!("would install: {}", names.join(", ")));
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
        Ok(parse_setting_up(&result.stdout_utf8(), self.name()))
    }

    #[tracing::instrument(name = "apt::remove", skip(self, ctx, opts), err)]
    async fn remove(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        self.base.validate_names(names)?;
        let mut args = vec!["remove".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        if opts.dry_run {
            args.push("--simulate".to_string());
            self.base.log_dry_run(opts, &format!("would remove: {}", names.join(", ")));
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
        Ok(parse_removing(&result.stdout_utf8(), self.name()))
    }

    #[tracing::instrument(name = "apt::upgrade", skip(self, ctx, opts), err)]
    async fn upgrade(&self, ctx: &Context, names: &[String], opts: &Options) -> Result<Vec<PackageRecord>> {
        let mut args = vec![if names.is_empty() { "upgrade".to_string() } else { "install".to_string() }];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        if opts.dry_run {
            args.push("--simulate".to_string());
        }
        if !names.is_empty() {
            args.push("--".to_string());
            args.extend(names.iter().cloned());
        }
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        if opts.dry_run {
            return Ok(Vec::new());
        }
        Ok(parse_setting_up(&result.stdout_utf8(), self.name()))
    }

    #[tracing::instrument(name = "apt::refresh", skip(self, ctx, opts), err)]
    async fn refresh(&self, ctx: &Context, opts: &Options) -> Result<()> {
        let result = self.run_sub(ctx, opts, vec!["update".to_string()]).await?;
        match self.classify_exit(&result) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[tracing::instrument(name = "apt::clean", skip(self, ctx, opts), err)]
    async fn clean(&self, ctx: &Context, opts: &Options) -> Result<()> {
        let result = self.run_sub(ctx, opts, vec!["clean".to_string()]).await?;
        match self.classify_exit(&result) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[tracing::instrument(name = "apt::auto_remove", skip(self, ctx, opts), err)]
    async fn auto_remove(&self, ctx: &Context, opts: &Options) -> Result<Vec<PackageRecord>> {
        let mut args = vec!["autoremove".to_string()];
        if opts.assume_yes {
            args.push("-y".to_string());
        }
        let result = self.run_sub(ctx, opts, args).await?;
        if let Some(err) = self.classify_exit(&result) {
            return Err(err);
        }
        Ok(parse_removing(&result.stdout_utf8(), self.name()))
    }

    #[tracing::instrument(name = "apt::info", skip(self, ctx, opts), err)]
    async fn info(&self, ctx: &Context, name: &str, opts: &Options) -> Result<PackageRecord> {
        self.base.validate_names(&[name])?;
        let ctx = self.base.derive_context(ctx, opts);
        let result = self
            .base
            .runner()
            .run(&ctx, "apt-cache", &["show".into(), name.to_string()], &[])
            .await?;
        if !result.success() || result.stdout.is_empty() {
            return Err(Error::PackageNotFound(name.to_string()));
        }
        parse_apt_cache_show(&result.stdout_utf8(), self.name())
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Installed,
    Upgradable,
}

/// Parse `apt list --installed` / `apt list --upgradable` output.
///
/// Each record line looks like:
/// `name/suite[,automatic/now] version arch [installed[,upgradable from: X]]`
fn parse_apt_list(output: &str, manager: &str, kind: ListKind) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in normalized_lines(output) {
        if line.starts_with("Listing...") || line.is_empty() {
            continue;
        }
        let Some((head, bracket)) = line.split_once('[') else {
            continue;
        };
        let mut fields = head.split_whitespace();
        let Some(name_suite) = fields.next() else { continue };
        let name = name_suite.split('/').next().unwrap_or(name_suite).to_string();
        let version = fields.next().unwrap_or("").to_string();
        let arch = fields.next().unwrap_or("").to_string();
        let bracket = bracket.trim_end_matches(']');
        let mut record = match kind {
            ListKind::Installed => PackageRecord {
                new_version: String::new(),
                ..PackageRecord::new(name, manager, PackageStatus::Installed)
            },
            ListKind::Upgradable => {
                let current = bracket
                    .split("upgradable from: ")
                    .nth(1)
                    .unwrap_or("")
                    .trim()
                    .to_string();
                PackageRecord {
                    new_version: version.clone(),
                    ..PackageRecord::new(name, manager, PackageStatus::Upgradable)
                }
                .with_version(current)
            }
        };
        if kind == ListKind::Installed {
            record.version = version;
        }
        record.metadata.insert("arch".to_string(), arch);
        records.push(record);
    }
    records
}

impl PackageRecord {
    fn with_version(mut self, version: String) -> Self {
        self.version = version;
        self
    }
}

/// Parse `apt search <query>` output, a blank-line-separated sequence of
/// `name/suite[,automatic/now] version arch [installed]` headers followed by
/// an indented description line.
fn parse_apt_search(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    let mut lines = normalized_lines(output).peekable();
    while let Some(line) = lines.next() {
        if line.is_empty() || !line.contains('/') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(name_suite) = fields.next() else { continue };
        let name = name_suite.split('/').next().unwrap_or(name_suite).to_string();
        let version = fields.next().unwrap_or("").to_string();
        let arch = fields.next().unwrap_or("").to_string();
        let installed = line.contains("[installed]") || line.contains("[installed,");
        let mut record = PackageRecord::new(
            name,
            manager,
            if installed { PackageStatus::Installed } else { PackageStatus::Available },
        );
        if installed {
            record.version = version.clone();
            record.new_version = version;
        } else {
            record.new_version = version;
        }
        record.metadata.insert("arch".to_string(), arch);
        if let Some(desc_line) = lines.peek() {
            if desc_line.starts_with(' ') || desc_line.starts_with('\t') {
                record.description = desc_line.trim().to_string();
                lines.next();
            }
        }
        records.push(record);
    }
    records
}

/// Parse `apt-cache show <name>` stanza output into a single record.
fn parse_apt_cache_show(output: &str, manager: &str) -> Option<PackageRecord> {
    let mut name = None;
    let mut version = None;
    let mut description = String::new();
    for line in normalized_lines(output) {
        if let Some(v) = line.strip_prefix("Package: ") {
            name = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("Version: ") {
            version = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("Description: ").or_else(|| line.strip_prefix("Description-en: ")) {
            description = v.trim().to_string();
        }
    }
    let name = name?;
    let version = version.unwrap_or_default();
    let mut record = PackageRecord::new(name, manager, PackageStatus::Available);
    record.new_version = version;
    record.description = description;
    Some(record)
}

/// Parse `Setting up <pkg> (<version>) ...` lines emitted by `apt-get
/// install` for every package it actually installed, including pulled-in
/// dependencies (§4.5).
fn parse_setting_up(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in normalized_lines(output) {
        let Some(rest) = line.strip_prefix("Setting up ") else { continue };
        if let Some((name, version)) = split_name_version_paren(rest) {
            let mut record = PackageRecord::new(name, manager, PackageStatus::Installed);
            record.version = version.clone();
            record.new_version = version;
            records.push(record);
        }
    }
    records
}

/// Parse `Removing <pkg> (<version>) ...` lines emitted by `apt-get remove`
/// / `autoremove` for every package actually removed.
fn parse_removing(output: &str, manager: &str) -> Vec<PackageRecord> {
    let mut records = Vec::new();
    for line in normalized_lines(output) {
        let Some(rest) = line.strip_prefix("Removing ") else { continue };
        if let Some((name, version)) = split_name_version_paren(rest) {
            let mut record = PackageRecord::new(name, manager, PackageStatus::Available);
            record.version = version;
            records.push(record);
        }
    }
    records
}

fn split_name_version_paren(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim_end_matches("...").trim_end_matches(iter_dots).trim();
    let open = rest.find('(')?;
    let name = rest[..open].trim().to_string();
    let after = &rest[open + 1..];
    let close = after.find(')')?;
    let version = after[..close].trim().to_string();
    Some((name, version))
}

// Helper for `trim_end_matches` above; apt emits a variable number of
// trailing dots while a step is "in progress" in non-piped output, but a
// captured/piped run always ends the line cleanly. Kept defensive in case a
// fixture was captured from a tty.
fn iter_dots(c: char) -> bool {
    c == '.'
}

/// Split CRLF/LF-terminated output into trimmed, non-comment lines,
/// tolerating whichever line ending the capturing host used (§4.5).
fn normalized_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(|l| l.trim_end_matches('\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = include_str!("../../fixtures/search-vim.vim-installed.ubuntu-2204.txt");

    #[test]
    fn search_vim_installed_marks_vim_installed_and_vim_gtk3_available() {
        let records = parse_apt_search(SEARCH_FIXTURE, "apt");
        let vim = records.iter().find(|r| r.name == "vim").expect("vim present");
        assert_eq!(vim.status, PackageStatus::Installed);
        assert!(!vim.version.is_empty());
        assert_eq!(vim.version, vim.new_version);

        let gtk3 = records.iter().find(|r| r.name == "vim-gtk3").expect("vim-gtk3 present");
        assert_eq!(gtk3.status, PackageStatus::Available);
        assert_eq!(gtk3.version, "");
        assert!(!gtk3.new_version.is_empty());
    }

    #[test]
    fn list_installed_never_reports_new_version() {
        let out = "Listing...\nvim/jammy,now 2:8.2.3995-1ubuntu2.15 amd64 [installed]\n";
        let records = parse_apt_list(out, "apt", ListKind::Installed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PackageStatus::Installed);
        assert!(!records[0].version.is_empty());
        assert_eq!(records[0].new_version, "");
    }

    #[test]
    fn list_upgradable_has_both_versions_and_they_differ() {
        let out = "Listing...\nvim/jammy 2:8.2.4-1 amd64 [upgradable from: 2:8.2.3995-1ubuntu2.15]\n";
        let records = parse_apt_list(out, "apt", ListKind::Upgradable);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.status, PackageStatus::Upgradable);
        assert!(!r.version.is_empty());
        assert!(!r.new_version.is_empty());
        assert_ne!(r.version, r.new_version);
    }

    #[test]
    fn setting_up_parses_installed_packages_including_dependencies() {
        let out = "Setting up libfoo-dev (1.2.3-1) ...\nSetting up vim (2:8.2.3995-1ubuntu2.15) ...\n";
        let records = parse_setting_up(out, "apt");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "libfoo-dev");
        assert_eq!(records[0].version, "1.2.3-1");
        assert_eq!(records[1].name, "vim");
    }

    #[test]
    fn removing_parses_removed_packages_as_available() {
        let out = "Removing vim (2:8.2.3995-1ubuntu2.15) ...\n";
        let records = parse_removing(out, "apt");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PackageStatus::Available);
        assert_eq!(records[0].new_version, "");
    }

    #[test]
    fn tolerates_crlf_and_blank_lines() {
        let out = "Listing...\r\n\r\nvim/jammy,now 1.0 amd64 [installed]\r\n";
        let records = parse_apt_list(out, "apt", ListKind::Installed);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn apt_cache_show_missing_package_yields_none() {
        assert!(parse_apt_cache_show("", "apt").is_none());
    }
}
