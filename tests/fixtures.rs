/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Fixture-driven and end-to-end integration tests (§8): real captured tool
//! output fed through each adapter's parser, plus the registry/fan-out
//! properties that need more than one driver instance to observe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pkgcore::context::Context;
use pkgcore::driver::apt::AptDriver;
use pkgcore::driver::yum::YumDriver;
use pkgcore::driver::{DriverBase, PackageDriver};
use pkgcore::error::Result;
use pkgcore::options::Options;
use pkgcore::record::{PackageRecord, PackageStatus};
use pkgcore::runner::MockRunner;
use pkgcore::{Registry, Runner};

const SEARCH_VIM: &str = include_str!("../fixtures/search-vim.vim-installed.ubuntu-2204.txt");
const SEARCH_ZZZ: &str = include_str!("../fixtures/search-zzz9999nonexistent.clean-system.rocky-8.txt");
const INFO_ZZZ: &str = include_str!("../fixtures/info-zzz9999nonexistent.clean-system.rocky-8.txt");

/// Scenario 1: APT search for "vim" on Ubuntu 22.04 with vim installed.
#[tokio::test]
async fn apt_search_vim_scenario() {
    let mock = Arc::new(MockRunner::new());
    mock.add_response("apt", &["search", "vim"], SEARCH_VIM, "", 0);
    let driver = AptDriver::new(mock.clone() as Arc<dyn Runner>);
    let records = driver
        .search(&Context::background(), &["vim".to_string()], &Options::default())
        .await
        .unwrap();

    let vim = records.iter().find(|r| r.name == "vim").expect("vim in results");
    assert_eq!(vim.status, PackageStatus::Installed);
    assert!(vim.version.starts_with("2:8.2.3995"));
    assert_eq!(vim.version, vim.new_version);

    let gtk3 = records.iter().find(|r| r.name == "vim-gtk3").expect("vim-gtk3 in results");
    assert_eq!(gtk3.status, PackageStatus::Available);
    assert_eq!(gtk3.version, "");
    assert!(gtk3.new_version.starts_with("2:8.2.3995"));
}

/// Scenario 2: YUM search for a nonexistent package on Rocky 8 returns an
/// empty list, not an error.
#[test]
fn yum_search_nonexistent_scenario() {
    let records = yum_search_fixture(SEARCH_ZZZ);
    assert!(records.is_empty());
}

/// Scenario 3: YUM info for a nonexistent package is a package-not-found
/// sentinel, not a generic error.
#[tokio::test]
async fn yum_info_nonexistent_scenario() {
    let mock = Arc::new(MockRunner::new());
    mock.add_response("yum", &["info", "zzz9999nonexistent"], "", INFO_ZZZ, 1);
    let driver = YumDriver::new(mock.clone() as Arc<dyn Runner>);
    let err = driver
        .info(&Context::background(), "zzz9999nonexistent", &Options::default())
        .await
        .unwrap_err();
    assert_eq!(err.category(), pkgcore::StatusCategory::PackageNotFound);
}

fn yum_search_fixture(fixture: &str) -> Vec<PackageRecord> {
    // Exercises the same parser the adapter uses, without needing a process
    // handle just to validate round-trip parsing against a fixture file.
    let mock = MockRunner::new();
    mock.add_response("yum", &["search", "--", "zzz9999nonexistent"], fixture, "", 0);
    let driver = YumDriver::new(Arc::new(mock));
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async {
            driver
                .search(&Context::background(), &["zzz9999nonexistent".to_string()], &Options::default())
                .await
                .unwrap()
        })
}

struct MockDriver {
    base: DriverBase,
    delay: Duration,
    record: &'static str,
}

#[async_trait]
impl PackageDriver for MockDriver {
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
    async fn search(&self, ctx: &Context, _names: &[String], _opts: &Options) -> Result<Vec<PackageRecord>> {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = ctx.cancelled_or_expired() => return Err(pkgcore::Error::Cancelled),
        }
        Ok(vec![PackageRecord::new(self.record, self.name(), PackageStatus::Available)])
    }
}

fn mock_driver(name: &str, delay: Duration, record: &'static str) -> Arc<dyn PackageDriver> {
    Arc::new(MockDriver {
        base: DriverBase::new(name, "system", 10, Arc::new(MockRunner::new())),
        delay,
        record,
    })
}

/// Scenario 4: fan-out search across three mock drivers, each returning one
/// record.
#[tokio::test]
async fn fan_out_search_across_three_drivers() {
    let registry = Registry::new();
    registry.register(mock_driver("a", Duration::ZERO, "git")).unwrap();
    registry.register(mock_driver("b", Duration::ZERO, "git")).unwrap();
    registry.register(mock_driver("c", Duration::ZERO, "git")).unwrap();

    let results = registry
        .search_all(&Context::background(), &["git".to_string()], &Options::default())
        .await;

    assert_eq!(results.len(), 3);
    for name in ["a", "b", "c"] {
        assert_eq!(results[name].len(), 1);
    }
}

/// Fan-out parallelism: three 100ms mocks should finish in well under
/// 3×100ms.
#[tokio::test]
async fn fan_out_runs_drivers_concurrently() {
    let registry = Registry::new();
    for name in ["a", "b", "c"] {
        registry.register(mock_driver(name, Duration::from_millis(100), "x")).unwrap();
    }
    let start = tokio::time::Instant::now();
    let results = registry
        .search_all(&Context::background(), &["x".to_string()], &Options::default())
        .await;
    assert_eq!(results.len(), 3);
    assert!(start.elapsed() < Duration::from_millis(200));
}

/// Scenario 6: a context cancelled mid-fan-out still returns promptly with
/// every driver represented in the result map.
#[tokio::test]
async fn cancellation_mid_fan_out_returns_promptly_with_full_map() {
    let registry = Registry::new();
    for name in ["a", "b", "c"] {
        registry.register(mock_driver(name, Duration::from_millis(100), "x")).unwrap();
    }
    let ctx = Context::background();
    let cancel_ctx = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel_ctx.cancel();
    });
    let start = tokio::time::Instant::now();
    let results = registry
        .search_all(&ctx, &["x".to_string()], &Options::default())
        .await;
    assert_eq!(results.len(), 3);
    assert!(start.elapsed() < Duration::from_millis(150));
}

/// Scenario 5: invalid package names are rejected before the runner is ever
/// invoked.
#[tokio::test]
async fn invalid_name_short_circuits_before_any_subprocess_call() {
    let mock = Arc::new(MockRunner::new());
    let driver = AptDriver::new(mock.clone() as Arc<dyn Runner>);
    let err = driver
        .search(&Context::background(), &["vim; rm -rf /".to_string()], &Options::default())
        .await
        .unwrap_err();
    assert_eq!(err.category(), pkgcore::StatusCategory::UsageError);
    assert!(mock.invocations().is_empty(), "runner must not be invoked for an invalid name");
}

/// Priority selection: among same-category drivers, the highest priority
/// wins.
#[tokio::test]
async fn priority_selection_picks_highest() {
    let registry = Registry::new();
    registry.register(mock_driver("low", Duration::ZERO, "x")).unwrap();
    let high: Arc<dyn PackageDriver> = Arc::new(MockDriver {
        base: DriverBase::new("high", "system", 90, Arc::new(MockRunner::new())),
        delay: Duration::ZERO,
        record: "x",
    });
    registry.register(high).unwrap();
    let mid: Arc<dyn PackageDriver> = Arc::new(MockDriver {
        base: DriverBase::new("mid", "system", 70, Arc::new(MockRunner::new())),
        delay: Duration::ZERO,
        record: "x",
    });
    registry.register(mid).unwrap();

    let best = registry.get_best_match("system").await.unwrap();
    assert_eq!(best.name(), "high");
}
