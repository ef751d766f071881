/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The process-wide {driver-name → driver} map and its fan-out methods
//! (§4.6, §4.7).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::context::Context;
use crate::driver::PackageDriver;
use crate::error::{Error, Result};
use crate::fanout::fan_out;
use crate::logger::{default_logger, Logger};
use crate::options::Options;
use crate::record::{ManagerStatus, PackageRecord};

/// Thread-safe {driver-name → driver} map plus priority-based selection and
/// concurrent fan-out across every available driver.
///
/// Readers (availability snapshots, lookups) take the read lock; only
/// registration takes the write lock (§5).
pub struct Registry {
    drivers: RwLock<HashMap<String, Arc<dyn PackageDriver>>>,
    logger: Arc<dyn Logger>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            logger: default_logger(),
        }
    }

    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            logger,
        }
    }

    /// Bind `driver` under its own [`PackageDriver::name`]. Fails if that
    /// name is already registered (§4.6).
    pub fn register(&self, driver: Arc<dyn PackageDriver>) -> Result<()> {
        let name = driver.name().to_string();
        let mut drivers = self.drivers.write().unwrap();
        if drivers.contains_key(&name) {
            return Err(Error::AlreadyRegistered(name));
        }
        drivers.insert(name, driver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PackageDriver>> {
        self.drivers
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoSuchDriver(name.to_string()))
    }

    /// Every registered driver for which [`PackageDriver::is_available`] is
    /// currently true. Availability is re-evaluated on every call (§4.6).
    pub async fn get_available(&self) -> Vec<Arc<dyn PackageDriver>> {
        let snapshot: Vec<_> = self.drivers.read().unwrap().values().cloned().collect();
        let mut available = Vec::with_capacity(snapshot.len());
        for driver in snapshot {
            if driver.is_available().await {
                available.push(driver);
            }
        }
        available
    }

    /// Among available drivers of `category`, the one with the highest
    /// priority; ties broken by name, ascending (§4.6).
    pub async fn get_best_match(&self, category: &str) -> Result<Arc<dyn PackageDriver>> {
        let mut candidates: Vec<_> = self
            .get_available()
            .await
            .into_iter()
            .filter(|d| d.category() == category)
            .collect();
        candidates.sort_by(|a, b| b.priority().cmp(&a.priority()).then_with(|| a.name().cmp(b.name())));
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoDriverForCategory(category.to_string()))
    }

    async fn available_named(&self) -> Vec<(String, Arc<dyn PackageDriver>)> {
        self.get_available()
            .await
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect()
    }

    pub async fn search_all(&self, ctx: &Context, names: &[String], opts: &Options) -> HashMap<String, Vec<PackageRecord>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let names = names.to_vec();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "search", move |driver| {
            let ctx = ctx.clone();
            let names = names.clone();
            let opts = opts.clone();
            async move { driver.search(&ctx, &names, &opts).await }
        })
        .await
    }

    pub async fn list_installed_all(&self, ctx: &Context, opts: &Options) -> HashMap<String, Vec<PackageRecord>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "list_installed", move |driver| {
            let ctx = ctx.clone();
            let opts = opts.clone();
            async move { driver.list_installed(&ctx, &opts).await }
        })
        .await
    }

    pub async fn list_upgradable_all(&self, ctx: &Context, opts: &Options) -> HashMap<String, Vec<PackageRecord>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "list_upgradable", move |driver| {
            let ctx = ctx.clone();
            let opts = opts.clone();
            async move { driver.list_upgradable(&ctx, &opts).await }
        })
        .await
    }

    pub async fn install_all(&self, ctx: &Context, names: &[String], opts: &Options) -> HashMap<String, Vec<PackageRecord>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let names = names.to_vec();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "install", move |driver| {
            let ctx = ctx.clone();
            let names = names.clone();
            let opts = opts.clone();
            async move { driver.install(&ctx, &names, &opts).await }
        })
        .await
    }

    pub async fn remove_all(&self, ctx: &Context, names: &[String], opts: &Options) -> HashMap<String, Vec<PackageRecord>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let names = names.to_vec();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "remove", move |driver| {
            let ctx = ctx.clone();
            let names = names.clone();
            let opts = opts.clone();
            async move { driver.remove(&ctx, &names, &opts).await }
        })
        .await
    }

    pub async fn upgrade_all(&self, ctx: &Context, names: &[String], opts: &Options) -> HashMap<String, Vec<PackageRecord>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let names = names.to_vec();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "upgrade", move |driver| {
            let ctx = ctx.clone();
            let names = names.clone();
            let opts = opts.clone();
            async move { driver.upgrade(&ctx, &names, &opts).await }
        })
        .await
    }

    pub async fn auto_remove_all(&self, ctx: &Context, opts: &Options) -> HashMap<String, Vec<PackageRecord>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "auto_remove", move |driver| {
            let ctx = ctx.clone();
            let opts = opts.clone();
            async move { driver.auto_remove(&ctx, &opts).await }
        })
        .await
    }

    pub async fn verify_all(&self, ctx: &Context, names: &[String], opts: &Options) -> HashMap<String, Vec<PackageRecord>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let names = names.to_vec();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "verify", move |driver| {
            let ctx = ctx.clone();
            let names = names.clone();
            let opts = opts.clone();
            async move { driver.verify(&ctx, &names, &opts).await }
        })
        .await
    }

    pub async fn refresh_all(&self, ctx: &Context, opts: &Options) -> HashMap<String, Result<()>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let opts = opts.clone();
        fan_out_results(drivers, self.logger.clone(), "refresh", move |driver| {
            let ctx = ctx.clone();
            let opts = opts.clone();
            async move { driver.refresh(&ctx, &opts).await }
        })
        .await
    }

    pub async fn clean_all(&self, ctx: &Context, opts: &Options) -> HashMap<String, Result<()>> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let opts = opts.clone();
        fan_out_results(drivers, self.logger.clone(), "clean", move |driver| {
            let ctx = ctx.clone();
            let opts = opts.clone();
            async move { driver.clean(&ctx, &opts).await }
        })
        .await
    }

    pub async fn status_all(&self, ctx: &Context, opts: &Options) -> HashMap<String, ManagerStatus> {
        let drivers = self.available_named().await;
        let ctx = ctx.clone();
        let opts = opts.clone();
        fan_out(drivers, self.logger.clone(), "status", move |driver| {
            let ctx = ctx.clone();
            let opts = opts.clone();
            async move { driver.status(&ctx, &opts).await }
        })
        .await
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Variant of [`fan_out`] for operations that return `Result<()>`: the map
/// carries the per-driver `Result` itself (there is no meaningful "empty"
/// success value to default to, so unlike [`fan_out`] nothing is swallowed).
async fn fan_out_results<F, Fut>(
    drivers: Vec<(String, Arc<dyn PackageDriver>)>,
    logger: Arc<dyn Logger>,
    op_name: &'static str,
    f: F,
) -> HashMap<String, Result<()>>
where
    F: Fn(Arc<dyn PackageDriver>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let mut set = tokio::task::JoinSet::new();
    for (name, driver) in drivers {
        let fut = f(driver);
        set.spawn(async move { (name, fut.await) });
    }
    let mut out = HashMap::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, result)) => {
                if let Err(err) = &result {
                    logger.warn(&format!("{op_name} failed for driver {name:?}: {err}"));
                }
                out.insert(name, result);
            }
            Err(join_err) => {
                logger.warn(&format!("{op_name} worker panicked: {join_err}"));
            }
        }
    }
    out
}
