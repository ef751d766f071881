/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Unified package-management core.
//!
//! A single contract (search, list, install, remove, upgrade, refresh,
//! clean, auto-remove, verify, status) implemented by adapters for
//! heterogeneous underlying tools (APT, YUM/DNF, APK, Snap, Flatpak), all
//! registered in a process-wide [`Registry`] that supports both
//! single-driver and fan-out execution.
//!
//! This crate is a library only. It never initializes a global `tracing`
//! subscriber, never touches a configuration file, and never escalates
//! privileges — those are the host application's concerns.

pub mod context;
pub mod defaults;
pub mod driver;
pub mod error;
pub mod fanout;
pub mod logger;
pub mod options;
pub mod record;
pub mod registry;
pub mod runner;
pub mod status;
pub mod validate;

pub use context::Context;
pub use driver::PackageDriver;
pub use error::{Error, Result};
pub use logger::{LogLevel, Logger};
pub use options::Options;
pub use record::{ManagerStatus, PackageRecord, PackageStatus};
pub use registry::Registry;
pub use runner::{ProcessRunner, Runner};
pub use status::StatusCategory;

use std::sync::Arc;

/// Construct and register every built-in adapter against `registry`.
///
/// Rust has no implicit module-load hooks, so this is the explicit
/// "import & register" step a host application calls once at startup
/// (§4.6, §9). Registration order does not affect behaviour; calling this
/// twice against the same registry fails on the second driver's name
/// already being bound.
pub fn register_builtin_drivers(registry: &Registry) -> Result<()> {
    let runner: Arc<dyn Runner> = Arc::new(ProcessRunner::new());
    registry.register(Arc::new(driver::apt::AptDriver::new(runner.clone())))?;
    registry.register(Arc::new(driver::yum::YumDriver::new(runner.clone())))?;
    registry.register(Arc::new(driver::apk::ApkDriver::new(runner.clone())))?;
    registry.register(Arc::new(driver::snap::SnapDriver::new(runner.clone())))?;
    registry.register(Arc::new(driver::flatpak::FlatpakDriver::new(runner)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_drivers_register_under_distinct_names() {
        let registry = Registry::new();
        register_builtin_drivers(&registry).unwrap();
        for name in ["apt", "yum", "apk", "snap", "flatpak"] {
            assert!(registry.get(name).is_ok(), "missing driver {name}");
        }
    }
}
