/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The unified package record and manager-status snapshot (§3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Normalized lifecycle state of a package as seen through a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Installed,
    Available,
    Upgradable,
    Unknown,
}

/// The unified representation returned by every operation (§3).
///
/// Consumers must not assume any particular [`metadata`](Self::metadata) key
/// exists — it is an open, driver-specific bag (architecture, epoch,
/// release, repository, channel, confinement, branch, origin, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Canonical package identifier as exposed by the driver.
    pub name: String,
    /// Currently-installed version, or empty if not installed / not known.
    pub version: String,
    /// Target version: the repository candidate, or the version just
    /// installed/removed.
    pub new_version: String,
    pub status: PackageStatus,
    pub description: String,
    pub category: String,
    /// The registered driver name that produced this record.
    pub manager: String,
    pub metadata: BTreeMap<String, String>,
}

impl PackageRecord {
    /// Construct a bare record for `name` produced by `manager`, with every
    /// other field at its zero value. Adapters build on top of this with
    /// struct-update syntax.
    pub fn new(name: impl Into<String>, manager: impl Into<String>, status: PackageStatus) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            new_version: String::new(),
            status,
            description: String::new(),
            category: String::new(),
            manager: manager.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// A point-in-time snapshot of a driver's health and cache state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub manager: String,
    pub available: bool,
    pub healthy: bool,
    pub version: String,
    /// Free-form marker of when the tool's metadata cache was last refreshed
    /// (driver-specific format; empty if unknown).
    pub last_refresh: String,
    pub cache_size_bytes: u64,
    pub total_packages: u64,
    pub installed_packages: u64,
    pub issues: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ManagerStatus {
    pub fn unavailable(manager: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            available: false,
            healthy: false,
            version: String::new(),
            last_refresh: String::new(),
            cache_size_bytes: 0,
            total_packages: 0,
            installed_packages: 0,
            issues: vec![issue.into()],
            metadata: BTreeMap::new(),
        }
    }
}
