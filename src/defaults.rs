/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Centralized tunables.
//!
//! The core is a library invoked programmatically; file-based configuration
//! is the CLI's concern (§1 out of scope). What lives here are the constants
//! that would otherwise be magic numbers scattered through adapters.

use std::time::Duration;

/// Locale pinned onto every non-interactive subprocess invocation (§4.1, §6).
pub const LOCALE_PIN: &str = "LC_ALL=C";

/// Fallback timeout applied when neither the caller's [`Options`](crate::Options)
/// nor a driver-specific override specifies one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default priority assigned to the APT driver within the `system` category.
pub const PRIORITY_APT: i32 = 80;
/// Default priority assigned to the YUM/DNF driver within the `system` category.
pub const PRIORITY_YUM: i32 = 80;
/// Default priority assigned to the APK driver within the `system` category.
pub const PRIORITY_APK: i32 = 80;
/// Default priority assigned to the Snap driver within the `app` category.
pub const PRIORITY_SNAP: i32 = 50;
/// Default priority assigned to the Flatpak driver within the `app` category.
pub const PRIORITY_FLATPAK: i32 = 50;
