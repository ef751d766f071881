/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Per-call configuration carried through every operation (§3).

use std::collections::BTreeMap;
use std::time::Duration;

/// Options a caller supplies for any unified operation. Drivers treat this
/// as read-only.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Construct a command that does not mutate system state.
    pub dry_run: bool,
    /// Route subprocess stdin/stdout/stderr to the caller's own streams; no
    /// capture or parsing occurs.
    pub interactive: bool,
    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    /// Automatically answer affirmatively to tool prompts.
    pub assume_yes: bool,
    /// For search results, perform additional per-package status probes.
    pub show_status: bool,
    /// Upper bound on subprocess duration; `None` means driver default.
    pub timeout: Option<Duration>,
    /// Extra tool-specific arguments appended to the constructed command line.
    pub custom_args: Vec<String>,
    /// Open key-value bag of driver-specific options.
    pub metadata: BTreeMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
