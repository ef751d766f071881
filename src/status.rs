/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Normalized status taxonomy shared by every driver.

use std::fmt;

/// Coarse classification of why an operation failed (or that it succeeded).
///
/// Every [`Error`](crate::Error) carries one of these so a caller can decide
/// user-visible behavior (e.g. map `PermissionError` to a distinct exit code)
/// without inspecting driver-specific text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    /// Operation completed normally.
    Success,
    /// Catch-all failure not otherwise classifiable.
    GeneralError,
    /// Caller provided an invalid package name or nonsensical arguments.
    UsageError,
    /// Requires elevated privileges.
    PermissionError,
    /// The tool is absent, not configured, or its service is down.
    UnavailableError,
    /// The driver does not implement the requested operation.
    OperationNotSupported,
    /// The specific named package does not exist in any source.
    PackageNotFound,
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::GeneralError => "general-error",
            Self::UsageError => "usage-error",
            Self::PermissionError => "permission-error",
            Self::UnavailableError => "unavailable-error",
            Self::OperationNotSupported => "operation-not-supported",
            Self::PackageNotFound => "package-not-found",
        })
    }
}
