/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Typed error envelope.
//!
//! Mirrors the shape used throughout the corpus: a handful of precisely
//! nameable variants for conditions callers may want to match on, plus a
//! transparent catch-all that carries an [`anyhow::Error`] built up with
//! `.context(...)` while a command is assembled or its output parsed.

use crate::status::StatusCategory;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The package name or option value failed validation (§4.2).
    #[error("invalid package name {0:?}")]
    InvalidName(String),

    /// The requested operation is not implemented by this driver.
    #[error("driver {driver:?} does not support operation {op:?}")]
    NotSupported { driver: String, op: &'static str },

    /// The named package does not exist in any source known to the driver.
    #[error("package {0:?} not found")]
    PackageNotFound(String),

    /// The underlying tool requires elevated privileges to complete the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The underlying tool binary is missing, unconfigured, or its service is down.
    #[error("{0} is unavailable: {1}")]
    Unavailable(String, String),

    /// No driver is registered under this name.
    #[error("no driver registered under name {0:?}")]
    NoSuchDriver(String),

    /// A driver with this name is already registered.
    #[error("driver {0:?} is already registered")]
    AlreadyRegistered(String),

    /// No available driver of the requested category.
    #[error("no available driver for category {0:?}")]
    NoDriverForCategory(String),

    /// The caller's context was cancelled before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's context deadline elapsed before the operation completed.
    #[error("operation timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// Catch-all: a general failure, usually a non-zero exit with no more
    /// specific classification, carrying the offending stderr snippet.
    #[error("{0}")]
    General(String),

    /// Any other error bubbled up via `anyhow::Context` while building a
    /// command or parsing its output.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// The normalized category this error maps to (§3).
    pub fn category(&self) -> StatusCategory {
        match self {
            Self::InvalidName(_) => StatusCategory::UsageError,
            Self::NotSupported { .. } => StatusCategory::OperationNotSupported,
            Self::PackageNotFound(_) => StatusCategory::PackageNotFound,
            Self::Permission(_) => StatusCategory::PermissionError,
            Self::Unavailable(..) => StatusCategory::UnavailableError,
            Self::NoSuchDriver(_) => StatusCategory::UsageError,
            Self::AlreadyRegistered(_) => StatusCategory::UsageError,
            Self::NoDriverForCategory(_) => StatusCategory::UnavailableError,
            Self::Cancelled | Self::TimedOut(_) => StatusCategory::GeneralError,
            Self::General(_) => StatusCategory::GeneralError,
            Self::Other(_) => StatusCategory::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Strip the obvious tool prefixes ("E: ", "Error: ", "error: ") a stderr
/// line tends to carry before it's folded into an error message (§7).
pub fn strip_stderr_prefix(line: &str) -> &str {
    for prefix in ["E: ", "Error: ", "error: "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return rest;
        }
    }
    line
}
