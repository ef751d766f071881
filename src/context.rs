/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A Go-style cancellable, deadline-bearing context.
//!
//! Built from `tokio_util`'s cancellation primitive plus an optional
//! `tokio::time::Instant` deadline rather than a bespoke reimplementation —
//! the combination is the idiomatic analogue of a Go `context.Context` in
//! the `tokio` ecosystem.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Propagates cancellation and an optional deadline through to the runner
/// so a caller hanging up reaches the child process (§4.1, §5).
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context with no deadline that is never cancelled unless explicitly
    /// told to via the returned token.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a child context with a deadline no later than `timeout` from
    /// now, and no later than any deadline already present on `self`
    /// (§4.1: "effective deadline is the minimum of the context's deadline
    /// and the optional per-runner default").
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// The cancellation token backing this context; cloning it and calling
    /// [`CancellationToken::cancel`] cancels this context and every
    /// descendant derived via [`Self::with_timeout`] or [`Self::child`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A fresh child that inherits cancellation but has no additional
    /// deadline of its own (used by the fan-out executor, §4.7).
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolve to either cancellation or deadline expiry, whichever comes
    /// first, or never resolve if this context has neither.
    pub async fn cancelled_or_expired(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_timeout_is_bounded_by_parent_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert!(child.deadline().unwrap() <= parent.deadline().unwrap() + Duration::from_millis(1));
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = Context::background();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
