/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The generic concurrent-dispatch machinery behind every `Registry::*_all`
//! method (§4.7, §5).
//!
//! One `tokio::task::JoinSet` task per driver; a per-driver failure is
//! logged and folded into a default value rather than aborting the whole
//! fan-out. The executor always drains the `JoinSet` to completion before
//! returning, so no task is ever leaked even when the caller's context is
//! already cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::driver::PackageDriver;
use crate::logger::Logger;

/// Run `f` once per `(name, driver)` pair concurrently and collect the
/// results into a map keyed by driver name. A driver that returns `Err`
/// contributes `T::default()` to the map after the error is logged; a
/// driver whose task panics is omitted entirely (its failure is not this
/// executor's to classify).
pub async fn fan_out<T, F, Fut>(
    drivers: Vec<(String, Arc<dyn PackageDriver>)>,
    logger: Arc<dyn Logger>,
    op_name: &'static str,
    f: F,
) -> HashMap<String, T>
where
    F: Fn(Arc<dyn PackageDriver>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::error::Result<T>> + Send + 'static,
    T: Default + Send + 'static,
{
    let mut set = JoinSet::new();
    for (name, driver) in drivers {
        let fut = f(driver);
        set.spawn(async move { (name, fut.await) });
    }
    let mut out = HashMap::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, Ok(value))) => {
                out.insert(name, value);
            }
            Ok((name, Err(err))) => {
                logger.warn(&format!("{op_name} failed for driver {name:?}: {err}"));
                out.insert(name, T::default());
            }
            Err(join_err) => {
                logger.warn(&format!("{op_name} worker panicked: {join_err}"));
            }
        }
    }
    out
}
