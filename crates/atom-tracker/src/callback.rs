// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::panic::{self, AssertUnwindSafe};
use std::time::SystemTime;

use tracing::error;

/// Host hook invoked on every delivery error event.
///
/// `status` is the HTTP status of the response, or `None` when the request
/// never produced one (connection failure, timeout).
pub trait ErrorCallback: Send + Sync {
    fn on_error(&self, timestamp: SystemTime, status: Option<u16>, message: &str, batch: &[String]);
}

impl<F> ErrorCallback for F
where
    F: Fn(SystemTime, Option<u16>, &str, &[String]) + Send + Sync,
{
    fn on_error(&self, timestamp: SystemTime, status: Option<u16>, message: &str, batch: &[String]) {
        self(timestamp, status, message, batch)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopErrorCallback;

impl ErrorCallback for NoopErrorCallback {
    fn on_error(&self, _: SystemTime, _: Option<u16>, _: &str, _: &[String]) {}
}

/// Calls the host callback, containing any panic it raises.
pub(crate) fn notify(
    callback: &dyn ErrorCallback,
    stream: &str,
    status: Option<u16>,
    message: &str,
    batch: &[String],
) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        callback.on_error(SystemTime::now(), status, message, batch);
    }));
    if result.is_err() {
        error!(stream = %stream, "Error callback panicked, ignoring");
    }
}
