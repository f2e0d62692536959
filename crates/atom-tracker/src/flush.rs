// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flush-all requests and the periodic timer raising them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::FAR_FUTURE;
use crate::settings::SharedSettings;

/// `start + wait`, saturating to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Pending flush-all request, consumed by the assembler.
#[derive(Debug, Default)]
pub struct FlushSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl FlushSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Clears the request, returning whether one was pending.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// Raises a flush-all every `flush_interval` until cancelled.
///
/// Deadlines are absolute (`next += interval`) so slow wakeups don't drift the
/// schedule. The interval is re-read every tick.
pub async fn run_flush_timer(
    settings: Arc<SharedSettings>,
    signal: Arc<FlushSignal>,
    cancel_token: CancellationToken,
) {
    let mut next = deadline_after(Instant::now(), settings.flush_interval());
    loop {
        if settings.is_debug() {
            debug!(
                "Flushing in {:?}",
                next.saturating_duration_since(Instant::now())
            );
        }
        tokio::select! {
            () = cancel_token.cancelled() => {
                debug!("Flush timer stopped");
                return;
            }
            () = tokio::time::sleep_until(next) => {}
        }

        signal.request();

        next = deadline_after(next, settings.flush_interval());
        let now = Instant::now();
        if next < now {
            next = now;
        }
    }
}
