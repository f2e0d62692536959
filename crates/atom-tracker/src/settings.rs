// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Values that may change while the tracker is running.
//!
//! Readers take a cheap snapshot per pass (the assembler per record, a worker
//! per delivery task, the timer per tick), so a change applies from the next
//! pass onwards.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::warn;

use crate::config::TrackerConfig;
use crate::constants::{MAX_BATCH_BYTES_SIZE, MAX_BATCH_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoint: String,
    pub auth_key: String,
    pub batch_size: usize,
    pub batch_bytes_size: usize,
    pub flush_interval: Duration,
    pub retry_max_time: Duration,
    pub retry_max_count: u32,
    pub retry_backoff_base: Duration,
    pub request_timeout: Duration,
    pub is_debug: bool,
}

impl From<&TrackerConfig> for Settings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            auth_key: config.auth_key.clone(),
            batch_size: clamp_batch_size(config.batch_size),
            batch_bytes_size: clamp_batch_bytes(config.batch_bytes_size),
            flush_interval: config.flush_interval,
            retry_max_time: config.retry_max_time,
            retry_max_count: config.retry_max_count,
            retry_backoff_base: config.retry_backoff_base,
            request_timeout: config.request_timeout,
            is_debug: config.is_debug,
        }
    }
}

fn clamp_batch_size(batch_size: usize) -> usize {
    if batch_size > MAX_BATCH_SIZE {
        warn!(
            requested = batch_size,
            max = MAX_BATCH_SIZE,
            "Batch size above the bulk limit, clamping"
        );
        MAX_BATCH_SIZE
    } else {
        batch_size
    }
}

fn clamp_batch_bytes(batch_bytes_size: usize) -> usize {
    if batch_bytes_size > MAX_BATCH_BYTES_SIZE {
        warn!(
            requested = batch_bytes_size,
            max = MAX_BATCH_BYTES_SIZE,
            "Batch bytes size above the bulk limit, clamping"
        );
        MAX_BATCH_BYTES_SIZE
    } else {
        batch_bytes_size
    }
}

#[derive(Debug)]
pub struct SharedSettings {
    inner: RwLock<Settings>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    /// `(count, bytes)` flush thresholds.
    pub fn thresholds(&self) -> (usize, usize) {
        let settings = self.read();
        (settings.batch_size, settings.batch_bytes_size)
    }

    pub fn flush_interval(&self) -> Duration {
        self.read().flush_interval
    }

    pub fn is_debug(&self) -> bool {
        self.read().is_debug
    }

    pub fn set_batch_size(&self, batch_size: usize) {
        if batch_size == 0 {
            warn!("Ignoring batch size of 0");
            return;
        }
        self.write().batch_size = clamp_batch_size(batch_size);
    }

    pub fn set_batch_bytes_size(&self, batch_bytes_size: usize) {
        if batch_bytes_size == 0 {
            warn!("Ignoring batch bytes size of 0");
            return;
        }
        self.write().batch_bytes_size = clamp_batch_bytes(batch_bytes_size);
    }

    pub fn set_flush_interval(&self, flush_interval: Duration) {
        if flush_interval.is_zero() {
            warn!("Ignoring flush interval of 0");
            return;
        }
        self.write().flush_interval = flush_interval;
    }

    pub fn set_retry_max_time(&self, retry_max_time: Duration) {
        self.write().retry_max_time = retry_max_time;
    }

    pub fn set_retry_max_count(&self, retry_max_count: u32) {
        if retry_max_count == 0 {
            warn!("Ignoring retry max count of 0");
            return;
        }
        self.write().retry_max_count = retry_max_count;
    }

    pub fn set_endpoint(&self, endpoint: &str) {
        if endpoint.trim().is_empty() {
            warn!("Ignoring empty endpoint");
            return;
        }
        self.write().endpoint = endpoint.to_string();
    }

    pub fn set_auth_key(&self, auth_key: &str) {
        self.write().auth_key = auth_key.to_string();
    }

    pub fn set_debug(&self, is_debug: bool) {
        self.write().is_debug = is_debug;
    }
}
