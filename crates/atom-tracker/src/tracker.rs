// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public entry point wiring the backlog, assembler, flush timer and dispatch
//! pool together.
//!
//! # Shutdown
//!
//! - [`Tracker::stop`] is graceful: it keeps requesting flush-all until the
//!   backlog, the assembler buffers and the dispatch pool are all empty (or
//!   `shutdown_timeout` elapses), then stops the assembler and timer. Batches
//!   still in flight are allowed to finish, requeues included.
//! - Cancelling [`Tracker::cancellation_token`] is a hard stop: every loop
//!   exits at its next await point and nothing is drained.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::Assembler;
use crate::backlog::{Backlog, EventStorage};
use crate::callback::{ErrorCallback, NoopErrorCallback};
use crate::config::TrackerConfig;
use crate::dispatch::DispatchPool;
use crate::errors::TrackerError;
use crate::flush::{deadline_after, run_flush_timer, FlushSignal};
use crate::record::Record;
use crate::registry::StreamRegistry;
use crate::retry::Deliverer;
use crate::settings::{Settings, SharedSettings};
use crate::transport::{HttpTransport, Transport};

pub struct Tracker {
    backlog: Arc<dyn EventStorage>,
    registry: Arc<StreamRegistry>,
    settings: Arc<SharedSettings>,
    signal: Arc<FlushSignal>,
    pool: DispatchPool,
    buffered: Arc<AtomicUsize>,
    backlog_wait_timeout: Duration,
    shutdown_timeout: Duration,
    drain_poll_interval: Duration,
    cancel_token: CancellationToken,
    pipeline_token: CancellationToken,
    stopping: AtomicBool,
    stopped: AtomicBool,
}

impl Tracker {
    /// Validates `config` and spawns the pipeline tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: TrackerConfig,
        transport: Arc<dyn Transport>,
        callback: Arc<dyn ErrorCallback>,
    ) -> Result<Self, TrackerError> {
        let backlog = Arc::new(Backlog::new(config.backlog_size));
        Self::start_with_storage(config, backlog, transport, callback)
    }

    /// Like [`Tracker::start`], with records kept in `backlog` instead of the
    /// bounded in-memory backlog. `backlog_size` is ignored.
    pub fn start_with_storage(
        config: TrackerConfig,
        backlog: Arc<dyn EventStorage>,
        transport: Arc<dyn Transport>,
        callback: Arc<dyn ErrorCallback>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;

        let settings = Arc::new(SharedSettings::new(Settings::from(&config)));
        let registry = Arc::new(StreamRegistry::new());
        let signal = Arc::new(FlushSignal::new());
        let cancel_token = CancellationToken::new();
        let pipeline_token = cancel_token.child_token();

        let pool = DispatchPool::start(
            config.batch_worker_count,
            config.batch_pool_size,
            Deliverer {
                transport,
                settings: Arc::clone(&settings),
                callback,
                cancel_token: cancel_token.clone(),
            },
        );

        let assembler = Assembler::new(
            Arc::clone(&backlog),
            Arc::clone(&registry),
            Arc::clone(&settings),
            Arc::clone(&signal),
            pool.clone(),
            pipeline_token.clone(),
        );
        let buffered = assembler.buffered_counter();
        tokio::spawn(assembler.run());
        tokio::spawn(run_flush_timer(
            Arc::clone(&settings),
            Arc::clone(&signal),
            pipeline_token.clone(),
        ));

        info!(
            endpoint = %config.endpoint,
            workers = config.batch_worker_count,
            backlog_size = config.backlog_size,
            "Tracker started"
        );

        Ok(Self {
            backlog,
            registry,
            settings,
            signal,
            pool,
            buffered,
            backlog_wait_timeout: config.backlog_wait_timeout,
            shutdown_timeout: config.shutdown_timeout,
            drain_poll_interval: config.drain_poll_interval,
            cancel_token,
            pipeline_token,
            stopping: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Tracker delivering over HTTP with no error callback.
    pub fn with_http(config: TrackerConfig) -> Result<Self, TrackerError> {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::start(config, transport, Arc::new(NoopErrorCallback))
    }

    fn admit(
        &self,
        stream: &str,
        data: String,
        credential: Option<&str>,
    ) -> Result<Record, TrackerError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(TrackerError::TrackerStopped);
        }
        let credential = match credential {
            Some(credential) if !credential.is_empty() => credential.to_string(),
            _ => self.settings.snapshot().auth_key,
        };
        if self.registry.register(stream, &credential) {
            debug!(stream = %stream, "Registered stream");
        }
        Ok(Record::new(stream, data))
    }

    /// Queues `data` for `stream` without waiting.
    ///
    /// `credential` only matters the first time a stream is seen; afterwards
    /// use [`Tracker::set_stream_credential`]. Without one the default
    /// credential is used.
    pub fn track(
        &self,
        stream: &str,
        data: impl Into<String>,
        credential: Option<&str>,
    ) -> Result<(), TrackerError> {
        let record = self.admit(stream, data.into(), credential)?;
        self.backlog.add(record)
    }

    /// Serializes `value` to JSON and tracks it.
    pub fn track_value<T: Serialize + ?Sized>(
        &self,
        stream: &str,
        value: &T,
        credential: Option<&str>,
    ) -> Result<(), TrackerError> {
        let data = serde_json::to_string(value)?;
        self.track(stream, data, credential)
    }

    /// Like [`Tracker::track`], but waits up to `backlog_wait_timeout` for
    /// room when the backlog is full.
    pub async fn track_with_wait(
        &self,
        stream: &str,
        data: impl Into<String>,
        credential: Option<&str>,
    ) -> Result<(), TrackerError> {
        let record = self.admit(stream, data.into(), credential)?;
        self.backlog
            .add_with_wait(record, self.backlog_wait_timeout)
            .await
    }

    /// Requests a flush of every stream buffer.
    pub fn flush(&self) {
        debug!("Flush requested");
        self.signal.request();
    }

    fn is_drained(&self) -> bool {
        // Same order records move in
        self.backlog.is_empty()
            && self.buffered.load(Ordering::Acquire) == 0
            && self.pool.is_empty()
    }

    /// Flushes everything and stops the pipeline. Later `track` calls fail
    /// with [`TrackerError::TrackerStopped`].
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Flushing all data and stopping the tracker");

        let deadline = deadline_after(Instant::now(), self.shutdown_timeout);
        loop {
            if self.cancel_token.is_cancelled() {
                warn!("Tracker cancelled, skipping drain");
                break;
            }
            if self.is_drained() {
                info!("Backlog, buffers and dispatch pool are empty");
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    pending = self.pool.pending(),
                    backlog = self.backlog.len(),
                    "Shutdown timeout of {:?} elapsed, stopping with data pending",
                    self.shutdown_timeout
                );
                break;
            }
            self.signal.request();
            tokio::time::sleep(self.drain_poll_interval.min(deadline - now)).await;
        }

        self.stopped.store(true, Ordering::Release);
        self.pipeline_token.cancel();
        self.pool.stop();
        info!("Tracker stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Token for a hard stop, e.g. from a signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn set_batch_size(&self, batch_size: usize) {
        self.settings.set_batch_size(batch_size);
    }

    pub fn set_batch_bytes_size(&self, batch_bytes_size: usize) {
        self.settings.set_batch_bytes_size(batch_bytes_size);
    }

    pub fn set_flush_interval(&self, flush_interval: Duration) {
        self.settings.set_flush_interval(flush_interval);
    }

    pub fn set_retry_max_time(&self, retry_max_time: Duration) {
        self.settings.set_retry_max_time(retry_max_time);
    }

    pub fn set_retry_max_count(&self, retry_max_count: u32) {
        self.settings.set_retry_max_count(retry_max_count);
    }

    pub fn set_endpoint(&self, endpoint: &str) {
        self.settings.set_endpoint(endpoint);
    }

    /// Default credential for streams first tracked from now on.
    pub fn set_auth_key(&self, auth_key: &str) {
        self.settings.set_auth_key(auth_key);
    }

    /// Overrides the credential of `stream` for every later flush.
    pub fn set_stream_credential(&self, stream: &str, credential: &str) {
        self.registry.set_credential(stream, credential);
    }

    pub fn set_debug(&self, is_debug: bool) {
        self.settings.set_debug(is_debug);
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.pipeline_token.cancel();
        self.pool.stop();
    }
}
