// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single loop moving records from the backlog into per-stream buffers and
//! handing full buffers to the dispatch pool.
//!
//! Each pass takes at most one record per known stream. A buffer is flushed
//! right after an append when it reaches the byte threshold, the count
//! threshold, or a flush-all is pending. A pending flush-all is consumed at
//! the top of the next iteration: records already in the backlog are pulled
//! in, then every non-empty buffer is flushed.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backlog::EventStorage;
use crate::dispatch::DispatchPool;
use crate::flush::FlushSignal;
use crate::record::DeliveryTask;
use crate::registry::StreamRegistry;
use crate::settings::SharedSettings;

#[derive(Debug, Default)]
struct StreamBuffer {
    payloads: Vec<String>,
    bytes: usize,
}

pub struct Assembler {
    backlog: Arc<dyn EventStorage>,
    registry: Arc<StreamRegistry>,
    settings: Arc<SharedSettings>,
    signal: Arc<FlushSignal>,
    pool: DispatchPool,
    buffers: HashMap<String, StreamBuffer>,
    buffered: Arc<AtomicUsize>,
    cancel_token: CancellationToken,
}

impl Assembler {
    pub fn new(
        backlog: Arc<dyn EventStorage>,
        registry: Arc<StreamRegistry>,
        settings: Arc<SharedSettings>,
        signal: Arc<FlushSignal>,
        pool: DispatchPool,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            backlog,
            registry,
            settings,
            signal,
            pool,
            buffers: HashMap::new(),
            buffered: Arc::new(AtomicUsize::new(0)),
            cancel_token,
        }
    }

    /// Counter of records held in buffers, readable while the loop runs.
    ///
    /// Briefly over-counts while a record is being moved, never under-counts.
    pub fn buffered_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.buffered)
    }

    /// Runs until the cancellation token fires. Buffers are not flushed on
    /// the way out.
    pub async fn run(mut self) {
        debug!("Batch assembler started");
        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            if self.signal.take() {
                self.flush_all().await;
                continue;
            }

            let moved = self.drain_pass().await;
            if moved > 0 {
                tokio::task::yield_now().await;
                continue;
            }

            if self.signal.is_requested() {
                continue;
            }
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = self.backlog.records_available() => {}
                () = self.signal.requested() => {}
            }
        }
        info!("Batch assembler stopped");
    }

    /// Moves at most one record per stream, returning how many moved.
    async fn drain_pass(&mut self) -> usize {
        let mut moved = 0;
        for stream in self.registry.streams() {
            // Counted before the take so stop never sees a record in neither place
            self.buffered.fetch_add(1, Ordering::AcqRel);
            let Some(record) = self.backlog.take(&stream) else {
                self.buffered.fetch_sub(1, Ordering::AcqRel);
                continue;
            };
            moved += 1;

            let buffer = self.buffers.entry(stream.clone()).or_default();
            buffer.bytes += record.size();
            buffer.payloads.push(record.into_payload());

            let (batch_size, batch_bytes_size) = self.settings.thresholds();
            if buffer.bytes >= batch_bytes_size
                || buffer.payloads.len() >= batch_size
                || self.signal.is_requested()
            {
                self.flush_stream(&stream).await;
            }
        }
        moved
    }

    async fn flush_all(&mut self) {
        // Records tracked before the request belong in this flush
        let mut remaining = self.backlog.len();
        while remaining > 0 {
            let moved = self.drain_pass().await;
            if moved == 0 {
                break;
            }
            remaining = remaining.saturating_sub(moved);
        }

        let streams: Vec<String> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| !buffer.payloads.is_empty())
            .map(|(stream, _)| stream.clone())
            .collect();
        if !streams.is_empty() {
            debug!("Flushing {} stream buffers", streams.len());
        }
        for stream in streams {
            self.flush_stream(&stream).await;
        }
    }

    async fn flush_stream(&mut self, stream: &str) {
        let Some(buffer) = self.buffers.get_mut(stream) else {
            return;
        };
        let payloads = mem::take(&mut buffer.payloads);
        buffer.bytes = 0;

        let credential = match self.registry.credential(stream) {
            Some(credential) if !credential.is_empty() => credential,
            _ => self.settings.snapshot().auth_key,
        };
        let task = DeliveryTask::new(stream.to_string(), credential, payloads);
        if task.is_empty() {
            return;
        }
        let count = task.len();

        debug!(stream = %stream, records = count, "Submitting batch");
        if let Err(e) = self.pool.submit(task).await {
            warn!(stream = %stream, "Dropping batch of {} records: {}", count, e);
        }
        self.buffered.fetch_sub(count, Ordering::AcqRel);
    }
}
