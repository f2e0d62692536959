// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded intake queue between `track` and the assembler.
//!
//! Records are kept in one FIFO per stream, with a single capacity shared by
//! all streams. When the backlog is full:
//! - [`Backlog::add`] fails immediately with [`TrackerError::CapacityExceeded`]
//! - [`Backlog::add_with_wait`] waits up to a timeout for the assembler to make
//!   room, then fails with the same error
//!
//! Hosts can replace the backlog with their own [`EventStorage`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

use crate::constants::STORAGE_POLL_INTERVAL;
use crate::errors::TrackerError;
use crate::flush::deadline_after;
use crate::record::Record;

/// Storage for records waiting to be batched.
///
/// Producers call `add` concurrently; a single assembler calls `take`.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Enqueues without waiting.
    fn add(&self, record: Record) -> Result<(), TrackerError>;

    /// Enqueues, waiting at most `timeout` for space. Unbounded storages can
    /// keep the default.
    async fn add_with_wait(&self, record: Record, timeout: Duration) -> Result<(), TrackerError> {
        let _ = timeout;
        self.add(record)
    }

    /// Pops the oldest record for `stream`, if any.
    fn take(&self, stream: &str) -> Option<Record>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves when records may have been added. The default polls.
    async fn records_available(&self) {
        tokio::time::sleep(STORAGE_POLL_INTERVAL).await;
    }
}

#[derive(Debug, Default)]
struct Queues {
    by_stream: HashMap<String, VecDeque<Record>>,
    len: usize,
}

#[derive(Debug)]
pub struct Backlog {
    queues: Mutex<Queues>,
    capacity: usize,
    records_available: Notify,
    space_available: Notify,
}

impl Backlog {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            capacity,
            records_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_push(&self, record: Record) -> Result<(), Record> {
        {
            let mut queues = self.lock();
            if queues.len >= self.capacity {
                return Err(record);
            }
            queues
                .by_stream
                .entry(record.stream().to_string())
                .or_default()
                .push_back(record);
            queues.len += 1;
        }
        self.records_available.notify_one();
        Ok(())
    }

    fn capacity_error(&self, stream: &str) -> TrackerError {
        warn!(
            stream = %stream,
            capacity = self.capacity,
            "Backlog full, rejecting record"
        );
        TrackerError::CapacityExceeded {
            stream: stream.to_string(),
            capacity: self.capacity,
        }
    }
}

#[async_trait]
impl EventStorage for Backlog {
    fn add(&self, record: Record) -> Result<(), TrackerError> {
        self.try_push(record)
            .map_err(|rejected| self.capacity_error(rejected.stream()))
    }

    async fn add_with_wait(
        &self,
        mut record: Record,
        timeout: Duration,
    ) -> Result<(), TrackerError> {
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            // Register interest before checking so a concurrent take can't be missed
            let notified = self.space_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(record) {
                Ok(()) => return Ok(()),
                Err(rejected) => record = rejected,
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(self.capacity_error(record.stream()));
            }
        }
    }

    fn take(&self, stream: &str) -> Option<Record> {
        let record = {
            let mut queues = self.lock();
            let record = queues.by_stream.get_mut(stream)?.pop_front()?;
            queues.len -= 1;
            record
        };
        self.space_available.notify_waiters();
        Some(record)
    }

    fn len(&self) -> usize {
        self.lock().len
    }

    async fn records_available(&self) {
        self.records_available.notified().await;
    }
}
