// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed set of workers delivering batches off a bounded queue.
//!
//! The queue provides backpressure to the assembler only. `pending` counts
//! tasks that are queued or being delivered, which is what `is_empty` and the
//! drain after `stop` look at. Requeued tasks are counted before the original
//! is released, so a batch being requeued never looks drained.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, warn};

use crate::errors::DispatchError;
use crate::record::DeliveryTask;
use crate::retry::{Deliverer, DeliveryOutcome};

#[derive(Debug, Default)]
struct PoolState {
    pending: AtomicUsize,
    stopped: AtomicBool,
    idle: Notify,
}

impl PoolState {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn is_drained(&self) -> bool {
        self.stopped.load(Ordering::Acquire) && self.pending.load(Ordering::Acquire) == 0
    }

    /// Resolves once the pool is stopped and nothing is left to deliver.
    async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchPool {
    tx: mpsc::Sender<DeliveryTask>,
    state: Arc<PoolState>,
}

impl DispatchPool {
    /// Spawns `worker_count` workers sharing a queue of `queue_size` tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(worker_count: usize, queue_size: usize, deliverer: Deliverer) -> Self {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let pool = Self {
            tx,
            state: Arc::new(PoolState::default()),
        };

        let rx = Arc::new(Mutex::new(rx));
        for id in 0..worker_count.max(1) {
            tokio::spawn(run_worker(
                id,
                Arc::clone(&rx),
                pool.clone(),
                deliverer.clone(),
            ));
        }
        debug!(workers = worker_count, queue_size, "Dispatch pool started");
        pool
    }

    /// Queues a task, waiting for room in the queue.
    pub async fn submit(&self, task: DeliveryTask) -> Result<(), DispatchError> {
        if self.state.stopped.load(Ordering::Acquire) {
            return Err(DispatchError::PoolStopped);
        }
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(task).await.is_err() {
            self.state.finish_one();
            return Err(DispatchError::PoolStopped);
        }
        Ok(())
    }

    /// Queues a task without waiting.
    pub fn try_submit(&self, task: DeliveryTask) -> Result<(), DispatchError> {
        if self.state.stopped.load(Ordering::Acquire) {
            return Err(DispatchError::PoolStopped);
        }
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.state.finish_one();
                Err(DispatchError::PoolFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.state.finish_one();
                Err(DispatchError::PoolStopped)
            }
        }
    }

    /// Requeues a task whose retries ran out. Accepted even after `stop`.
    ///
    /// Called from workers, so it never waits on the queue itself: a full
    /// queue hands the task to a detached sender instead.
    pub fn resubmit(&self, task: DeliveryTask) {
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                let tx = self.tx.clone();
                let state = Arc::clone(&self.state);
                tokio::spawn(async move {
                    if tx.send(task).await.is_err() {
                        state.finish_one();
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!(
                    stream = %task.stream,
                    "Dispatch queue closed, dropping requeued batch of {} records",
                    task.len()
                );
                self.state.finish_one();
            }
        }
    }

    /// True when no task is queued or being delivered.
    pub fn is_empty(&self) -> bool {
        self.state.pending.load(Ordering::Acquire) == 0
    }

    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Refuses new submissions. Workers exit once everything queued, in
    /// flight or requeued has been handled.
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::Release);
        self.state.idle.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::Acquire)
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DeliveryTask>>>,
    pool: DispatchPool,
    deliverer: Deliverer,
) {
    debug!(worker = id, "Dispatch worker started");
    loop {
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                () = deliverer.cancel_token.cancelled() => None,
                task = rx.recv() => task,
                () = pool.state.drained() => None,
            }
        };
        let Some(task) = task else {
            break;
        };

        if deliverer.deliver(&task).await == DeliveryOutcome::Exhausted {
            pool.resubmit(task);
        }
        pool.state.finish_one();
    }
    debug!(worker = id, "Dispatch worker stopped");
}
