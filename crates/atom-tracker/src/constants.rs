// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default limits and tunables for the tracker.
//!
//! The Atom bulk API enforces its own limits on request size and entry count.
//! Thresholds above those limits are clamped when set at runtime.

use std::time::Duration;

/// Default Atom collection endpoint. Bulk requests go to `{endpoint}bulk`.
pub const DEFAULT_ENDPOINT: &str = "https://track.atom-data.io/";

/// Number of dispatch workers delivering batches concurrently.
pub const DEFAULT_BATCH_WORKER_COUNT: usize = 1;

/// Capacity of the dispatch pool's task queue.
pub const DEFAULT_BATCH_POOL_SIZE: usize = 1;

/// Maximum number of records waiting in the backlog across all streams.
pub const DEFAULT_BACKLOG_SIZE: usize = 500;

/// How long `track_with_wait` waits for backlog space before giving up.
pub const DEFAULT_BACKLOG_WAIT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Interval between periodic flush-all signals.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10_000);

/// Ceiling for a single backoff sleep.
pub const DEFAULT_RETRY_MAX_TIME: Duration = Duration::from_millis(1_800_000);

/// Delivery attempts per pass before the batch is requeued.
pub const DEFAULT_RETRY_MAX_COUNT: u32 = 12;

/// Base of the exponential backoff (`base * 2^attempt`).
pub const DEFAULT_RETRY_BACKOFF_BASE: Duration = Duration::from_millis(3_000);

/// Records per batch before the buffer is flushed.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Buffered payload bytes per batch before the buffer is flushed.
pub const DEFAULT_BATCH_BYTES_SIZE: usize = 64 * 1_024;

/// Timeout applied to every transport call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on the drain phase of a graceful stop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(5_000);

/// How often a graceful stop checks whether the pipeline has drained.
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often the assembler polls an event storage that can't signal arrivals.
pub const STORAGE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Stand-in for deadlines too far out to represent.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Largest batch the Atom bulk API accepts, in bytes.
pub const MAX_BATCH_BYTES_SIZE: usize = 512 * 1_024;

/// Largest number of entries the Atom bulk API accepts in one batch.
pub const MAX_BATCH_SIZE: usize = 2_000;

/// Characters of a batch shown in error log lines.
pub(crate) const ERROR_PREVIEW_CHARS: usize = 50;

/// Characters of a batch shown in first-attempt debug lines.
pub(crate) const DEBUG_PREVIEW_CHARS: usize = 100;

/// SDK identification sent with every bulk request.
pub const SDK_TYPE: &str = "rust";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
