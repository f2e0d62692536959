// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered event tracker for the ironSource Atom bulk API.
//!
//! Producers hand records to [`tracker::Tracker::track`] and return immediately.
//! Records flow through the following pipeline:
//!
//! ```text
//!   track(stream, data)
//!          │
//!          v
//!   ┌─────────────┐
//!   │   Backlog   │ (bounded, per-stream FIFO)
//!   └──────┬──────┘
//!          │ one record per stream per pass
//!          v
//!   ┌─────────────┐      ┌──────────────┐
//!   │  Assembler  │ <─── │ Flush signal │ (timer, flush(), stop())
//!   └──────┬──────┘      └──────────────┘
//!          │ DeliveryTask (count/bytes threshold or flush)
//!          v
//!   ┌─────────────┐
//!   │  Dispatch   │ (N workers, bounded queue)
//!   │    Pool     │ <───────────┐
//!   └──────┬──────┘             │ requeue after
//!          │                    │ exhausted retries
//!          v                    │
//!   ┌─────────────┐             │
//!   │   Retry /   │ ────────────┘
//!   │   Backoff   │
//!   └──────┬──────┘
//!          v
//!      Transport
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod assembler;
pub mod auth;
pub mod backlog;
pub mod callback;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod errors;
pub mod flush;
pub mod record;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod tracker;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use backlog::{Backlog, EventStorage};
pub use callback::{ErrorCallback, NoopErrorCallback};
pub use config::TrackerConfig;
pub use errors::TrackerError;
pub use tracker::Tracker;
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
