// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery attempt loop for a single batch.
//!
//! One pass makes up to `retry_max_count` attempts:
//!
//! - transport failure: reported once, the batch is dropped
//! - `2xx`/`3xx`: delivered
//! - `4xx`: reported once, the batch is dropped
//! - `5xx` (and anything below 200): back off, report, try again
//!
//! A pass that runs out of attempts returns [`DeliveryOutcome::Exhausted`] and
//! the caller requeues the whole batch as a fresh task.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::callback::{self, ErrorCallback};
use crate::constants::{DEBUG_PREVIEW_CHARS, ERROR_PREVIEW_CHARS};
use crate::record::DeliveryTask;
use crate::settings::SharedSettings;
use crate::transport::{Transport, TransportRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Client error, not retried
    Rejected,
    /// No response, not retried
    Failed,
    /// Every attempt got a server error
    Exhausted,
    /// Hard stop while backing off
    Cancelled,
}

/// Full-jitter backoff: uniform in `[0, min(cap, base * 2^attempt)]`.
pub fn backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let ceiling = 2u32
        .checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(cap, |exponential| exponential.min(cap));
    if ceiling.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..=ceiling)
}

/// Everything a worker needs to deliver batches.
#[derive(Clone)]
pub struct Deliverer {
    pub transport: Arc<dyn Transport>,
    pub settings: Arc<SharedSettings>,
    pub callback: Arc<dyn ErrorCallback>,
    pub cancel_token: CancellationToken,
}

impl Deliverer {
    pub async fn deliver(&self, task: &DeliveryTask) -> DeliveryOutcome {
        let settings = self.settings.snapshot();
        let request = TransportRequest {
            endpoint: settings.endpoint.clone(),
            credential: task.credential.clone(),
            stream: task.stream.clone(),
            batch: Arc::clone(&task.batch),
        };

        let mut attempt = 0;
        while attempt < settings.retry_max_count {
            if attempt == 0 && settings.is_debug {
                debug!(
                    stream = %task.stream,
                    "Sending batch: {}",
                    task.preview(DEBUG_PREVIEW_CHARS)
                );
            }

            let response = match self
                .transport
                .deliver(&request, settings.request_timeout)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    error!(
                        stream = %task.stream,
                        "Failed to send batch: {}, data: {}",
                        e,
                        task.preview(ERROR_PREVIEW_CHARS)
                    );
                    callback::notify(
                        self.callback.as_ref(),
                        &task.stream,
                        None,
                        &e.to_string(),
                        &task.batch,
                    );
                    return DeliveryOutcome::Failed;
                }
            };

            let status = response.status;
            let message = response.error.or(response.body).unwrap_or_default();

            if attempt == 0 && settings.is_debug {
                debug!(stream = %task.stream, status, "Got status for first attempt");
            }

            if (200..400).contains(&status) {
                debug!(
                    stream = %task.stream,
                    status,
                    attempt,
                    "Delivered batch of {} records",
                    task.len()
                );
                return DeliveryOutcome::Delivered;
            }

            if (400..500).contains(&status) {
                error!(
                    stream = %task.stream,
                    status,
                    "Batch rejected: {}, data: {}",
                    message,
                    task.preview(ERROR_PREVIEW_CHARS)
                );
                callback::notify(
                    self.callback.as_ref(),
                    &task.stream,
                    Some(status),
                    &message,
                    &task.batch,
                );
                return DeliveryOutcome::Rejected;
            }

            let delay = backoff(
                attempt,
                settings.retry_backoff_base,
                settings.retry_max_time,
            );
            if settings.is_debug {
                debug!(stream = %task.stream, status, attempt, ?delay, "Backing off");
            }
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    return DeliveryOutcome::Cancelled;
                }
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;

            error!(
                stream = %task.stream,
                status,
                attempt,
                "Server error: {}, data: {}",
                message,
                task.preview(ERROR_PREVIEW_CHARS)
            );
            callback::notify(
                self.callback.as_ref(),
                &task.stream,
                Some(status),
                &message,
                &task.batch,
            );
        }

        warn!(
            stream = %task.stream,
            attempts = settings.retry_max_count,
            "Retries exhausted, requeueing batch of {} records",
            task.len()
        );
        DeliveryOutcome::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::NoopErrorCallback;
    use crate::config::TrackerConfig;
    use crate::settings::Settings;
    use crate::test_support::{RecordingCallback, ScriptedTransport, Step};
    use proptest::prelude::*;

    fn deliverer(
        transport: Arc<ScriptedTransport>,
        callback: Arc<dyn ErrorCallback>,
        retry_max_count: u32,
    ) -> Deliverer {
        let config = TrackerConfig {
            retry_max_count,
            retry_backoff_base: Duration::from_millis(1),
            retry_max_time: Duration::from_millis(2),
            ..Default::default()
        };
        Deliverer {
            transport,
            settings: Arc::new(SharedSettings::new(Settings::from(&config))),
            callback,
            cancel_token: CancellationToken::new(),
        }
    }

    fn task() -> DeliveryTask {
        DeliveryTask::new(
            "clicks".to_string(),
            "key".to_string(),
            vec!["a".to_string(), "b".to_string()],
        )
    }

    #[test]
    fn test_backoff_example_is_capped() {
        for _ in 0..100 {
            let delay = backoff(20, Duration::from_millis(500), Duration::from_millis(60_000));
            assert!(delay <= Duration::from_millis(60_000));
        }
    }

    #[test]
    fn test_backoff_huge_attempt_does_not_overflow() {
        let delay = backoff(u32::MAX, Duration::from_secs(3), Duration::from_secs(30));
        assert!(delay <= Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_zero_base() {
        assert_eq!(
            backoff(5, Duration::ZERO, Duration::from_secs(1)),
            Duration::ZERO
        );
    }

    proptest! {
        #[test]
        fn prop_backoff_within_bounds(
            attempt in 0u32..64,
            base_ms in 0u64..10_000,
            cap_ms in 0u64..100_000,
        ) {
            let base = Duration::from_millis(base_ms);
            let cap = Duration::from_millis(cap_ms);
            let delay = backoff(attempt, base, cap);

            let exponential = 2u32
                .checked_pow(attempt)
                .and_then(|factor| base.checked_mul(factor))
                .unwrap_or(cap);
            prop_assert!(delay <= cap.min(exponential));
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let transport = ScriptedTransport::always(200);
        let callback = RecordingCallback::new();
        let outcome = deliverer(transport.clone(), callback.clone(), 3)
            .deliver(&task())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(transport.calls(), 1);
        assert!(callback.events().is_empty());

        let request = &transport.requests()[0];
        assert_eq!(request.stream, "clicks");
        assert_eq!(request.credential, "key");
        assert_eq!(&*request.batch, ["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let transport = ScriptedTransport::always(400);
        let callback = RecordingCallback::new();
        let outcome = deliverer(transport.clone(), callback.clone(), 5)
            .deliver(&task())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Rejected);
        assert_eq!(transport.calls(), 1);
        let events = callback.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, Some(400));
        assert_eq!(events[0].2, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_terminal() {
        let transport = ScriptedTransport::new(vec![Step::Fail], 200);
        let callback = RecordingCallback::new();
        let outcome = deliverer(transport.clone(), callback.clone(), 5)
            .deliver(&task())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Failed);
        assert_eq!(transport.calls(), 1);
        let events = callback.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, None);
    }

    #[tokio::test]
    async fn test_server_errors_then_success() {
        let transport = ScriptedTransport::new(vec![Step::Status(503), Step::Status(500)], 200);
        let callback = RecordingCallback::new();
        let outcome = deliverer(transport.clone(), callback.clone(), 5)
            .deliver(&task())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(transport.calls(), 3);
        assert_eq!(callback.events().len(), 2);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_attempts() {
        let transport = ScriptedTransport::always(503);
        let callback = RecordingCallback::new();
        let outcome = deliverer(transport.clone(), callback.clone(), 4)
            .deliver(&task())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Exhausted);
        assert_eq!(transport.calls(), 4);
        assert_eq!(callback.events().len(), 4);
    }

    #[tokio::test]
    async fn test_informational_status_is_retried() {
        let transport = ScriptedTransport::new(vec![Step::Status(100)], 204);
        let outcome = deliverer(transport.clone(), Arc::new(NoopErrorCallback), 3)
            .deliver(&task())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let transport = ScriptedTransport::always(503);
        let deliverer = deliverer(transport.clone(), Arc::new(NoopErrorCallback), 3);
        deliverer.settings.set_debug(true);
        deliverer.cancel_token.cancel();

        let outcome = deliverer.deliver(&task()).await;
        assert_eq!(outcome, DeliveryOutcome::Cancelled);
        assert_eq!(transport.calls(), 1);
    }
}
