// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Values moving through the pipeline.

use std::fmt;
use std::sync::Arc;

/// A single tracked event, already serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    stream: Arc<str>,
    payload: String,
}

impl Record {
    pub fn new(stream: &str, payload: String) -> Self {
        Self {
            stream: Arc::from(stream),
            payload,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Size counted against the batch byte threshold.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// A flushed batch for one stream, ready for delivery.
///
/// Built from a buffer snapshot; the buffer is cleared before the task is
/// handed to the dispatch pool, so a task never shares state with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTask {
    pub stream: String,
    pub credential: String,
    pub batch: Arc<[String]>,
}

impl DeliveryTask {
    pub fn new(stream: String, credential: String, batch: Vec<String>) -> Self {
        Self {
            stream,
            credential,
            batch: batch.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Short rendering of the batch for log lines.
    pub fn preview(&self, max_chars: usize) -> BatchPreview<'_> {
        BatchPreview {
            batch: &self.batch,
            max_chars,
        }
    }
}

/// Truncated `Display` of a batch, used so large payloads don't flood the logs.
pub struct BatchPreview<'a> {
    batch: &'a [String],
    max_chars: usize,
}

impl fmt::Display for BatchPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = format!("{:?}", self.batch);
        match rendered.char_indices().nth(self.max_chars) {
            Some((cut, _)) => write!(f, "{}...", &rendered[..cut]),
            None => f.write_str(&rendered),
        }
    }
}
