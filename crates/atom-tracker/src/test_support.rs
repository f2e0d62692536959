// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted transport and recording callback shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::callback::ErrorCallback;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

pub enum Step {
    Status(u16),
    Fail,
}

/// Replays `script` in order, then answers `fallback` forever.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: u16,
    delivered: Mutex<Vec<(TransportRequest, Option<u16>)>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Step>, fallback: u16) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn always(status: u16) -> Arc<Self> {
        Self::new(Vec::new(), status)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub fn calls(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    /// Batches of requests answered with a success status.
    pub fn successes(&self) -> Vec<Vec<String>> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, status)| matches!(status, Some(200..=399)))
            .map(|(request, _)| request.batch.to_vec())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn deliver(
        &self,
        request: &TransportRequest,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Status(self.fallback));
        let (status, result) = match step {
            Step::Status(status) => (
                Some(status),
                Ok(TransportResponse::from_status(status, format!("status {status}"))),
            ),
            Step::Fail => (
                None,
                Err(TransportError::Connection("connection refused".to_string())),
            ),
        };
        self.delivered
            .lock()
            .unwrap()
            .push((request.clone(), status));
        result
    }
}

#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<(Option<u16>, String, Vec<String>)>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(Option<u16>, String, Vec<String>)> {
        self.events.lock().unwrap().clone()
    }
}

impl ErrorCallback for RecordingCallback {
    fn on_error(&self, _: SystemTime, status: Option<u16>, message: &str, batch: &[String]) {
        self.events
            .lock()
            .unwrap()
            .push((status, message.to_string(), batch.to_vec()));
    }
}
