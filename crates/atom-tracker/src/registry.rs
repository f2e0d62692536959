// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stream name to credential mapping.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Known streams and the credential each one is delivered with.
///
/// A stream is registered on its first tracked record and keeps that
/// credential until [`StreamRegistry::set_credential`] overrides it. All access
/// goes through a single mutex shared by producers and the assembler.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<String, String>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `stream` with `credential` unless it is already known.
    ///
    /// Returns `true` when the stream was newly registered.
    pub fn register(&self, stream: &str, credential: &str) -> bool {
        let mut streams = self.lock();
        if streams.contains_key(stream) {
            return false;
        }
        streams.insert(stream.to_string(), credential.to_string());
        true
    }

    /// Replaces the credential for `stream`, registering it if needed.
    pub fn set_credential(&self, stream: &str, credential: &str) {
        self.lock()
            .insert(stream.to_string(), credential.to_string());
    }

    pub fn credential(&self, stream: &str) -> Option<String> {
        self.lock().get(stream).cloned()
    }

    /// Copy of every stream name, taken under the lock.
    pub fn streams(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
