// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::time::SystemTime;
use std::{env, sync::Arc};

use serde::Deserialize;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use atom_tracker::{HttpTransport, Tracker, TrackerConfig, TrackerError};

/// One input line: `{"stream": "...", "data": ..., "auth": "..."}`.
///
/// String data is tracked as-is, anything else is re-serialized as JSON.
#[derive(Debug, Deserialize)]
struct InputRecord {
    stream: String,
    data: serde_json::Value,
    #[serde(default)]
    auth: Option<String>,
}

impl InputRecord {
    fn payload(&self) -> String {
        match &self.data {
            serde_json::Value::String(data) => data.clone(),
            other => other.to_string(),
        }
    }
}

fn parse_line(line: &str) -> Option<Result<InputRecord, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

fn init_logging(log_level: &str) {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
    }
    debug!("Logging subsystem enabled");
}

#[tokio::main]
pub async fn main() {
    let config = TrackerConfig::from_env();
    let log_level = match &config {
        Ok(config) => config.log_level.clone(),
        Err(_) => env::var("ATOM_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or("info".to_string()),
    };
    init_logging(&log_level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}. Shutting down relay.", e);
            return;
        }
    };

    let transport = Arc::new(HttpTransport::new(&config));
    let callback = |_: SystemTime, status: Option<u16>, message: &str, batch: &[String]| {
        warn!(
            ?status,
            records = batch.len(),
            "Delivery error reported: {}",
            message
        );
    };
    let tracker = match Tracker::start(config, transport, Arc::new(callback)) {
        Ok(tracker) => tracker,
        Err(e) => {
            error!("Failed to start tracker: {}", e);
            return;
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_ctrl_c(shutdown.clone(), tracker.cancellation_token()));

    relay_stdin(&tracker, &shutdown).await;

    info!("Stopping relay");
    tracker.stop().await;
}

/// First Ctrl-C requests a graceful stop, the second one cancels the tracker.
async fn watch_ctrl_c(shutdown: CancellationToken, hard_stop: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Unable to listen for Ctrl-C");
        return;
    }
    info!("Received Ctrl-C, flushing before exit");
    shutdown.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Received second Ctrl-C, exiting without draining");
        hard_stop.cancel();
    }
}

async fn relay_stdin(tracker: &Tracker, shutdown: &CancellationToken) {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut relayed: u64 = 0;
    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Reached end of input");
                break;
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let record = match parse_line(&line) {
            None => continue,
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                warn!("Skipping malformed line: {}", e);
                continue;
            }
        };

        match tracker
            .track_with_wait(&record.stream, record.payload(), record.auth.as_deref())
            .await
        {
            Ok(()) => relayed += 1,
            Err(TrackerError::TrackerStopped) => break,
            Err(e) => warn!(stream = %record.stream, "Record dropped: {}", e),
        }
    }
    info!("Relayed {} records", relayed);
}
