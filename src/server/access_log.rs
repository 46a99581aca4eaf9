use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

use crate::models::client::ClientKey;
use crate::models::threat::Outcome;

/// Events buffered between request tasks and the writer.
pub const DEFAULT_CAPACITY: usize = 4_096;

/// One line per dispatched request.
#[derive(Debug, Clone, Serialize)]
pub struct AccessEvent {
    pub ts: DateTime<Utc>,
    pub client: ClientKey,
    pub method: String,
    pub target: String,
    pub status: u16,
    pub outcome: Outcome,
    pub us: u64,
}

/// Fire-and-forget access log.
///
/// `emit` never waits: events go through a bounded channel to a writer task
/// and are dropped (and counted) when the channel is full or closed.
pub struct AccessLog {
    tx: Option<mpsc::Sender<AccessEvent>>,
    dropped: AtomicU64,
}

enum Sink {
    /// Lines are handed to a dedicated writer thread. Dropping the guard
    /// flushes what is queued.
    Writer(NonBlocking, WorkerGuard),
    Tracing,
}

impl AccessLog {
    /// An access log that discards everything.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: AtomicU64::new(0),
        }
    }

    /// An access log feeding the returned receiver. No writer task is spawned.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AccessEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Start the writer task. An empty `path` logs events through `tracing`;
    /// otherwise each event is appended to `path` as one JSON line.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(path: &str, capacity: usize) -> std::io::Result<(Self, JoinHandle<()>)> {
        if path.is_empty() {
            let (log, rx) = Self::channel(capacity);
            return Ok((log, tokio::spawn(write_events(rx, Sink::Tracing))));
        }
        Ok(Self::spawn_writer(open_append(path)?, capacity))
    }

    /// Start the writer task over any blocking writer. File I/O happens on
    /// the `tracing_appender` worker thread, never on a runtime thread.
    pub fn spawn_writer<W>(writer: W, capacity: usize) -> (Self, JoinHandle<()>)
    where
        W: Write + Send + 'static,
    {
        let (writer, guard) = tracing_appender::non_blocking(writer);
        let (log, rx) = Self::channel(capacity);
        let handle = tokio::spawn(write_events(rx, Sink::Writer(writer, guard)));
        (log, handle)
    }

    /// Like [`AccessLog::spawn`], but falls back to the `tracing` sink when
    /// the file cannot be opened.
    pub fn spawn_or_fallback(path: &str, capacity: usize) -> (Self, JoinHandle<()>) {
        match Self::spawn(path, capacity) {
            Ok(spawned) => {
                if !path.is_empty() {
                    info!(path = path, "Access log enabled");
                }
                spawned
            }
            Err(e) => {
                error!(path = path, error = %e, "Failed to open access log, using tracing output");
                let (log, rx) = Self::channel(capacity);
                (log, tokio::spawn(write_events(rx, Sink::Tracing)))
            }
        }
    }

    pub fn emit(&self, event: AccessEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.try_send(event).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 1_000 == 0 {
                warn!(dropped = dropped, "Access log backlogged, dropping events");
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn open_append(path: &str) -> std::io::Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

async fn write_events(mut rx: mpsc::Receiver<AccessEvent>, mut sink: Sink) {
    while let Some(event) = rx.recv().await {
        match &mut sink {
            Sink::Writer(writer, _guard) => match serde_json::to_string(&event) {
                Ok(mut line) => {
                    line.push('\n');
                    if let Err(e) = writer.write_all(line.as_bytes()) {
                        error!(error = %e, "Access log write failed");
                    }
                }
                Err(e) => error!(error = %e, "Access log serialisation failed"),
            },
            Sink::Tracing => info!(
                target: "access",
                client = %event.client,
                method = %event.method,
                target_uri = %event.target,
                status = event.status,
                outcome = %event.outcome,
                us = event.us,
                "request"
            ),
        }
    }
}
