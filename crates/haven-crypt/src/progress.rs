//! Progress events for long operations.
//!
//! An operation emits into a [`ProgressSink`]; the caller drains the paired
//! [`ProgressStream`]. Each stage has a fixed percentage and the sink never
//! lets the reported percentage go backwards. The stream ends when the sink
//! is dropped.

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;

/// Discrete stage markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ReadingInput,
    KeyGenerated,
    LocalCipherDone,
    NetworkWrapBegin,
    NetworkWrapDone,
    AuthProofReady,
    NetworkUnwrapBegin,
    NetworkUnwrapDone,
    LocalDecipherDone,
    IntegrityVerified,
    WritingOutput,
    Complete,
}

impl Stage {
    /// Percentage reported when this stage is reached.
    pub fn percentage(self) -> u8 {
        match self {
            Stage::ReadingInput => 5,
            Stage::KeyGenerated => 10,
            Stage::AuthProofReady => 20,
            Stage::NetworkUnwrapBegin => 30,
            Stage::LocalCipherDone => 40,
            Stage::NetworkWrapBegin => 50,
            Stage::NetworkUnwrapDone => 60,
            Stage::LocalDecipherDone => 85,
            Stage::NetworkWrapDone | Stage::IntegrityVerified => 90,
            Stage::WritingOutput => 95,
            Stage::Complete => 100,
        }
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub stage: Stage,
    pub bytes_processed: u64,
    pub total_bytes: u64,
    pub percentage: u8,
}

/// Sending half.
#[derive(Debug)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    last: AtomicU8,
}

/// Receiving half.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

/// Create a connected sink and stream.
pub fn channel() -> (ProgressSink, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSink {
            tx,
            last: AtomicU8::new(0),
        },
        ProgressStream { rx },
    )
}

impl ProgressSink {
    /// Report reaching `stage`. Never blocks and never fails.
    pub fn emit(&self, stage: Stage, bytes_processed: u64, total_bytes: u64) {
        let percentage = self.last.fetch_max(stage.percentage(), Ordering::SeqCst).max(stage.percentage());
        let _ = self.tx.send(ProgressEvent {
            stage,
            bytes_processed,
            total_bytes,
            percentage,
        });
    }
}

impl ProgressStream {
    /// Next event, or `None` once the sink is gone and the queue is drained.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Drain everything currently queued without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Emit into an optional sink.
pub(crate) fn report(sink: Option<&ProgressSink>, stage: Stage, bytes_processed: u64, total_bytes: u64) {
    if let Some(sink) = sink {
        sink.emit(stage, bytes_processed, total_bytes);
    }
}
