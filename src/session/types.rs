//! Session manager types.
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::serial::SerialError;

/// Successful reply to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub command: u8,
    pub payload: Bytes,
}

pub type Responder = oneshot::Sender<Result<Response, SerialError>>;

/// One outstanding request, keyed by sequence number in the session task.
pub struct PendingRequest {
    pub command: u8,
    pub issued_at: Instant,
    pub deadline: Instant,
    pub responder: Responder,
}

#[derive(Debug)]
pub enum SessionCommand {
    Send {
        command: u8,
        payload: Bytes,
        timeout: Duration,
        accepted: oneshot::Sender<Result<u8, SerialError>>,
        responder: Responder,
    },
    Cancel {
        sequence: u8,
    },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub requests_completed: u64,
    pub request_timeouts: u64,
    pub request_errors: u64,
    pub requests_cancelled: u64,
    pub unmatched_frames: u64,
    pub bytes_discarded: u64,
    pub outstanding: usize,
    pub last_error: Option<String>,
    pub last_latency_ms: Option<u64>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub avg_latency_ms: Option<f64>,
    pub ema_latency_ms: Option<f64>,
    pub latency_samples: u64,
}

impl MetricsSnapshot {
    pub(crate) fn record_latency(&mut self, latency_ms: u64) {
        self.last_latency_ms = Some(latency_ms);
        self.min_latency_ms = Some(self.min_latency_ms.map_or(latency_ms, |m| m.min(latency_ms)));
        self.max_latency_ms = Some(self.max_latency_ms.map_or(latency_ms, |m| m.max(latency_ms)));
        self.latency_samples += 1;
        let samples = self.latency_samples as f64;
        self.avg_latency_ms = Some(match self.avg_latency_ms {
            Some(avg) if self.latency_samples > 1 => (avg * (samples - 1.0) + latency_ms as f64) / samples,
            _ => latency_ms as f64,
        });
        self.ema_latency_ms = Some(match self.ema_latency_ms {
            Some(prev) => prev * 0.8 + latency_ms as f64 * 0.2,
            None => latency_ms as f64,
        });
    }
}
