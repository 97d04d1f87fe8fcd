//! Controller-side session task.
//!
//! One task per connection owns the transport, the reassembler, the
//! sequence counter and the pending table. Callers talk to it through a
//! cloneable [`SessionHandle`]; their suspensions never block the reader or
//! each other. Writes are serialized because only the task writes.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

use super::types::*;
use crate::config::LinkConfig;
use crate::protocol::{encode, Reassembler, Status, MAX_PAYLOAD};
use crate::serial::{Result, SerialError, Transport};

const READ_CHUNK: usize = 1024;
/// About thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    metrics_rx: watch::Receiver<MetricsSnapshot>,
}

impl SessionHandle {
    pub fn metrics_receiver(&self) -> watch::Receiver<MetricsSnapshot> {
        self.metrics_rx.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics_rx.borrow().clone()
    }

    /// Whether the session task has stopped.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    /// Transmit a request and return once it is registered, without waiting
    /// for the reply.
    pub async fn begin(&self, command: impl Into<u8>, payload: impl Into<Bytes>, timeout: Duration) -> Result<PendingReply> {
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let (responder, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Send {
                command: command.into(),
                payload: payload.into(),
                timeout,
                accepted: accepted_tx,
                responder,
            })
            .await
            .map_err(|_| SerialError::ConnectionClosed)?;

        let sequence = accepted_rx.await.map_err(|_| SerialError::ConnectionClosed)??;
        Ok(PendingReply {
            sequence,
            rx,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Send a request and wait for its reply or its deadline.
    pub async fn send(&self, command: impl Into<u8>, payload: impl Into<Bytes>, timeout: Duration) -> Result<Response> {
        self.begin(command, payload, timeout).await?.wait().await
    }

    /// Stop the session task. Outstanding requests fail with `ConnectionClosed`.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }
}

/// A registered request awaiting its reply.
pub struct PendingReply {
    sequence: u8,
    rx: oneshot::Receiver<Result<Response>>,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl PendingReply {
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub async fn wait(self) -> Result<Response> {
        self.rx.await.map_err(|_| SerialError::ConnectionClosed)?
    }

    /// Abandon the request. Bytes already on the wire are unaffected; a late
    /// reply is dropped as unmatched.
    pub async fn cancel(self) {
        let PendingReply { sequence, rx, cmd_tx } = self;
        drop(rx);
        let _ = cmd_tx.send(SessionCommand::Cancel { sequence }).await;
    }
}

pub struct SessionBuilder<T> {
    transport: T,
    max_unframed_bytes: usize,
    command_capacity: usize,
}

impl<T: Transport + 'static> SessionBuilder<T> {
    pub fn new(transport: T) -> Self {
        let defaults = LinkConfig::default();
        Self {
            transport,
            max_unframed_bytes: defaults.max_unframed_bytes,
            command_capacity: defaults.command_capacity,
        }
    }

    pub fn config(mut self, config: &LinkConfig) -> Self {
        self.max_unframed_bytes = config.max_unframed_bytes;
        self.command_capacity = config.command_capacity.max(1);
        self
    }

    /// Spawn the session task on the current tokio runtime.
    pub fn build(self) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(self.command_capacity);
        let (metrics_tx, metrics_rx) = watch::channel(MetricsSnapshot::default());

        tokio::spawn(session_task(self.transport, self.max_unframed_bytes, cmd_rx, metrics_tx));

        SessionHandle { cmd_tx, metrics_rx }
    }
}

struct SessionState {
    pending: HashMap<u8, PendingRequest>,
    next_sequence: u8,
    metrics: MetricsSnapshot,
}

impl SessionState {
    fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_sequence: 1,
            metrics: MetricsSnapshot::default(),
        }
    }

    fn allocate_sequence(&mut self) -> Result<u8> {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        if self.pending.contains_key(&sequence) {
            return Err(SerialError::TooManyOutstanding);
        }
        Ok(sequence)
    }

    /// Forget requests whose callers went away.
    fn sweep_abandoned(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|_, p| !p.responder.is_closed());
        self.metrics.requests_cancelled += (before - self.pending.len()) as u64;
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<u8> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();

        for seq in expired {
            if let Some(p) = self.pending.remove(&seq) {
                self.metrics.request_timeouts += 1;
                log::warn!(
                    "Request seq={} cmd=0x{:02X} timed out after {:?}",
                    seq,
                    p.command,
                    p.deadline - p.issued_at
                );
                let _ = p.responder.send(Err(SerialError::Timeout));
            }
        }
    }

    fn resolve(&mut self, sequence: u8, command: u8, status: Status, payload: Bytes) {
        let Some(p) = self.pending.remove(&sequence) else {
            self.metrics.unmatched_frames += 1;
            log::debug!("Dropping unmatched frame seq={} cmd=0x{:02X}", sequence, command);
            return;
        };

        if p.command != command {
            log::debug!(
                "Reply seq={} carries cmd=0x{:02X}, request was 0x{:02X}",
                sequence,
                command,
                p.command
            );
        }

        let outcome = if status.is_ok() {
            self.metrics.requests_completed += 1;
            self.metrics.record_latency(p.issued_at.elapsed().as_millis() as u64);
            Ok(Response { command, payload })
        } else {
            self.metrics.request_errors += 1;
            log::debug!("Request seq={} rejected: {}", sequence, status);
            Err(SerialError::Device(status))
        };
        let _ = p.responder.send(outcome);
    }

    fn fail_all(&mut self, make_err: impl Fn() -> SerialError) {
        for (_, p) in self.pending.drain() {
            let _ = p.responder.send(Err(make_err()));
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    fn publish(&mut self, metrics_tx: &watch::Sender<MetricsSnapshot>) {
        self.metrics.outstanding = self.pending.len();
        let _ = metrics_tx.send(self.metrics.clone());
    }
}

/// `issued_at + timeout`, saturating to a deadline that never fires in
/// practice instead of overflowing.
fn deadline_after(issued_at: Instant, timeout: Duration) -> Instant {
    issued_at
        .checked_add(timeout)
        .unwrap_or_else(|| issued_at + FAR_FUTURE)
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub(crate) async fn session_task<T: Transport>(
    mut transport: T,
    max_unframed_bytes: usize,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    metrics_tx: watch::Sender<MetricsSnapshot>,
) {
    use tokio::select;

    let mut state = SessionState::new();
    let mut reassembler = Reassembler::new();
    let mut buf = vec![0u8; READ_CHUNK];

    let exit: Option<SerialError> = loop {
        let deadline = state.next_deadline();
        select! {
            maybe_cmd = cmd_rx.recv() => {
                match maybe_cmd {
                    Some(SessionCommand::Send { command, payload, timeout, accepted, responder }) => {
                        state.sweep_abandoned();
                        if payload.len() > MAX_PAYLOAD {
                            let _ = accepted.send(Err(crate::protocol::FrameError::PayloadTooLarge(payload.len()).into()));
                            continue;
                        }
                        let sequence = match state.allocate_sequence() {
                            Ok(seq) => seq,
                            Err(e) => {
                                log::warn!("Rejecting cmd=0x{:02X}: {} outstanding", command, state.pending.len());
                                let _ = accepted.send(Err(e));
                                continue;
                            }
                        };
                        let bytes = match encode(command, sequence, Status::Ok, &payload) {
                            Ok(bytes) => bytes,
                            Err(e) => { let _ = accepted.send(Err(e.into())); continue; }
                        };
                        log::trace!("tx {}", hex::encode(&bytes));
                        if let Err(e) = transport.send_data(&bytes).await {
                            state.metrics.last_error = Some(e.to_string());
                            log::warn!("Write failed for seq={}: {}", sequence, e);
                            let _ = accepted.send(Err(e));
                            state.publish(&metrics_tx);
                            continue;
                        }
                        state.metrics.frames_sent += 1;
                        let issued_at = Instant::now();
                        state.pending.insert(sequence, PendingRequest {
                            command,
                            issued_at,
                            deadline: deadline_after(issued_at, timeout),
                            responder,
                        });
                        let _ = accepted.send(Ok(sequence));
                        state.publish(&metrics_tx);
                    }
                    Some(SessionCommand::Cancel { sequence }) => {
                        // Only drop the slot if it still belongs to the cancelled caller.
                        if state.pending.get(&sequence).is_some_and(|p| p.responder.is_closed()) {
                            state.pending.remove(&sequence);
                            state.metrics.requests_cancelled += 1;
                            log::debug!("Request seq={} cancelled", sequence);
                            state.publish(&metrics_tx);
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => break None,
                }
            },
            read_res = transport.read_data(&mut buf) => {
                match read_res {
                    Ok(0) => break Some(SerialError::ConnectionClosed),
                    Ok(n) => {
                        log::trace!("rx {}", hex::encode(&buf[..n]));
                        for frame in reassembler.feed(&buf[..n]) {
                            state.metrics.frames_received += 1;
                            state.resolve(frame.sequence, frame.command, frame.status, frame.payload);
                        }
                        state.metrics.bytes_discarded = reassembler.discarded();
                        let unframed = reassembler.unframed();
                        if unframed > max_unframed_bytes {
                            log::warn!("Desynchronized: {} bytes discarded without a frame", unframed);
                            state.metrics.last_error = Some(SerialError::Desynchronized(unframed).to_string());
                            reassembler.clear();
                            state.fail_all(|| SerialError::Desynchronized(unframed));
                        }
                        state.publish(&metrics_tx);
                    }
                    Err(e) => break Some(e),
                }
            },
            _ = wait_deadline(deadline) => {
                state.expire(Instant::now());
                state.sweep_abandoned();
                state.publish(&metrics_tx);
            }
        }
    };

    match &exit {
        Some(e) => {
            log::warn!("Session ended: {}", e);
            state.metrics.last_error = Some(e.to_string());
        }
        None => log::info!("Session shut down"),
    }
    state.fail_all(|| SerialError::ConnectionClosed);
    state.publish(&metrics_tx);
}
