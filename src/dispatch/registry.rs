//! Handler registry keyed by command identifier.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::protocol::Status;

/// What a tool handler hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub payload: Bytes,
}

impl Reply {
    pub fn ok(payload: impl Into<Bytes>) -> Self {
        Self {
            status: Status::Ok,
            payload: payload.into(),
        }
    }

    pub fn empty() -> Self {
        Self::ok(Bytes::new())
    }

    pub fn error(status: Status) -> Self {
        Self {
            status,
            payload: Bytes::new(),
        }
    }
}

/// A hardware operation behind one command. Failure is expressed only
/// through a non-zero status in the reply.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn handle(&self, command: u8, payload: &[u8]) -> Reply;
}

#[async_trait::async_trait]
impl<H: ToolHandler> ToolHandler for Arc<H> {
    async fn handle(&self, command: u8, payload: &[u8]) -> Reply {
        (**self).handle(command, payload).await
    }
}

/// Wraps a synchronous closure as a handler.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait::async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(&[u8]) -> Reply + Send + Sync + 'static,
{
    async fn handle(&self, _command: u8, payload: &[u8]) -> Reply {
        (self.f)(payload)
    }
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&[u8]) -> Reply + Send + Sync + 'static,
{
    FnHandler { f }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u8, Box<dyn ToolHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `command`, replacing any previous one.
    pub fn register(&mut self, command: impl Into<u8>, handler: impl ToolHandler) {
        let command = command.into();
        if self.handlers.insert(command, Box::new(handler)).is_some() {
            log::warn!("Replaced handler for cmd=0x{:02X}", command);
        }
    }

    pub fn get(&self, command: u8) -> Option<&dyn ToolHandler> {
        self.handlers.get(&command).map(|h| h.as_ref())
    }
}
