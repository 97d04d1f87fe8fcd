//! Peripheral-side command dispatch.
//!
//! ```text
//! transport ──▶ Reassembler ──▶ Dispatcher ──▶ ToolHandler
//!     ▲                              │
//!     └────────── encode ◀───────────┘
//! ```
//!
//! Requests are handled strictly one at a time, in decode order. The
//! dispatcher holds no hardware state of its own.

pub mod handlers;
pub mod registry;

pub use registry::{handler_fn, FnHandler, HandlerRegistry, Reply, ToolHandler};

use crate::protocol::{Frame, Reassembler, Status, MAX_PAYLOAD};
use crate::serial::{Result, Transport};

const READ_CHUNK: usize = 1024;

#[derive(Default)]
pub struct Dispatcher {
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: impl Into<u8>, handler: impl ToolHandler) -> &mut Self {
        self.registry.register(command, handler);
        self
    }

    /// Produce the response frame for one request. Never fails: unknown
    /// commands yield `Invalid`, oversized replies yield `Unknown`.
    pub async fn dispatch(&self, request: &Frame) -> Frame {
        let Some(handler) = self.registry.get(request.command) else {
            log::debug!("No handler for cmd=0x{:02X}", request.command);
            return Frame::response_to(request, Status::Invalid, Vec::new());
        };

        let reply = handler.handle(request.command, &request.payload).await;
        if reply.payload.len() > MAX_PAYLOAD {
            log::warn!(
                "Handler for cmd=0x{:02X} produced {} bytes, max is {}",
                request.command,
                reply.payload.len(),
                MAX_PAYLOAD
            );
            return Frame::response_to(request, Status::Unknown, Vec::new());
        }

        Frame::response_to(request, reply.status, reply.payload)
    }

    /// Serve requests from `transport` until the peer closes it.
    pub async fn serve<T: Transport>(&self, mut transport: T) -> Result<()> {
        let mut reassembler = Reassembler::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let n = transport.read_data(&mut buf).await?;
            if n == 0 {
                log::info!("Controller closed the link");
                return Ok(());
            }

            for request in reassembler.feed(&buf[..n]) {
                log::debug!("Request seq={} cmd=0x{:02X}", request.sequence, request.command);
                let response = self.dispatch(&request).await;
                let bytes = response.to_bytes()?;
                transport.send_data(&bytes).await?;
            }
        }
    }
}
