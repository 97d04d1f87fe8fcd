//! Framed request/response link between a controller and a tool peripheral.
//!
//! The controller side runs one session task per connection
//! ([`session::SessionBuilder`]); the peripheral side runs a
//! [`dispatch::Dispatcher`] over the same byte transport.

pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod serial;
pub mod session;
pub mod tools;

pub use config::LinkConfig;
pub use dispatch::Dispatcher;
pub use protocol::{Frame, FrameError, Reassembler, Status};
pub use serial::{SerialError, StreamTransport, Transport};
pub use session::{SessionBuilder, SessionHandle};
pub use tools::{Command, ToolClient};
