pub mod chunked;
pub mod manager;
pub mod types;

pub use chunked::{complete_sized, fetch_remaining, ChunkSource, ChunkedTransfer, ContinueSource, SizedResponse};
pub use manager::{PendingReply, SessionBuilder, SessionHandle};
pub use types::{MetricsSnapshot, Response};
