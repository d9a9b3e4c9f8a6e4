//! Jiwon interaction layer: the remote assistant boundary.
//!
//! Consumes the streaming chat protocol, manages server-side cached context,
//! and coordinates sends with exactly-once cache-miss recovery.

pub mod chat;
pub mod config;
pub mod context;
pub mod protocol;
pub mod stream;

pub use chat::{ChatService, FALLBACK_ANSWER, SendStatus};
pub use config::ApiConfig;
pub use context::{HttpContextClient, RemoteContext};
pub use protocol::{CACHE_MISS_CODE, ChatRequest, StreamEvent, parse_sse_line};
pub use stream::{HttpChatStream, NullObserver, StatusObserver, TurnError, TurnTransport};
