//! Session domain module.
//!
//! # Module Structure
//!
//! - `message`: conversation message types (`MessageRole`, `ChatMessage`)
//! - `context`: conversation context identity (`ContextRef`, `WebPosting`)
//! - `store`: the single-writer session store (`SessionStore`, `TurnToken`)
//! - `bridge`: persistence mirroring around the store (`PersistenceBridge`)
//! - `repository`: persistence traits

mod bridge;
mod context;
mod message;
mod repository;
mod store;

pub use bridge::PersistenceBridge;
pub use context::{ContextRef, WebPosting};
pub use message::{ChatMessage, MessageRole};
pub use repository::{ConversationRepository, WebPostingRepository};
pub use store::{SessionState, SessionStore, TurnToken};
