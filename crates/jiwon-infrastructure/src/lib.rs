//! Jiwon infrastructure layer: JSON slot persistence.
//!
//! Implements the core persistence traits over one-JSON-file-per-slot
//! storage beneath a base directory (default `~/.jiwon`). Malformed slots
//! always read as absent so damaged state degrades to a fresh conversation.

mod conversation_repository;
mod json_slot;
mod state_repository;
mod web_posting_repository;

pub use conversation_repository::JsonConversationRepository;
pub use state_repository::JsonStateRepository;
pub use web_posting_repository::JsonWebPostingRepository;
