//! Caller-facing message stream and the merger that produces it.

pub mod merger;
pub mod message;

pub use merger::{merge, MergedItem};
pub use message::{Message, MessageKind, Role};
