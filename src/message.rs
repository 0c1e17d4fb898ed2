//! Conversation turn representations
//!
//! One turn exists in three shapes: the durable [`StorageMessage`], the
//! render-ready [`DisplayMessage`] and the [`ModelHistoryMessage`] sent to the
//! model. Conversion between them lives in [`convert`] and is pure.

mod content;
pub mod convert;
mod types;

#[cfg(test)]
mod proptests;

pub use content::{ContentError, StructuredContent, ToolCallEntry, ToolStatus};
pub use convert::{display_thread, from_params, model_thread, to_display, to_model_history, MessageBody};
pub use types::*;
