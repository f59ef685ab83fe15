//! Agent thought memory.
//!
//! Agents record structured notes about their own reasoning through a
//! designated tool call. Those notes never enter the raw iteration history;
//! they reach later prompts only through [`AgentMemoryStore::formatted`],
//! which keeps the newest records intact and abridges the rest.

pub mod format;
pub mod store;
pub mod thought;

pub use format::{CONTINUATION_GUIDANCE, MemorySettings, format_thoughts};
pub use store::AgentMemoryStore;
pub use thought::{ThoughtContent, ThoughtError, ThoughtKind, ThoughtRecord};
