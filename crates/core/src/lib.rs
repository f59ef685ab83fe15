//! # QuillClaw Core
//!
//! Domain types, traits, and error definitions for the QuillClaw document
//! agent runtime. The execution loop in `quillclaw-agent` is written purely
//! against the traits defined here.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait:
//! - [`ReasoningService`]: the model backend that turns a prompt into a plan
//! - [`Tool`] / [`ToolRegistry`]: the operations an agent may request
//! - [`OutlineProvider`]: document structure lookup for editing agents
//!
//! Implementations live with the host application, which keeps the loop
//! testable with scripted mocks.

pub mod agent;
pub mod error;
pub mod event;
pub mod outline;
pub mod reasoning;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentCategory, AgentProfile};
pub use error::{ReasoningError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use outline::{NoOutline, OutlineProvider};
pub use reasoning::ReasoningService;
pub use tool::{Tool, ToolDefinition, ToolOutcome, ToolRegistry};
