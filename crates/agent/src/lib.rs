//! The resumable agent execution loop, the core of QuillClaw.
//!
//! Each run follows a **Plan → Act → Observe** cycle:
//!
//! 1. **Assemble** a prompt from the agent's instructions, its task, its
//!    recorded thoughts and the history of earlier iterations
//! 2. **Ask** the reasoning service for a JSON plan of tool calls
//! 3. **Parse** the plan, repairing it once if the model drifted from JSON
//! 4. **Act**: record thoughts, run tools, suspend for the user, or finish
//! 5. **Loop back** to step 1 with the new results in the history
//!
//! A run ends when the agent finishes, fails irrecoverably, or asks the user
//! a question. A suspended run is plain serde data; resuming it rebuilds
//! exactly the same working context, because thought memory is kept across
//! the pause and cleared only when a fresh run starts.

pub mod context;
pub mod history;
pub mod loop_runner;
pub mod memory;
pub mod plan;
pub mod serializer;
pub mod settings;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{PromptAssembler, PromptContext, PromptInput, PromptSection, SectionKind};
pub use history::{HistoryEntry, HistoryEvent, IterationHistory};
pub use loop_runner::{ActiveRun, ExecutionLoop};
pub use memory::{
    AgentMemoryStore, MemorySettings, ThoughtContent, ThoughtError, ThoughtKind, ThoughtRecord,
};
pub use plan::{ParsedPlan, PlanError, PlannedCall, ToolPlan, parse_plan};
pub use serializer::{DataGraph, Node, NodeId, RenderLimits, render_graph, render_json};
pub use settings::{DesignatedTools, LoopSettings};
pub use state::{
    ExecutionState, FailureReason, LoopFailure, LoopState, RunOutcome, STATE_VERSION, StateError,
    SuspendedState,
};
