//! Prompt construction: section assembly, history formatting and token
//! estimates.

pub mod assembler;
pub mod history;
pub mod token;

pub use assembler::{PromptAssembler, PromptContext, PromptInput, PromptSection, SectionKind};
pub use history::{HistoryFormatter, ITERATION_DELIMITER};
