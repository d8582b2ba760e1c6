//! Runs the agent inside an acquired sandbox: prompt assembly, the
//! primary attempt, refusal detection, and the single fallback retry.

pub mod prompt;
pub mod refusal;
pub mod runner;

pub use prompt::{assemble_prompt, ContextFile, ContextPlacement, PromptInputs};
pub use refusal::RefusalPolicy;
pub use runner::{drive, AttemptRecord, DriveOutcome, DriveRequest};
