//! Running one agent CLI: prompt construction and process supervision.

pub mod process;
pub mod prompt;

pub use process::{AgentRunner, CliRunner, Invocation, Outcome};
pub use prompt::{Prompt, build_prompt};
