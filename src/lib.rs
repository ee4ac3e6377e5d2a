//! # weaver
//!
//! Senior/junior agent orchestration for coding assistants.
//!
//! A capable "senior" agent (the Claude CLI) talks to the user and delegates
//! small tasks to a cheaper "junior" agent (any OpenAI-compatible endpoint).
//! Agents hand work to each other with a trailing directive line such as
//! `/local write a regex for ...`; junior replies always go back to the
//! senior agent for review.
//!
//! ## Architecture
//!
//! ```text
//!   user message
//!        │
//!        ▼
//!  ┌──────────────┐   route    ┌────────────┐
//!  │ Orchestrator │──────────▶│   Router   │
//!  │  hop loop    │◀──────────│            │
//!  └──────┬───────┘  decision  └────────────┘
//!         │ invoke
//!         ▼
//!  ┌──────────────┐        ┌────────────────────┐
//!  │ AgentHandle  │        │   Conversation     │
//!  │ senior/junior│        │ bounded turn log   │
//!  └──────┬───────┘        └────────────────────┘
//!         │ tools (MCP)
//!         ▼
//!  ┌──────────────┐
//!  │   Notepad    │  file / remote document store
//!  └──────────────┘
//! ```
//!
//! ## Modules
//! - `agent`: the `AgentHandle` seam with subprocess and HTTP implementations
//! - `conversation`: bounded, role-tagged turn history with export/import
//! - `router`: directive-token routing between senior and junior
//! - `handoff`: trailing-directive extraction from replies
//! - `orchestrator`: the hop loop, events and cancellation
//! - `notepad`: shared notes with pluggable backends
//! - `mcp`: stdio MCP server exposing the notepad as tools
//! - `cli`: slash commands and plain-text rendering for the binary

pub mod agent;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod handoff;
pub mod mcp;
pub mod notepad;
pub mod orchestrator;
pub mod prompts;
pub mod router;
pub mod util;

#[cfg(test)]
mod testing;

pub use agent::{AgentHandle, AgentId, AgentRole};
pub use config::Config;
pub use conversation::Conversation;
pub use notepad::Notepad;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
pub use router::Router;
