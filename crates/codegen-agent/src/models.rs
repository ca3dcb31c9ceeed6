//! These models represent the objects passed around by the agent
//!
//! Two formats meet here:
//! - openai-compatible chat messages/tools, sent from the agent to the LLM
//! - tool calls and tool outputs, exchanged between the agent and the registry
//!
//! Wire formats are converted into these internal structs at the provider
//! boundary, so nothing outside `providers` deals with raw endpoint JSON.
pub mod message;
pub mod output;
pub mod role;
pub mod tool;
