//! Keeva: a conversational home-automation assistant backend.
//!
//! The assistant mediates between human users on connected devices, a
//! language model, peer agents (home automation, web search), and local
//! tools. Model output is a line-oriented action format; the core of the
//! crate parses it, routes each action with defined fallbacks, and keeps
//! recurring tasks re-armed, without ever letting a single bad input
//! crash the loop.

pub mod actions;
pub mod agents;
pub mod assistant;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod tasks;
pub mod tools;

pub use config::Config;
