//! Agent coordination for automated commit analysis.
//!
//! An [`agents::AgentManager`] owns a pool of configurable agents and a
//! bounded task queue; a [`pipeline::QualityController`] drives each commit
//! through an analysis agent and a reviewer agent and stores the decision.

pub mod agents;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod utils;
