pub mod analyzer;
pub mod base;
pub mod extract;
pub mod manager;
pub mod registry;
pub mod reviewer;
pub mod schema;
pub mod types;

pub use analyzer::CommitAnalyzer;
pub use base::{Agent, ManagedAgent};
pub use manager::{AgentManager, ManagerConfig, SystemMetrics, TaskTicket};
pub use registry::{AgentFactory, AgentRegistry, AgentServices, ANALYZER_TYPE, REVIEWER_TYPE};
pub use reviewer::QualityReviewer;
pub use types::{
    AgentInput, AgentMetrics, AgentOutput, AgentStatus, AgentStatusReport, JsonMap, OutputStatus,
};
