pub mod metrics;
pub mod orchestrator;
pub mod sink;
pub mod state;

pub use metrics::{PipelineStatistics, QualityTrends};
pub use orchestrator::QualityController;
pub use sink::{AnalysisRecord, MemoryStorage, StorageSink};
pub use state::{PipelineConfig, ProcessResult, ProcessStatus};
