pub mod analysis;
pub mod store;

pub use analysis::{fingerprint, AnalysisCache, CacheConfig};
pub use store::{BoundedCache, CacheEntryInfo, CacheStats};
