pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod error_classifier;
pub mod job;
pub mod models;
pub mod parsing;
pub mod pipeline;
pub mod resilience;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use clock::{Clock, ManualClock, TokioClock};
pub use error::AppError;
pub use error_classifier::{CallFailure, ClassifiedError, ErrorKind, classify};
pub use job::{JobStatus, JobStatusReport, ParsingJob, PollConfig, wait_for_job};
pub use models::{DocumentSource, ExtractedTable, LineItem, ParsedContent, ParsingMethod, TableType};
pub use parsing::parse_adaptive_table_format;
pub use pipeline::ParsingPipelineService;
pub use resilience::{MetricsSnapshot, ResilientExecutor, RetryPolicy, ServiceProfile};
pub use traits::{BlobStore, DocumentIntelligence};
