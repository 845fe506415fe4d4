pub mod config;
pub mod intelligence;
pub mod storage;

pub use config::IntelligenceConfig;
pub use intelligence::{HttpDocumentIntelligence, ResultBody};
pub use storage::{FsBlobStore, HttpBlobStore};
