pub mod assembler;
pub mod combine;
pub mod config;
pub mod dirs;
pub mod error;
pub mod formatter;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod source_store;
pub mod transform;

pub use config::Config;
pub use error::BundleError;
pub use orchestrator::BundleOrchestrator;
