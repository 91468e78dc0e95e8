pub mod orchestrator;
pub mod partition;

pub use orchestrator::CollectionOrchestrator;
