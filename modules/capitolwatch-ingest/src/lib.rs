pub mod checkpoint;
pub mod connectors;
pub mod deps;
pub mod extraction;
pub mod foundation;
pub mod health;
pub mod intelligence;
pub mod jobs;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod retry;
pub mod speed;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod trigger;

pub use deps::IngestDeps;
pub use orchestrator::Orchestrator;
