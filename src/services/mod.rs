pub mod history;
mod management;
mod recorder;
mod repository;

#[cfg(all(test, feature = "database-sqlite"))]
mod tests;

pub use history::HistoryService;
pub use management::ManagementService;
pub use recorder::{EvaluateDecision, HistoryRecorder, StartProcessInstance};
pub use repository::RepositoryService;
