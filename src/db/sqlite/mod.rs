mod authorizations;
mod batches;
mod byte_arrays;
mod case_history;
mod common;
mod decision_history;
mod definitions;
mod job_logs;
mod jobs;
mod meter_logs;
mod operation_log;
mod process_history;

pub use authorizations::SqliteAuthorizationRepo;
pub use batches::SqliteBatchRepo;
pub use byte_arrays::SqliteByteArrayRepo;
pub use case_history::SqliteCaseHistoryRepo;
pub use decision_history::SqliteDecisionHistoryRepo;
pub use definitions::SqliteDefinitionRepo;
pub use job_logs::SqliteJobLogRepo;
pub use jobs::SqliteJobRepo;
pub use meter_logs::SqliteMeterLogRepo;
pub use operation_log::SqliteOperationLogRepo;
pub use process_history::SqliteProcessHistoryRepo;
