mod authorization;
mod batch;
mod definition;
mod history;
mod job;
mod meter;
mod operation_log;
mod report;

pub use authorization::*;
pub use batch::*;
pub use definition::*;
pub use history::*;
pub use job::*;
pub use meter::*;
pub use operation_log::*;
pub use report::*;

/// Generate a new entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
