//! Repository tests against in-memory SQLite databases.
//!
//! Each module exercises one repository through its trait object, using the
//! real migrations from `migrations_sqlx/sqlite`.

mod jobs;
mod process_history;
