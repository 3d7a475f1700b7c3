//! Resource and permission checks.
//!
//! Grants are stored per user or group and refer to a resource type and
//! either a specific resource id or `*`. A call passes a check when any grant
//! held by the caller or one of the caller's groups carries the permission.
//!
//! Checks are skipped when:
//! 1. authorization is disabled in the configuration,
//! 2. the call carries no authentication (engine internal work), or
//! 3. the caller is a configured admin user or member of an admin group.

mod checker;
mod error;

pub use checker::AuthorizationChecker;
pub use error::{AuthzError, PermissionCheck};
