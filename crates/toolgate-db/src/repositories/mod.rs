//! Repository implementations using `SQLite`.
//!
//! These implementations encapsulate all SQL queries and database access.
//! The `SqlitePool` is confined to this module and never exposed through
//! the port trait signatures.

mod row_mappers;
mod sqlite_invocation_recorder;
mod sqlite_permission_repository;
mod sqlite_provider_repository;

pub use sqlite_invocation_recorder::SqliteInvocationRecorder;
pub use sqlite_permission_repository::SqlitePermissionRuleRepository;
pub use sqlite_provider_repository::SqliteProviderRepository;
