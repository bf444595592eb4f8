// Identifier sanitization, write-access policy and the tool lock
pub mod access_control;
pub mod auth;
pub mod identifiers;

pub use access_control::require_write_access;
pub use auth::AuthGate;
pub use identifiers::{sanitize_column_ref, sanitize_identifier, sanitize_table_name, validate_identifier};
