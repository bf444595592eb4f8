// Newline-delimited JSON request/response protocol
pub mod connection;
pub mod messages;

pub use connection::{Connection, serve};
pub use messages::{ErrorBody, Request, Response};
