//! Test utilities shared across crate-level unit tests.

pub mod http;
pub mod transport;

pub use http::start_mock_server;
pub use transport::ScriptedTransport;
