//! The forwarding engine: cursor, polling loop and retry policy.

pub mod cursor;
pub mod engine;
pub mod retry;

pub use cursor::Cursor;
pub use engine::{BatchReport, EngineOptions, ForwardRequest, ForwardingEngine, RunReport};
pub use retry::RetryPolicy;
