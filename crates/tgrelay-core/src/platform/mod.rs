//! Platform abstraction consumed by the forwarder (Telegram today).

pub mod port;
pub mod throttled;

pub use port::ChatPlatform;
pub use throttled::{ThrottleConfig, ThrottledPlatform};
