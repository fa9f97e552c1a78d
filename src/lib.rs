//! Floodgate - a global rate limiter for messaging platform calls
//!
//! Floodgate centralizes outgoing API requests behind a single dispatch
//! queue so that many independent producers never have to track rate
//! budgets or server-imposed cooldowns themselves. Submissions are
//! deduplicated by key (task compaction), executed one at a time under
//! a token bucket, and transparently retried after the server reports a
//! flood wait.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod id;
pub mod pause;
pub mod queue;

pub use config::ThrottleConfig;
pub use dispatcher::Dispatcher;
pub use error::{FloodgateError, Result};
pub use handle::{CompletionHandle, Settlement};
