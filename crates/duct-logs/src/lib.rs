//! duct logs - log paths, usage log, stream relay, and retention

mod paths;
mod relay;
mod retention;
mod writer;

pub use paths::{resolve_prefix, LogPaths};
pub use relay::{spawn_relay, StreamPlan, StreamTarget};
pub use retention::RetentionPolicy;
pub use writer::UsageLog;
