//! The concurrent worker pool: claims work items, drives handlers,
//! persists artifacts and run records, dispatches discovery, and exposes
//! the operator control surface (pause/resume/drain/shutdown/status).

pub mod control;
pub mod metrics;
pub mod rate_limiter;
pub mod runner;

pub use control::ControlFlags;
pub use metrics::{RunMetrics, SharedMetrics, WorkerMetrics};
pub use rate_limiter::RateLimiter;
pub use runner::{ConcurrentRunner, RunnerStatus};
