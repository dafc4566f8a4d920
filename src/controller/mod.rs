//! # Controller
//!
//! - `backoff`: Fibonacci backoff between failed passes, exponential retry within one
//! - `reconciler`: matching, planning, rendering and status aggregation
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
