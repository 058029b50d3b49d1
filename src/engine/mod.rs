//! Execution engine - everything between a `Session` and an `ExecutionResult`
//!
//! - `transport`: moves a `RunRequest` to the backend and returns raw bytes
//! - `normalizer`: turns those bytes into an `ExecutionResult`
//! - `controller`: owns the run state machine and the single-flight guard
//!
//! The engine does NOT compile or sandbox anything; that is the backend's job.

pub mod controller;
pub mod normalizer;
pub mod status;
pub mod transport;

pub use controller::{ExecutionController, RunState};
pub use status::{ExecutionResult, ExecutionStatus};
pub use transport::{HttpTransport, RunRequest, Transport};
