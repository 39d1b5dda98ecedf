//! Domain model for trace-runner
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via closed enums and the `Pid` newtype
//! - A request type that validates itself before any host access
//! - Structured error handling per stage

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{OutputDestination, OutputMode, Pid, TargetScope, TraceRequest, TracerKind};

pub use errors::{
    DispatchError, LocateError, PipelineError, SupervisorError, TraceError, ValidationError,
};
