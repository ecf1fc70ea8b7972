//! Shared data model for the Cascade automation engine.
//!
//! Defines the immutable [`event::Event`] record published by producing
//! modules and the [`execution::RuleExecution`] audit record written by the
//! dispatcher. Both are plain JSON-serializable structs so they can cross
//! service boundaries unchanged.

pub mod event;
pub mod execution;

pub use event::{Event, EventBuilder, EventInput, EventPriority};
pub use execution::{
    ActionResult, ActionStatus, ExecutionQuery, ExecutionStatus, RuleExecution,
};
