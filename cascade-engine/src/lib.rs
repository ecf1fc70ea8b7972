//! Cascade engine - event store, rule matching workers and action dispatch.
//!
//! Producing modules publish immutable events through [`runtime::EngineHandle`];
//! a worker pool matches each event against the tenant's rule registry and the
//! [`dispatcher::Dispatcher`] executes matched rules' actions in order against
//! pluggable [`dispatcher::ActionHandler`]s, with per-action timeout, retry
//! and failure isolation. Every evaluation lands in the execution log.

pub mod api;
pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod event_store;
pub mod handlers;
pub mod runtime;
pub mod scheduler;

pub use api::{EngineApiBuilder, EngineServiceConfig};
pub use audit::{ExecutionLog, InMemoryExecutionLog};
pub use dispatcher::{
    ActionHandler, ActionInvocation, Dispatcher, DispatcherConfig, HandlerRegistry, RetryPolicy,
};
pub use error::EngineError;
pub use event_store::{EventStore, InMemoryEventStore};
pub use handlers::WebhookHandler;
pub use runtime::{EngineHandle, EngineRuntime};
pub use scheduler::EventScheduler;
