//! # Centazio Engine
//!
//! The Read/Promote/Write pipeline and its orchestration.
//!
//! This crate provides:
//! - Operations: [`ReadOperation`], [`PromoteOperation`], [`WriteOperation`]
//! - Functions and the [`FunctionRunner`] (control state, abort votes,
//!   checkpoints)
//! - A cron [`Scheduler`] with change-trigger delivery
//! - [`FunctionRegistry`] for explicit host-side registration
//! - [`EngineSettings`] and the staged entity retention sweep
//!
//! ## Architecture
//!
//! ```text
//! External system --Read--> staged entities --Promote--> core storage + maps
//!                                                             |
//! External system <--Write------------------------------------+
//! ```
//!
//! Each stage runs inside a function for one (system, stage). Functions are
//! fired by cron ticks or by change triggers from other functions.
//!
//! ## Key Invariants
//!
//! - Checkpoints advance only on success, only to timestamps present in the
//!   processed data
//! - A record written to a system is resolved to its existing core entity
//!   when that system reports it back
//! - Write never sends an entity back to the system its last change came from
//! - An Abort vote stops the remaining operations of the run
//! - A system state is always returned to Idle

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod config;
mod context;
mod error;
mod function;
mod operation;
mod promote;
mod read;
mod registry;
pub mod retention;
mod scheduler;
mod trigger;
mod write;

#[cfg(test)]
mod test_support;

pub use api::{RawRecord, SystemApiClient};
pub use config::{EngineSettings, RetentionSettings};
pub use context::{EngineContext, OperationContext, Stores};
pub use error::{EngineError, EngineResult, HandlerError, HandlerResult};
pub use function::{
    Function, FunctionRunResult, FunctionRunner, FunctionSkipReason, OperationRunRecord,
};
pub use operation::{Operation, OperationConfig, OperationOutcome, OperationResult, SkipReason};
pub use promote::{PromoteHandler, PromoteOperation, PromotionDecision};
pub use read::{ReadBatch, ReadHandler, ReadOperation};
pub use registry::{FunctionFactory, FunctionRegistry};
pub use retention::RetentionReport;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use trigger::{FunctionTrigger, ObjectChangeTrigger};
pub use write::{WriteHandler, WriteOperation};
