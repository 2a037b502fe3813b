//! # Centazio Testkit
//!
//! Test utilities for Centazio.
//!
//! This crate provides:
//! - [`TestEngine`]: in-memory stores and a frozen clock wired into an
//!   engine context
//! - [`SimulatedSystem`]: an external system behind the `SystemApiClient`
//!   surface
//! - A sample customer domain with Read, Promote and Write handlers
//! - Store wrappers that fail on demand, for interrupted-run scenarios
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use centazio_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn reads_customers() {
//!     let engine = TestEngine::new([Customer::core_type()]);
//!     let crm = CustomerSystem::new(
//!         Arc::new(SimulatedSystem::new("Crm", engine.clock.clone())),
//!         "Contact",
//!     );
//!     crm.put_customer("c1", "Ann", "ann@example.com");
//!     engine.runner().run(&crm.read_function("0 * * * * *"), &[FunctionTrigger::Manual]).await?;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod simulated;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::domain::*;
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::simulated::*;
}

pub use domain::*;
pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use simulated::*;
