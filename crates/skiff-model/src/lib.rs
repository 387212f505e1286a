//! Data types shared by the skiff crates.
//!
//! Nothing in here performs I/O: run configuration, exit statuses, task lifecycle states,
//! detach key parsing and the label keys used as the metadata channel between the
//! orchestrator, the creation collaborator and the runtime.

mod error;
pub use error::ModelError;

mod domain;
pub use domain::*;

pub mod labels;
