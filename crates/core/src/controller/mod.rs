//! Run controller.
//!
//! Seeds seven question tasks per target bill, then watches the state store
//! until every bill is complete or failed, or the global deadline passes.
//! Messages on the error topic mark their bill failed. Whatever finished is
//! handed to the output collector, and the rest is reported as incomplete.

mod config;
mod runner;
mod types;

pub use config::{ControllerConfig, DEFAULT_BILLS};
pub use runner::Controller;
pub use types::{
    BillFailure, BillSnapshot, ControllerError, IncompleteBill, ProgressSnapshot, RunPhase,
    RunReport,
};
