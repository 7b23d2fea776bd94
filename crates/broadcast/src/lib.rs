//! Broadcast job execution: pacing policy, operator controls, the per-target
//! send loop, and the sibling number-verification loop.

pub mod control;
pub mod job;
pub mod pacing;
pub mod verify;

pub use {
    control::JobControl,
    job::{BroadcastContent, JobContext, JobSummary, run_job},
    pacing::{Pacing, preview},
    verify::{CheckOutcome, run_check},
};
