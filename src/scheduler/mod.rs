//! Deadline-aware round-robin tile scheduling.
//!
//! Three decision points per frame:
//! - `schedule1` before the 3D backbone picks the largest rotated prefix of
//!   the nonempty tiles predicted to finish before the deadline.
//! - `schedule2` after the 3D backbone shrinks that prefix if the measured
//!   progress left too little time for the remaining stages.
//! - `schedule3` after head-pre only reports a predicted shortfall.

mod candidates;
mod round_robin;

pub use candidates::{rotation_start, CandidateTable};
pub use round_robin::{
    remaining_time_ms, RoundRobinScheduler, Schedule3Check, ScheduleDecision,
};
