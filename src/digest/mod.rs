pub mod worker;

pub use worker::{assign_event_to_group, AssignOutcome};
