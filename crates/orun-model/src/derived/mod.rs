//! Values computed once from the job context and consumed by the launcher.

mod plan;
pub use plan::EnvironmentPlan;

mod schedule;
pub use schedule::{Milestones, Schedule, ScheduleSource};
