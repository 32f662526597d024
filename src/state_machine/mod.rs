mod job;
mod progress;
mod state;

pub use job::{Job, JobSnapshot, JobState, JobTracker, RetryConfig};
pub use progress::{
    PipelineStage, ProgressEstimator, ProgressSmoother, SyntheticProgress, last_reached_stage,
    stage_progress,
};
pub use state::{RegenEvent, RegenState, StateMachine, Transition};
