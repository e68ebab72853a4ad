pub mod completion;
pub mod decision;
pub mod prediction;
pub mod task;
pub mod worker;

pub use completion::{CompletionEvent, DispatchAssignment};
pub use decision::{DecisionReason, DispatchResult, SchedulingDecision};
pub use prediction::{EmaState, PredictionSnapshot, TaskPrediction};
pub use task::Task;
pub use worker::{
    HeartbeatRecord, WorkerCapacity, WorkerHealth, WorkerRegistration, WorkerState, WorkerStatus,
};
