pub mod events;
pub mod models;
pub mod ports;

pub use events::{DriftSeverity, FeedbackEvent, WorkerLifecycleEvent};
pub use models::{
    CompletionEvent, DecisionReason, DispatchAssignment, DispatchResult, EmaState,
    HeartbeatRecord, PredictionSnapshot, SchedulingDecision, Task, TaskPrediction,
    WorkerCapacity, WorkerHealth, WorkerRegistration, WorkerState, WorkerStatus,
};
pub use ports::{
    DispatchPublisher, DurationPredictor, NoOpPredictor, PredictionStore, TaskEnvelope,
    TaskStream,
};
