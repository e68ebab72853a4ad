pub mod availability;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod feedback;
pub mod heartbeat;
pub mod metrics;
pub mod registry;
pub mod scorer;
pub mod strategies;

pub use circuit_breaker::{CircuitBreakerState, PredictorCircuitBreaker};
pub use dispatcher::{DispatcherStats, TaskDispatcher};
pub use feedback::{AccuracyTracker, FeedbackProcessor};
pub use heartbeat::{CapacityTracker, HeartbeatSubscriber};
pub use registry::WorkerRegistry;
pub use scorer::{DecisionScorer, ScoredCandidate, Selection};
pub use strategies::{FallbackStrategy, LowestLoadStrategy, RoundRobinStrategy};
