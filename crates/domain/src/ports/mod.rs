pub mod messaging;
pub mod persistence;
pub mod predictor;

pub use messaging::{DispatchPublisher, TaskEnvelope, TaskStream};
pub use persistence::PredictionStore;
pub use predictor::{DurationPredictor, NoOpPredictor};
