pub mod app_config;
pub mod health;
pub mod prediction;
pub mod scheduling;
pub mod stream;

pub use app_config::AppConfig;
pub use health::HealthConfig;
pub use prediction::{FeedbackConfig, PredictionConfig};
pub use scheduling::{DispatchConfig, ScoringConfig, ScoringWeights};
pub use stream::{StreamBackend, StreamConfig};
