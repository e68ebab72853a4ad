use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{
    DispatchConfig, FeedbackConfig, HealthConfig, PredictionConfig, ScoringConfig, StreamConfig,
};
use crate::validation::ConfigValidator;
use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub dispatch: DispatchConfig,
    pub scoring: ScoringConfig,
    pub health: HealthConfig,
    pub prediction: PredictionConfig,
    pub feedback: FeedbackConfig,
}

impl AppConfig {
    /// Load configuration by layering, in order of increasing precedence:
    /// built-in defaults, an optional TOML file, then `FORESIGHT__`
    /// environment variables (e.g. `FORESIGHT__STREAM__URL`).
    pub fn load(config_path: Option<&str>) -> ConfigResult<Self> {
        let mut builder = ConfigBuilder::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(ConfigError::File(format!("config file not found: {path}")));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            for path in ["config/foresight.toml", "foresight.toml"] {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FORESIGHT")
                .prefix_separator("__")
                .separator("__"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.stream.validate()?;
        self.dispatch.validate()?;
        self.scoring.validate()?;
        self.health.validate()?;
        self.prediction.validate()?;
        self.feedback.validate()?;
        Ok(())
    }
}
