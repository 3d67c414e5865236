// Error types shared by every stage of the survivor search
// A missing feature or a predictor failure corrupts every downstream probability, so both abort the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurvivorError {
    #[error("missing feature '{feature}' for {home} vs {away}")]
    MissingFeature {
        feature: String,
        home: String,
        away: String,
    },

    #[error("predictor failed: {0}")]
    Predictor(String),

    #[error("no eligible team to pick in week {week}")]
    NoEligibleTeam { week: u32 },

    #[error("search cancelled")]
    Cancelled,

    #[error("invalid data: {0}")]
    Data(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SurvivorError>;
