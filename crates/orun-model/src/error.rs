use thiserror::Error;

/// Invalid or missing job configuration.
///
/// Raised before any process is spawned; the launcher never starts workers or monitors once one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value:?} ({reason})")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("global batch size must be positive, got {0}")]
    NonPositiveBatchSize(i64),
    #[error("milestones must not be empty")]
    EmptyMilestones,
    #[error("milestones must be strictly increasing: {0:?}")]
    MilestonesNotIncreasing(Vec<u64>),
    #[error("invalid node list: {0}")]
    InvalidNodelist(String),
}

impl ConfigError {
    pub fn invalid(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidField {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
