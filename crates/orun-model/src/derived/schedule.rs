use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, ENV_GLOBAL_BATCH_SIZE, ENV_LEARNING_RATE, ENV_LR_DECAY, ENV_LR_MILESTONES,
    ENV_WARMUP_STEPS, WorkerEnv,
};

/// Step indices at which the learning rate decays.
///
/// Always non-empty and strictly increasing; the only way to build one is [`Milestones::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Milestones(Vec<u64>);

impl Milestones {
    pub fn new(steps: Vec<u64>) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyMilestones);
        }
        if steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::MilestonesNotIncreasing(steps));
        }
        Ok(Self(steps))
    }

    #[inline]
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    /// Comma separated form used in the worker environment.
    pub fn to_csv(&self) -> String {
        self.0
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<'de> Deserialize<'de> for Milestones {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let steps = Vec::<u64>::deserialize(deserializer)?;
        Milestones::new(steps).map_err(serde::de::Error::custom)
    }
}

/// Where a schedule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleSource {
    /// Exact entry of the curated reference table.
    Curated,
    /// Closed-form fallback for batch sizes outside the table.
    Interpolated,
}

/// Learning-rate schedule derived from the global batch size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub global_batch_size: u64,
    pub lr: f64,
    pub warmup_steps: u32,
    pub milestones: Milestones,
    pub decay: f64,
    pub source: ScheduleSource,
}

impl Schedule {
    /// Schedule entries as worker environment.
    ///
    /// Floats use the shortest round-trip representation so workers parse back the identical value.
    pub fn to_env(&self) -> WorkerEnv {
        WorkerEnv::new()
            .with(ENV_LEARNING_RATE, self.lr.to_string())
            .with(ENV_WARMUP_STEPS, self.warmup_steps.to_string())
            .with(ENV_LR_MILESTONES, self.milestones.to_csv())
            .with(ENV_LR_DECAY, self.decay.to_string())
            .with(ENV_GLOBAL_BATCH_SIZE, self.global_batch_size.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestones_reject_empty() {
        assert_eq!(Milestones::new(vec![]), Err(ConfigError::EmptyMilestones));
    }

    #[test]
    fn milestones_reject_non_increasing() {
        assert!(Milestones::new(vec![10, 10]).is_err());
        assert!(Milestones::new(vec![20, 10]).is_err());
        assert!(Milestones::new(vec![1, 2, 3]).is_ok());
    }

    #[test]
    fn milestones_deserialize_validates() {
        assert!(serde_json::from_str::<Milestones>("[4096,8192]").is_ok());
        assert!(serde_json::from_str::<Milestones>("[8192,4096]").is_err());
    }

    #[test]
    fn schedule_env_round_trips_lr() {
        let schedule = Schedule {
            global_batch_size: 256,
            lr: 0.002,
            warmup_steps: 0,
            milestones: Milestones::new(vec![4096, 8192]).unwrap(),
            decay: 0.95,
            source: ScheduleSource::Curated,
        };
        let env = schedule.to_env();
        assert_eq!(env.get("LEARNING_RATE"), Some("0.002"));
        assert_eq!(env.get("WARMUP_STEPS"), Some("0"));
        assert_eq!(env.get("LR_MILESTONES"), Some("4096,8192"));
        assert_eq!(env.get("LR_DECAY"), Some("0.95"));
        assert_eq!(env.get("GLOBAL_BATCH_SIZE"), Some("256"));
    }
}
