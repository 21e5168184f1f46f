//! Learning-rate schedule derivation from the global batch size.
//!
//! Known batch sizes hit a curated table of validated reference points that downstream compliance checks diff against, so those entries are reproduced verbatim.
//! Every other positive batch size goes through the closed-form fallback:
//!
//! - `lr = K_LR * b`, anchored on the 128 entry;
//! - milestones `round(C0 / b)` and `round(C1 / b)`, anchored on equal epoch counts;
//! - a fixed warmup of [`FALLBACK_WARMUP_STEPS`].
//!
//! All arithmetic on the milestone path is integer, so results are bit-for-bit reproducible.
use orun_model::{ConfigError, Milestones, Schedule, ScheduleSource};
use tracing::debug;

/// Learning rate per sample of global batch.
pub const K_LR: f64 = 0.001 / 128.0;

/// First-milestone anchor: `C0 / b` steps.
pub const C0: u64 = 1_048_576;

/// Second-milestone anchor: `C1 / b` steps.
pub const C1: u64 = 2_097_152;

/// Warmup used by the fallback path.
pub const FALLBACK_WARMUP_STEPS: u32 = 250;

/// Decay applied at every milestone.
pub const DECAY: f64 = 0.95;

/// One curated reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuratedEntry {
    pub batch_size: u64,
    pub lr: f64,
    pub warmup_steps: u32,
    pub milestones: [u64; 2],
}

/// Curated reference points, ordered by batch size.
pub const CURATED: &[CuratedEntry] = &[
    CuratedEntry {
        batch_size: 128,
        lr: 0.0010,
        warmup_steps: 0,
        milestones: [8192, 16384],
    },
    CuratedEntry {
        batch_size: 256,
        lr: 0.0020,
        warmup_steps: 0,
        milestones: [4096, 8192],
    },
    CuratedEntry {
        batch_size: 512,
        lr: 0.0040,
        warmup_steps: 100,
        milestones: [2048, 4096],
    },
    CuratedEntry {
        batch_size: 1024,
        lr: 0.0075,
        warmup_steps: 200,
        milestones: [1024, 2048],
    },
    CuratedEntry {
        batch_size: 2048,
        lr: 0.0100,
        warmup_steps: 400,
        milestones: [600, 1200],
    },
];

/// Global batch size from the per-rank batch and the rank count.
pub fn global_batch_size(local_batch_size: u32, world_size: u32) -> Result<i64, ConfigError> {
    (local_batch_size as i64)
        .checked_mul(world_size as i64)
        .ok_or_else(|| {
            ConfigError::invalid(
                "global batch size",
                format!("{local_batch_size} x {world_size}"),
                "overflow",
            )
        })
}

/// Derive the schedule for `global_batch_size`.
///
/// Non-positive batch sizes are configuration errors; they are never coerced.
pub fn derive(global_batch_size: i64) -> Result<Schedule, ConfigError> {
    if global_batch_size <= 0 {
        return Err(ConfigError::NonPositiveBatchSize(global_batch_size));
    }
    let b = global_batch_size as u64;

    let schedule = match CURATED.iter().find(|e| e.batch_size == b) {
        Some(entry) => Schedule {
            global_batch_size: b,
            lr: entry.lr,
            warmup_steps: entry.warmup_steps,
            milestones: Milestones::new(entry.milestones.to_vec())?,
            decay: DECAY,
            source: ScheduleSource::Curated,
        },
        None => interpolate(b)?,
    };

    debug!(
        target: "orun.core.schedule",
        batch = b,
        lr = schedule.lr,
        warmup = schedule.warmup_steps,
        milestones = %schedule.milestones.to_csv(),
        source = ?schedule.source,
        "schedule derived"
    );
    Ok(schedule)
}

fn interpolate(b: u64) -> Result<Schedule, ConfigError> {
    let first = div_round(C0, b).max(1);
    let second = div_round(C1, b).max(first + 1);

    Ok(Schedule {
        global_batch_size: b,
        lr: K_LR * b as f64,
        warmup_steps: FALLBACK_WARMUP_STEPS,
        milestones: Milestones::new(vec![first, second])?,
        decay: DECAY,
        source: ScheduleSource::Interpolated,
    })
}

/// `round(n / d)` with halves rounded up.
#[inline]
fn div_round(n: u64, d: u64) -> u64 {
    (n + d / 2) / d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_entries_are_reproduced_exactly() {
        for entry in CURATED {
            let s = derive(entry.batch_size as i64).unwrap();
            assert_eq!(s.lr, entry.lr, "batch {}", entry.batch_size);
            assert_eq!(s.warmup_steps, entry.warmup_steps);
            assert_eq!(s.milestones.as_slice(), &entry.milestones);
            assert_eq!(s.source, ScheduleSource::Curated);
        }
    }

    #[test]
    fn reference_points() {
        let s = derive(512).unwrap();
        assert_eq!(s.lr, 0.0040);
        assert_eq!(s.warmup_steps, 100);
        assert_eq!(s.milestones.as_slice(), &[2048, 4096]);

        let s = derive(256).unwrap();
        assert_eq!(s.lr, 0.0020);
        assert_eq!(s.warmup_steps, 0);
        assert_eq!(s.milestones.as_slice(), &[4096, 8192]);
    }

    #[test]
    fn anchor_matches_128_entry() {
        assert_eq!(K_LR * 128.0, CURATED[0].lr);
        assert_eq!(div_round(C0, 128), CURATED[0].milestones[0]);
        assert_eq!(div_round(C1, 128), CURATED[0].milestones[1]);
    }

    #[test]
    fn fallback_is_linear_in_lr_with_fixed_warmup() {
        for b in [1_i64, 3, 64, 96, 130, 384, 1000, 4096, 10_000] {
            let s = derive(b).unwrap();
            assert_eq!(s.source, ScheduleSource::Interpolated);
            assert_eq!(s.lr, K_LR * b as f64, "batch {b}");
            assert_eq!(s.warmup_steps, FALLBACK_WARMUP_STEPS);
        }
    }

    #[test]
    fn fallback_milestones_follow_inverse_scaling() {
        let s = derive(384).unwrap();
        assert_eq!(s.milestones.as_slice(), &[2731, 5461]);

        let s = derive(4096).unwrap();
        assert_eq!(s.milestones.as_slice(), &[256, 512]);
    }

    #[test]
    fn fallback_milestones_strictly_increase_for_huge_batches() {
        for b in [
            1_398_101_i64,
            2_097_152,
            3_000_000,
            4_194_304,
            10_000_000,
            i64::MAX / 2,
        ] {
            let s = derive(b).unwrap();
            let m = s.milestones.as_slice();
            assert!(m[0] >= 1, "batch {b}");
            assert!(m[0] < m[1], "batch {b}: {m:?}");
        }
    }

    #[test]
    fn non_positive_batch_is_config_error() {
        assert_eq!(derive(0), Err(ConfigError::NonPositiveBatchSize(0)));
        assert_eq!(derive(-5), Err(ConfigError::NonPositiveBatchSize(-5)));
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(derive(777).unwrap(), derive(777).unwrap());
    }

    #[test]
    fn global_batch_size_multiplies() {
        assert_eq!(global_batch_size(4, 64), Ok(256));
        assert_eq!(global_batch_size(0, 64), Ok(0));
    }
}
