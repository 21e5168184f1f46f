//! Container runtime environment resolution.
//!
//! The library search path is picked from a reservation table with a wildcard default.
//! New reservation mappings go into [`LIBRARY_PATHS`] (or are layered at runtime with [`Resolver::with_mapping`]); callers only ever see [`resolve`].
use std::path::PathBuf;

use orun_model::{EnvironmentPlan, JobContext};
use tracing::debug;

/// Reservation name → library search path.
pub const LIBRARY_PATHS: &[(&str, &str)] = &[(
    "legacy",
    "/usr/local/cuda/compat/lib.legacy:/usr/local/nvidia/lib64",
)];

/// Library search path for every reservation not listed in [`LIBRARY_PATHS`], including none.
pub const DEFAULT_LIBRARY_PATH: &str = "/usr/local/cuda/compat/lib:/usr/local/nvidia/lib64";

/// Script that wraps the worker command in debug mode.
pub const DEBUG_ENTRYPOINT: &str = "/workspace/scripts/debug_entrypoint.sh";

/// Table-driven resolver.
#[derive(Debug, Clone)]
pub struct Resolver {
    library_paths: Vec<(String, String)>,
    default_library_path: String,
    debug_entrypoint: PathBuf,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            library_paths: LIBRARY_PATHS
                .iter()
                .map(|(r, p)| (r.to_string(), p.to_string()))
                .collect(),
            default_library_path: DEFAULT_LIBRARY_PATH.to_string(),
            debug_entrypoint: PathBuf::from(DEBUG_ENTRYPOINT),
        }
    }
}

impl Resolver {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a reservation mapping.
    pub fn with_mapping(mut self, reservation: impl Into<String>, path: impl Into<String>) -> Self {
        let reservation = reservation.into();
        let path = path.into();
        match self
            .library_paths
            .iter_mut()
            .find(|(r, _)| *r == reservation)
        {
            Some(entry) => entry.1 = path,
            None => self.library_paths.push((reservation, path)),
        }
        self
    }

    pub fn with_debug_entrypoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_entrypoint = path.into();
        self
    }

    /// Library path for a reservation; the default covers unknown and absent names.
    pub fn library_path(&self, reservation: Option<&str>) -> &str {
        reservation
            .and_then(|name| {
                self.library_paths
                    .iter()
                    .find(|(r, _)| r == name)
                    .map(|(_, p)| p.as_str())
            })
            .unwrap_or(&self.default_library_path)
    }

    pub fn resolve(&self, ctx: &JobContext) -> EnvironmentPlan {
        let library_path = self.library_path(ctx.reservation.as_deref()).to_string();
        let entrypoint = ctx
            .debug_mode
            .is_enabled()
            .then(|| self.debug_entrypoint.clone());

        debug!(
            target: "orun.core.resolver",
            reservation = ctx.reservation.as_deref().unwrap_or("-"),
            %library_path,
            debug = entrypoint.is_some(),
            "environment resolved"
        );
        EnvironmentPlan {
            library_path,
            entrypoint,
        }
    }
}

/// Resolve with the built-in table.
pub fn resolve(ctx: &JobContext) -> EnvironmentPlan {
    Resolver::default().resolve(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_entry_maps_exactly() {
        for (reservation, path) in LIBRARY_PATHS {
            let ctx = JobContext::new("1", 1, 1).with_reservation(*reservation);
            assert_eq!(resolve(&ctx).library_path, *path);
        }
    }

    #[test]
    fn unknown_and_absent_reservations_use_default() {
        let absent = JobContext::new("1", 1, 1);
        assert_eq!(resolve(&absent).library_path, DEFAULT_LIBRARY_PATH);

        for other in ["", "Legacy", "legacy2", "hpc-benchmarks"] {
            let ctx = JobContext::new("1", 1, 1).with_reservation(other);
            assert_eq!(resolve(&ctx).library_path, DEFAULT_LIBRARY_PATH, "{other}");
        }
    }

    #[test]
    fn debug_mode_injects_entrypoint() {
        let ctx = JobContext::new("1", 1, 1).with_debug_mode(true);
        assert_eq!(
            resolve(&ctx).entrypoint,
            Some(PathBuf::from(DEBUG_ENTRYPOINT))
        );
    }

    #[test]
    fn no_entrypoint_outside_debug_mode() {
        let ctx = JobContext::new("1", 1, 1);
        assert!(resolve(&ctx).entrypoint.is_none());
    }

    #[test]
    fn added_mapping_is_used_without_touching_callers() {
        let resolver = Resolver::new().with_mapping("maint", "/opt/maint/lib");
        let ctx = JobContext::new("1", 1, 1).with_reservation("maint");
        assert_eq!(resolver.resolve(&ctx).library_path, "/opt/maint/lib");

        let legacy = JobContext::new("1", 1, 1).with_reservation("legacy");
        assert_eq!(resolver.resolve(&legacy).library_path, LIBRARY_PATHS[0].1);
    }

    #[test]
    fn replaced_mapping_overrides_table() {
        let resolver = Resolver::new().with_mapping("legacy", "/other");
        assert_eq!(resolver.library_path(Some("legacy")), "/other");
    }
}
