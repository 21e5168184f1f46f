use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Overrides the format when set.
pub const ENV_LOG_FORMAT: &str = "ORUN_LOG_FORMAT";
/// Overrides the filter directive when set (`info`, `orun.diag=debug,info`, ...).
pub const ENV_LOG_LEVEL: &str = "ORUN_LOG";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        // Records go to stderr; worker output owns stdout.
        let use_color = atty::is(atty::Stream::Stderr);
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

impl LoggerConfig {
    pub fn with_format(mut self, format: LoggerFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Apply `ORUN_LOG_FORMAT` / `ORUN_LOG` on top of `self`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, LoggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(fmt) = lookup(ENV_LOG_FORMAT).filter(|s| !s.trim().is_empty()) {
            self.format = fmt.parse()?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|s| !s.trim().is_empty()) {
            self.level = level.trim().to_string();
        }
        if self.format != LoggerFormat::Text {
            self.use_color = false;
        }
        Ok(self)
    }
}
