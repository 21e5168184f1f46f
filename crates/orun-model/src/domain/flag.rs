use serde::{Deserialize, Serialize};

/// Boolean switch coming from the job submission environment.
///
/// Parsing is lenient: only recognised truthy spellings enable the flag, anything else (absent, empty, garbage) leaves it off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flag(bool);

impl Flag {
    pub const ON: Flag = Flag(true);
    pub const OFF: Flag = Flag(false);

    #[inline]
    pub fn new(enabled: bool) -> Self {
        Self(enabled)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.0
    }

    /// Parse an optional raw value, falling back to `default` only when the value is absent.
    pub fn parse_lenient(raw: Option<&str>, default: Flag) -> Flag {
        match raw {
            None => default,
            Some(s) => {
                let norm = s.trim().to_ascii_lowercase();
                Flag(matches!(norm.as_str(), "1" | "true" | "yes" | "on" | "y"))
            }
        }
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Flag(value)
    }
}
