use std::sync::OnceLock;

use orun_model::UnixSeconds;
use time::OffsetDateTime;

static HOSTNAME: OnceLock<String> = OnceLock::new();

/// Short host name of the current node.
pub fn hostname() -> &'static str {
    HOSTNAME.get_or_init(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .map(|h| h.split('.').next().unwrap_or_default().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string())
    })
}

/// Current wall-clock time as unix seconds.
#[inline]
pub fn now_unix() -> UnixSeconds {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_stable_and_short() {
        let a = hostname();
        let b = hostname();
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert!(!a.contains('.'));
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_unix() > 1_577_836_800);
    }
}
