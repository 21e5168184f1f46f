mod error;
pub use error::ConfigError;

mod domain;
pub use domain::*;

mod derived;
pub use derived::*;

mod monitor;
pub use monitor::{MonitorKind, MonitorState};
