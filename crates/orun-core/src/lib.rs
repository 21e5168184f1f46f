pub mod context;
pub mod layout;
pub use layout::LogLayout;
pub mod nodelist;
pub mod platform;
pub use platform::{CommandLine, Platform, SlurmConfig};
pub mod rank;
pub mod resolver;
pub use resolver::Resolver;
pub mod schedule;
pub mod system;
