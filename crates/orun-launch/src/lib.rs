pub mod cli;

pub mod error;
pub use error::LaunchError;

pub mod launcher;
pub use launcher::{LaunchOptions, Launcher};

pub mod rank;
