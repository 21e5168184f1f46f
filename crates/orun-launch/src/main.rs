use std::process::ExitCode;

use orun_launch::{
    cli::{self, Cli},
    error::EXIT_CONFIG,
};
use orun_observe::{LoggerConfig, LoggerFormat, logger_init};
use tracing::error;

fn logger_config(cli: &Cli) -> Result<LoggerConfig, orun_observe::LoggerError> {
    let mut cfg = LoggerConfig::default().with_env_overrides(|k| std::env::var(k).ok())?;
    if let Some(format) = &cli.log_format {
        cfg = cfg.with_format(format.parse::<LoggerFormat>()?);
    }
    if let Some(level) = &cli.log_level {
        cfg = cfg.with_level(level.clone());
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::parse_cli();

    if let Err(e) = logger_config(&cli).and_then(|cfg| logger_init(&cfg)) {
        eprintln!("orun: {e}");
        return ExitCode::from(EXIT_CONFIG as u8);
    }

    let code = match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(target: "orun", error = %format!("{e:#}"), "orun failed");
            cli::exit_code(&e)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
