use clap::{Parser, Subcommand};

use ia_domain::config::{Config, ConfigSeverity};

#[derive(Parser, Debug)]
#[command(name = "interaction-server", version, about = "Live interaction session coordinator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default when no subcommand is given).
    Serve,
    /// Print the resolved configuration and exit.
    ConfigShow,
    /// Validate the resolved configuration and exit non-zero on error.
    ConfigValidate,
}

pub fn load_config() -> Config {
    Config::from_env()
}

pub fn show_config(config: &Config) {
    match serde_json::to_string_pretty(config) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to render config: {err}"),
    }
}

/// Validate and print every issue; returns `true` if there are no errors.
pub fn validate_config(config: &Config) -> bool {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => eprintln!("warning: {issue}"),
            ConfigSeverity::Error => eprintln!("error: {issue}"),
        }
    }
    !issues.iter().any(|i| i.severity == ConfigSeverity::Error)
}
