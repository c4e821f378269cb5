use std::{env, env::VarError};

use crate::config::WorkerConfig;

/// Every environment variable the worker reads. Only these are echoed, so a secret in the environment never is.
pub const DISPLAY_ENVS: [&str; 7] = [
    "RUST_LOG",
    "GBW_DATABASE_URL",
    "GBW_SWEEP_INTERVAL",
    "GBW_NOTIFICATION_TIMEOUT",
    "GBW_MAX_CONNECTIONS",
    "GBW_RUN_MIGRATIONS",
    "GBW_EVENT_BUFFER_SIZE",
];

/// The worker takes no arguments. Given any, it prints its help, the environment it sees and the configuration it
/// would run with, and returns `true` so that the caller exits.
pub fn handle_command_line_args() -> bool {
    if env::args().len() <= 1 {
        return false;
    }
    println!("\n{}\n", include_str!("./cli-help.txt"));
    println!("Current environment values:");
    println!("{}", environment_report());
    println!("\nEffective configuration:\n{:#?}", WorkerConfig::from_env_or_default());
    true
}

/// One line per variable in [`DISPLAY_ENVS`] with its current value.
pub fn environment_report() -> String {
    DISPLAY_ENVS.iter().map(|name| format!("  {name:<28} {}", describe_var(name))).collect::<Vec<_>>().join("\n")
}

fn describe_var(name: &str) -> String {
    match env::var(name) {
        Ok(s) => s,
        Err(VarError::NotPresent) => "Not set".into(),
        Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
    }
}
