use clap::Parser;
use std::process::ExitCode;

use webshop::config::{ConfigError, Ctx, Env};

fn main() -> ExitCode {
    let env = Env::parse();
    match Ctx::load_files(&env.config, &env.secrets) {
        Ok(_) => {
            eprintln!("Config validation passed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Config validation failed: {}", error_kind(&e));
            ExitCode::FAILURE
        }
    }
}

fn error_kind(e: &ConfigError) -> &'static str {
    match e {
        ConfigError::Io(_) => "failed to read config file",
        ConfigError::Toml(_) => "failed to parse config file",
    }
}
