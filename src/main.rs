use clap::Parser;
use std::process::ExitCode;
use thirteen::{Flags, ServerExitReason};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Flags::parse().into_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let handle = match thirteen::start(config) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match handle.join() {
        ServerExitReason::Normal => ExitCode::SUCCESS,
        ServerExitReason::Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
        ServerExitReason::Panic(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
