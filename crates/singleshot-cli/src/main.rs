mod builtin;
mod cli;
mod commands;
mod logging;

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    if let Err(e) = builtin::register() {
        print_err!("Failed to register the built-in models: {}", e);
        return ExitCode::FAILURE;
    }

    match cli::cli_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_err!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
