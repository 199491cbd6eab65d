use fileorg::output::OutputFormatter;
use std::process::ExitCode;

fn main() -> ExitCode {
    match fileorg::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}
