//! Routewatch resolves ambulance routes for the live dispatch map.

mod cli;
mod logging;
mod replay;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
