//! Minimal embedding demo: runs a single `.na` file through a default
//! `Interpreter` and prints its final expression value. Exercises the
//! embedding API end to end; argument parsing is intentionally just
//! `std::env::args` (spec.md section 1: CLI argument parsing is out of
//! scope).

use std::path::PathBuf;

use dana::{Config, Interpreter};

fn main() {
    simple_logger::SimpleLogger::new()
        .env()
        .init()
        .expect("failed to install logger");

    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("usage: dana-run <path-to-script.na>");
            std::process::exit(1);
        }
    };

    let config = Config::from_env_and_file(None);
    let mut interp = Interpreter::new(config);
    match interp.run_file(&path) {
        Ok(value) => println!("{}", value.display()),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
