//! kbook CLI binary
//!
//! All logic lives in the library; main.rs only maps the exit code.

fn main() {
    if let Err(code) = kbook::cli::run() {
        std::process::exit(code.as_i32());
    }
}
