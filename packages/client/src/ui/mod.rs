//! Terminal front end of the synchronization engine.

mod formatter;
mod runner;

use std::io::Write;

pub use formatter::MessageFormatter;
pub use runner::{ClientOptions, run_client};

/// Redisplay the prompt after printing asynchronous output
pub fn redisplay_prompt(prompt: &str) {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
}
