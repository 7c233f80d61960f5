//! Run configuration.

use std::env;
use std::path::PathBuf;

/// Overrides the worker count, which otherwise follows the number of logical CPUs.
pub const WORKERS_ENV: &str = "SENTIMENT_WORKERS";

pub const DEFAULT_OUTPUT_DIR: &str = "./mastodon_results";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub workers: usize,
}

impl Config {
    pub fn new<I, O>(input: I, output_dir: O, workers: usize) -> Config
    where
        I: Into<PathBuf>,
        O: Into<PathBuf>,
    {
        Config {
            input: input.into(),
            output_dir: output_dir.into(),
            workers,
        }
    }

    /// Configuration with the worker count taken from the environment.
    pub fn from_env<I, O>(input: I, output_dir: O) -> Config
    where
        I: Into<PathBuf>,
        O: Into<PathBuf>,
    {
        Config::new(input, output_dir, workers_from(env::var(WORKERS_ENV).ok()))
    }
}

/// A positive integer override wins, anything else falls back to the CPU count.
fn workers_from(value: Option<String>) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get)
        .max(1)
}
