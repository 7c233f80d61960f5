//! Find the happiest and saddest hours and users in a large NDJSON dump of posts.

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::Parser;
use env_logger;
use mastodon_sentiment::{self, Config};

#[derive(Parser, Debug)]
#[command(name = "mastodon-sentiment", about = "Rank hours and users by summed sentiment.")]
struct Args {
    /// NDJSON file of posts.
    input: PathBuf,

    /// Directory receiving the four ranking files.
    #[arg(short, long, default_value = mastodon_sentiment::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
}

fn main() {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");

    env_logger::init_from_env(env);

    let args = Args::parse();
    let config = Config::from_env(args.input, args.output_dir);

    let started = Instant::now();

    match mastodon_sentiment::analyze(&config) {
        Ok(analysis) => {
            log::info!(
                "Aggregated {} records into {} hours and {} users ({} dropped, {} malformed, {} skipped).",
                analysis.aggregated,
                analysis.hours,
                analysis.users,
                analysis.dropped.total(),
                analysis.malformed,
                analysis.skipped
            );
            println!(
                "Total processing time: {:.2} seconds",
                started.elapsed().as_secs_f64()
            );
        }
        Err(error) => {
            log::error!("Analysis failed, cause: {}", error);
            for cause in error.iter_causes() {
                log::error!("  caused by: {}", cause);
            }
            process::exit(1);
        }
    }
}
