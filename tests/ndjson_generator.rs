//! Generate NDJSON post dumps for tests.
//!
//! Sentiments are multiples of 0.25, so every partial sum is exact and results can be
//! compared across worker counts without a tolerance.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const USERS: u32 = 60;

const NUMBER_OF_MBS: usize = 256;

fn random_post<R: Rng>(rng: &mut R) -> String {
    let day = rng.gen_range(1, 3);
    let hour = rng.gen_range(0, 24);
    let minute = rng.gen_range(0, 60);
    let sentiment = rng.gen_range(-8, 9) as f64 * 0.25;
    let user = rng.gen_range(0, USERS);

    let id = if user % 2 == 0 {
        format!("\"u{}\"", user)
    } else {
        format!("{}", 109_000_000 + user)
    };

    let username = if rng.gen_range(0, 4) == 0 {
        String::new()
    } else {
        format!("user{}_{}", user, rng.gen_range(0, 3))
    };

    format!(
        "{{\"id\":\"{}\",\"created_at\":\"2024-05-{:02}T{:02}:{:02}:00.000Z\",\"content\":\"<p>{{not}} \\\"json\\\" [here]</p>\",\"sentiment\":{},\"account\":{{\"id\":{},\"username\":\"{}\",\"acct\":\"x\"}}}}",
        rng.gen::<u32>(),
        day,
        hour,
        minute,
        sentiment,
        id,
        username
    )
}

fn random_noise<R: Rng>(rng: &mut R) -> String {
    match rng.gen_range(0, 6) {
        0 => "\"a bare string\"".to_string(),
        1 => format!("{}", rng.gen::<i32>()),
        2 => "[1, {\"created_at\": \"2024-05-01T00:00:00Z\"}]".to_string(),
        3 => "{\"created_at\": tru}".to_string(),
        4 => format!(
            "{{\"created_at\":\"2024-05-01T03:00:00Z\",\"sentiment\":{},\"account\":{{\"username\":\"nobody\"}}}}",
            rng.gen_range(-4, 5)
        ),
        _ => String::new(),
    }
}

/// Write `records` lines to `path`, roughly one in ten being noise the aggregation drops.
pub fn create_test_ndjson(path: &Path, records: usize, seed: u64) -> io::Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut writer = BufWriter::new(File::create(path)?);

    for _ in 0..records {
        let line = if rng.gen_range(0, 10) == 0 {
            random_noise(&mut rng)
        } else {
            random_post(&mut rng)
        };
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }

    writer.flush()
}

/// A dump of roughly `NUMBER_OF_MBS` megabytes, generated only once.
#[allow(dead_code)]
pub fn create_large_test_ndjson(path: &Path) -> io::Result<()> {
    if !path.exists() {
        // Each post is about 230 bytes.
        let records = NUMBER_OF_MBS * 1024 * 1024 / 230;
        create_test_ndjson(path, records, 42)?;
    }
    Ok(())
}
