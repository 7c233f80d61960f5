//! Plain-text report files.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use failure::{Error, ResultExt};
use log;

use crate::top_k::{Ranked, TopLists, UserRank};

pub const HAPPIEST_HOURS: &str = "happiest_hours.txt";
pub const SADDEST_HOURS: &str = "saddest_hours.txt";
pub const HAPPIEST_USERS: &str = "happiest_users.txt";
pub const SADDEST_USERS: &str = "saddest_users.txt";

/// Write the four ranking files into `output_dir`, creating it if needed.
pub fn write_all<P: AsRef<Path>>(output_dir: P, lists: &TopLists) -> Result<(), Error> {
    let output_dir = output_dir.as_ref();

    fs::create_dir_all(output_dir)
        .with_context(|_| format!("Failed to create output directory {}", output_dir.display()))?;

    let files: [(&str, &str, Body); 4] = [
        (HAPPIEST_HOURS, "Top 5 Happiest Hours:", Body::Hours(&lists.happiest_hours)),
        (SADDEST_HOURS, "Top 5 Saddest Hours:", Body::Hours(&lists.saddest_hours)),
        (HAPPIEST_USERS, "Top 5 Happiest Users:", Body::Users(&lists.happiest_users)),
        (SADDEST_USERS, "Top 5 Saddest Users:", Body::Users(&lists.saddest_users)),
    ];

    for (name, header, body) in files.iter() {
        let path = output_dir.join(name);

        log::debug!("Write {}.", path.display());

        let file = File::create(&path).with_context(|_| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        write_ranking(&mut writer, header, body)
            .and_then(|_| writer.flush())
            .with_context(|_| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}

enum Body<'a> {
    Hours(&'a [Ranked<String>]),
    Users(&'a [UserRank]),
}

fn write_ranking<W: Write>(writer: &mut W, header: &str, body: &Body<'_>) -> io::Result<()> {
    writeln!(writer, "{}", header)?;

    match body {
        Body::Hours(hours) => {
            for hour in hours.iter() {
                writeln!(writer, "{}: {:.2}", hour.key, hour.score)?;
            }
        }
        Body::Users(users) => {
            for user in users.iter() {
                writeln!(
                    writer,
                    "{} (ID: {}): {:.2}",
                    user.username, user.user_id, user.sentiment
                )?;
            }
        }
    }

    Ok(())
}
