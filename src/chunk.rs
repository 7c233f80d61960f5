//! Split the NDJSON file into byte ranges, one per worker.
//!
//! The split is positional: `start_i = i * (file_size / workers)`, so a range start
//! usually lands inside a record. Every worker except the first corrects this by
//! dropping everything up to and including the first line terminator it sees, and that
//! partial line is read by the previous worker, whose range end is soft.
//!
//! The correction assumes one record per line. A record spanning several lines can
//! misalign a partition start.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::AnalyticsError;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

const MIN_READ_BUFFER_SIZE: usize = 64 * 1024;

const LINE_TERMINATOR: u8 = b'\n';

/// Half-open byte range `[start, end)` assigned to one worker.
/// The last chunk has no end and reads to EOF.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: Option<u64>,
}

/// Bytes per chunk for a naive positional split. Integer division, so trailing bytes
/// all belong to the last chunk.
#[inline]
pub fn chunk_size(file_size: u64, workers: usize) -> u64 {
    file_size / workers as u64
}

pub fn partition(file_size: u64, workers: usize) -> Result<Vec<Chunk>, AnalyticsError> {
    if workers == 0 {
        return Err(AnalyticsError::InvalidWorkerCount(workers));
    }

    let size = chunk_size(file_size, workers);

    let chunks = (0..workers)
        .map(|index| {
            let start = index as u64 * size;
            let end = if index + 1 < workers {
                Some((index as u64 + 1) * size)
            } else {
                None
            };
            Chunk { index, start, end }
        })
        .collect();

    Ok(chunks)
}

impl Chunk {
    /// Open a buffered reader positioned at the first whole line of this chunk.
    ///
    /// Returns the reader together with its absolute file offset.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> io::Result<(BufReader<File>, u64)> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(self.start))?;

        let mut reader = BufReader::with_capacity(self.buffer_size(), file);

        let position = if self.index > 0 {
            self.start + skip_partial_line(&mut reader)?
        } else {
            self.start
        };

        Ok((reader, position))
    }

    /// Small chunks get a small read buffer, which matters when workers outnumber records.
    fn buffer_size(&self) -> usize {
        match self.end {
            Some(end) => ((end - self.start) as usize)
                .max(MIN_READ_BUFFER_SIZE)
                .min(READ_BUFFER_SIZE),
            None => READ_BUFFER_SIZE,
        }
    }
}

/// Discard bytes up to and including the first line terminator.
/// Returns the number of bytes discarded; stops quietly at EOF.
pub fn skip_partial_line<R: BufRead>(reader: &mut R) -> io::Result<u64> {
    let mut skipped = 0u64;

    loop {
        let (found, used) = {
            let buf = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };

            if buf.is_empty() {
                return Ok(skipped);
            }

            match buf.iter().position(|&b| b == LINE_TERMINATOR) {
                Some(at) => (true, at + 1),
                None => (false, buf.len()),
            }
        };

        reader.consume(used);
        skipped += used as u64;

        if found {
            return Ok(skipped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_partition_even_split() {
        let chunks = partition(100, 4).unwrap();

        assert_eq!(
            chunks,
            vec![
                Chunk { index: 0, start: 0, end: Some(25) },
                Chunk { index: 1, start: 25, end: Some(50) },
                Chunk { index: 2, start: 50, end: Some(75) },
                Chunk { index: 3, start: 75, end: None },
            ]
        );
    }

    #[test]
    fn test_partition_remainder_goes_to_last() {
        let chunks = partition(10, 3).unwrap();

        assert_eq!(chunks[0], Chunk { index: 0, start: 0, end: Some(3) });
        assert_eq!(chunks[1], Chunk { index: 1, start: 3, end: Some(6) });
        assert_eq!(chunks[2], Chunk { index: 2, start: 6, end: None });
    }

    #[test]
    fn test_partition_more_workers_than_bytes() {
        let chunks = partition(2, 5).unwrap();

        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|chunk| chunk.start == 0));
        assert_eq!(chunks[4].end, None);
    }

    #[test]
    fn test_partition_rejects_zero_workers() {
        assert!(partition(100, 0).is_err());
    }

    #[test]
    fn test_skip_partial_line() {
        let mut reader = Cursor::new(b"tail of a record}\n{\"next\":1}\n".to_vec());

        let skipped = skip_partial_line(&mut reader).unwrap();

        assert_eq!(skipped, 18);

        let mut rest = String::new();
        reader.read_line(&mut rest).unwrap();
        assert_eq!(rest, "{\"next\":1}\n");
    }

    #[test]
    fn test_skip_partial_line_without_terminator() {
        let mut reader = BufReader::with_capacity(4, Cursor::new(b"no newline here".to_vec()));

        assert_eq!(skip_partial_line(&mut reader).unwrap(), 15);
    }
}
