//! Stream JSON objects out of a byte range of an NDJSON file.
//!
//! Records are delimited by JSON structure, not by line terminators. A small scanner
//! tracks nesting depth and string state, buffers the bytes of the single in-flight
//! object, and hands the complete object to `serde_json`. Nothing else of the range is
//! kept in memory.
//!
//! Top-level values that are not objects (strings, numbers, literals, arrays and stray
//! punctuation) are skipped. An object that does not decode, or that is still open at
//! EOF, is dropped and its buffered bytes are scanned again from their second line on,
//! so a single broken line costs only itself.
//!
//! A range ends at the first line terminator at or past its `end` offset. The next range
//! starts right after that same terminator.

use std::io::{self, BufRead};
use std::iter::FusedIterator;

use bytes::{Bytes, BytesMut};
use log;
use serde_json::{Map, Value};

/// A decoded top-level object. Nested values such as `account` stay nested.
pub type Record = Map<String, Value>;

/// Upper bound on the bytes of one in-flight object.
pub const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

const INITIAL_RECORD_CAPACITY: usize = 4 * 1024;

const LINE_TERMINATOR: u8 = b'\n';

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Scan {
    /// Between top-level tokens.
    Idle,
    /// Inside an object or array, outside any string.
    Structure { depth: u32 },
    /// Inside a string. Depth 0 is a bare top-level string.
    Text { depth: u32, escaped: bool },
    /// Top-level number or literal.
    Bare,
    /// Discarding up to the next line terminator after an oversized object.
    Resync,
}

/// `start` is the absolute offset of the first byte of `bytes`.
#[derive(Debug)]
enum Event {
    Object { start: u64, bytes: Bytes },
    Truncated { start: u64, bytes: Bytes },
    Oversized { start: u64, bytes: Bytes },
    Skipped,
    Halt,
    Eof,
}

/// Counters for one stream.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct StreamStats {
    /// Objects decoded and yielded.
    pub records: u64,
    /// Objects that did not decode, were truncated by EOF, or were too large.
    pub malformed: u64,
    /// Top-level tokens that were not objects.
    pub skipped: u64,
}

struct Scanner {
    scan: Scan,
    /// Absolute file offset of the next byte fed in.
    position: u64,
    end: Option<u64>,
    /// Offset of the first line terminator at or past `end`, once seen.
    last_line_end: Option<u64>,
    /// Offset of the token being scanned.
    start: u64,
    capture: bool,
    pending: BytesMut,
    limit: usize,
}

impl Scanner {
    /// Scan `buf` until one top-level token completes or the buffer runs out.
    ///
    /// Returns the number of bytes consumed and the event that ended the scan.
    fn feed(&mut self, buf: &[u8]) -> (usize, Option<Event>) {
        let mut span = 0;

        for (i, &byte) in buf.iter().enumerate() {
            let offset = self.position + i as u64;

            if byte == LINE_TERMINATOR
                && self.last_line_end.is_none()
                && self.end.map_or(false, |end| offset >= end)
            {
                self.last_line_end = Some(offset);
            }

            match self.scan {
                Scan::Idle => {
                    if is_whitespace(byte) {
                        continue;
                    }

                    // Tokens on the line holding `end` belong to this range, even past it.
                    if self.last_line_end.map_or(false, |line_end| offset > line_end) {
                        return self.stop(i, Event::Halt);
                    }

                    span = i;
                    self.start = offset;
                    self.capture = byte == b'{';
                    self.scan = match byte {
                        b'{' | b'[' => Scan::Structure { depth: 1 },
                        b'"' => Scan::Text {
                            depth: 0,
                            escaped: false,
                        },
                        b'}' | b']' | b',' | b':' => return self.stop(i + 1, Event::Skipped),
                        _ => Scan::Bare,
                    };
                }
                Scan::Structure { depth } => match byte {
                    b'"' => {
                        self.scan = Scan::Text {
                            depth,
                            escaped: false,
                        }
                    }
                    b'{' | b'[' => self.scan = Scan::Structure { depth: depth + 1 },
                    b'}' | b']' if depth == 1 => return self.complete(buf, span, i + 1),
                    b'}' | b']' => self.scan = Scan::Structure { depth: depth - 1 },
                    _ => {}
                },
                Scan::Text { depth, escaped } => {
                    if escaped {
                        self.scan = Scan::Text {
                            depth,
                            escaped: false,
                        };
                    } else if byte == b'\\' {
                        self.scan = Scan::Text {
                            depth,
                            escaped: true,
                        };
                    } else if byte == b'"' {
                        if depth == 0 {
                            self.scan = Scan::Idle;
                            return self.stop(i + 1, Event::Skipped);
                        }
                        self.scan = Scan::Structure { depth };
                    }
                }
                Scan::Bare => {
                    if is_whitespace(byte) || is_structural(byte) {
                        // The delimiter starts the next token, leave it unconsumed.
                        self.scan = Scan::Idle;
                        return self.stop(i, Event::Skipped);
                    }
                }
                Scan::Resync => {
                    if byte == LINE_TERMINATOR {
                        self.scan = Scan::Idle;
                    }
                }
            }
        }

        if self.capture {
            self.pending.extend_from_slice(&buf[span..]);

            if self.pending.len() > self.limit {
                log::warn!(
                    "Drop object over {} bytes at offset {}.",
                    self.limit,
                    self.start
                );
                self.capture = false;
                self.scan = Scan::Resync;
                let event = Event::Oversized {
                    start: self.start,
                    bytes: self.pending.take().freeze(),
                };
                return self.stop(buf.len(), event);
            }
        }

        self.position += buf.len() as u64;
        (buf.len(), None)
    }

    fn complete(&mut self, buf: &[u8], span: usize, used: usize) -> (usize, Option<Event>) {
        self.scan = Scan::Idle;

        let event = if self.capture {
            self.pending.extend_from_slice(&buf[span..used]);
            Event::Object {
                start: self.start,
                bytes: self.pending.take().freeze(),
            }
        } else {
            Event::Skipped
        };
        self.capture = false;

        self.stop(used, event)
    }

    #[inline]
    fn stop(&mut self, used: usize, event: Event) -> (usize, Option<Event>) {
        self.position += used as u64;
        (used, Some(event))
    }

    /// Close whatever token is still open at EOF.
    fn finish(&mut self) -> Event {
        let event = match self.scan {
            Scan::Idle | Scan::Resync => Event::Eof,
            _ if self.capture => Event::Truncated {
                start: self.start,
                bytes: self.pending.take().freeze(),
            },
            _ => Event::Skipped,
        };
        self.scan = Scan::Idle;
        self.capture = false;
        event
    }
}

#[inline]
fn is_whitespace(byte: u8) -> bool {
    match byte {
        b' ' | b'\t' | b'\r' | b'\n' => true,
        _ => false,
    }
}

#[inline]
fn is_structural(byte: u8) -> bool {
    match byte {
        b'{' | b'}' | b'[' | b']' | b'"' | b',' | b':' => true,
        _ => false,
    }
}

/// Lazy, finite, non-restartable sequence of the objects in one byte range.
///
/// Yields `Err` once and then ends if the underlying reader fails.
pub struct RecordStream<R> {
    reader: R,
    scanner: Scanner,
    /// Bytes of a dropped object to scan again before reading on.
    replay: BytesMut,
    stats: StreamStats,
    done: bool,
}

impl<R: BufRead> RecordStream<R> {
    /// `position` is the absolute file offset `reader` is at; `end` is the soft range
    /// end, `None` reads to EOF.
    ///
    /// A stream positioned past its end is empty: the line terminator closing the range
    /// was already skipped.
    pub fn new(reader: R, position: u64, end: Option<u64>) -> RecordStream<R> {
        RecordStream {
            reader,
            scanner: Scanner {
                scan: Scan::Idle,
                position,
                end,
                last_line_end: None,
                start: position,
                capture: false,
                pending: BytesMut::with_capacity(INITIAL_RECORD_CAPACITY),
                limit: MAX_RECORD_BYTES,
            },
            replay: BytesMut::new(),
            stats: StreamStats::default(),
            done: end.map_or(false, |end| position > end),
        }
    }

    pub fn max_record_bytes(mut self, limit: usize) -> RecordStream<R> {
        self.scanner.limit = limit;
        self
    }

    #[inline]
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Absolute offset of the next unread byte.
    #[inline]
    pub fn position(&self) -> u64 {
        self.scanner.position
    }

    /// Queue the bytes of a dropped object after its first line terminator for another
    /// scan. Returns false when the object sits on a single line.
    fn rescan(&mut self, start: u64, bytes: &[u8]) -> bool {
        let at = match bytes.iter().position(|&b| b == LINE_TERMINATOR) {
            Some(at) => at + 1,
            None => return false,
        };

        let mut replay = BytesMut::with_capacity(bytes.len() - at + self.replay.len());
        replay.extend_from_slice(&bytes[at..]);
        replay.extend_from_slice(&self.replay);

        self.replay = replay;
        self.scanner.position = start + at as u64;
        self.scanner.scan = Scan::Idle;
        true
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let event = if !self.replay.is_empty() {
                let (used, event) = self.scanner.feed(&self.replay);
                self.replay.split_to(used);
                event
            } else {
                let (used, event) = {
                    let buf = match self.reader.fill_buf() {
                        Ok(buf) => buf,
                        Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    };

                    if buf.is_empty() {
                        (0, Some(self.scanner.finish()))
                    } else {
                        self.scanner.feed(buf)
                    }
                };
                self.reader.consume(used);
                event
            };

            match event {
                Some(Event::Object { start, bytes }) => {
                    match serde_json::from_slice::<Record>(&bytes) {
                        Ok(record) => {
                            self.stats.records += 1;
                            return Some(Ok(record));
                        }
                        Err(err) => {
                            log::trace!("Skip malformed object at offset {}: {}", start, err);
                            self.stats.malformed += 1;
                            self.rescan(start, &bytes);
                        }
                    }
                }
                Some(Event::Truncated { start, bytes }) => {
                    log::trace!("Skip object at offset {} left open by EOF.", start);
                    self.stats.malformed += 1;
                    self.rescan(start, &bytes);
                }
                Some(Event::Oversized { start, bytes }) => {
                    self.stats.malformed += 1;
                    self.rescan(start, &bytes);
                }
                Some(Event::Skipped) => self.stats.skipped += 1,
                Some(Event::Halt) | Some(Event::Eof) => self.done = true,
                None => (),
            }
        }

        None
    }
}

impl<R: BufRead> FusedIterator for RecordStream<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::skip_partial_line;
    use std::io::{BufReader, Cursor};

    fn stream(text: &str) -> RecordStream<Cursor<Vec<u8>>> {
        RecordStream::new(Cursor::new(text.as_bytes().to_vec()), 0, None)
    }

    fn keys(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|record| record.keys().cloned().collect::<Vec<_>>().join(","))
            .collect()
    }

    #[test]
    fn test_only_objects_are_emitted() {
        let mut records = stream("{\"a\":1}\n\"str\"\n42\n[1,{\"b\":2}]\ntrue\n{\"c\":{\"d\":\"}\"}}\n");

        let collected: Vec<Record> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(keys(&collected), vec!["a", "c"]);
        assert_eq!(collected[1]["c"]["d"], Value::String("}".to_string()));
        assert_eq!(
            records.stats(),
            StreamStats {
                records: 2,
                malformed: 0,
                skipped: 4
            }
        );
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let collected: Vec<Record> = stream(r#"{"t":"a \"}\" b\\"}{"u":2}"#)
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0]["t"], Value::String("a \"}\" b\\".to_string()));
    }

    #[test]
    fn test_malformed_object_is_skipped() {
        let mut records = stream("{\"a\": tru}\n{\"b\":1}\n");

        let collected: Vec<Record> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(keys(&collected), vec!["b"]);
        assert_eq!(records.stats().malformed, 1);
    }

    #[test]
    fn test_object_spanning_lines_and_buffers() {
        let text = "{\n  \"account\": {\"id\": \"7\", \"username\": \"x\"},\n  \"sentiment\": 0.5\n}\n{\"b\":2}";
        let reader = BufReader::with_capacity(3, Cursor::new(text.as_bytes().to_vec()));

        let collected: Vec<Record> = RecordStream::new(reader, 0, None)
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0]["account"]["id"], Value::String("7".to_string()));
    }

    /// Keys read by a range ending at `end` followed by those of the range after it.
    fn split_at(text: &str, end: u64) -> Vec<String> {
        let bytes = text.as_bytes().to_vec();

        let head: Vec<Record> = RecordStream::new(Cursor::new(bytes.clone()), 0, Some(end))
            .map(|r| r.unwrap())
            .collect();

        let mut reader = Cursor::new(bytes);
        reader.set_position(end);
        let position = end + skip_partial_line(&mut reader).unwrap();
        let tail: Vec<Record> = RecordStream::new(reader, position, None)
            .map(|r| r.unwrap())
            .collect();

        keys(&head).into_iter().chain(keys(&tail)).collect()
    }

    #[test]
    fn test_soft_range_end() {
        // Objects start at offsets 0, 8 and 16, lines end at 7, 15 and 23.
        let text = "{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n";

        let count = |end| {
            RecordStream::new(Cursor::new(text.as_bytes().to_vec()), 0, Some(end)).count()
        };

        assert_eq!(count(7), 1);
        assert_eq!(count(8), 2);
        assert_eq!(count(9), 2);
        assert_eq!(count(15), 2);
        assert_eq!(count(16), 3);
    }

    #[test]
    fn test_adjacent_ranges_read_every_record_once() {
        let texts = [
            " {\"a\":1}\n {\"b\":2}\n  {\"c\":3}\n {\"d\":4}\n",
            "{\"a\":1} {\"b\":2}\n{\"c\":3}{\"d\":4}\n",
            "{\"a\":1}\r\n7 {\"b\":2}\r\n\"s\"\r\n{\"c\":3} \r\n{\"d\":4}",
        ];

        for text in texts.iter() {
            for end in 0..=text.len() as u64 {
                assert_eq!(
                    split_at(text, end),
                    vec!["a", "b", "c", "d"],
                    "end {} of {:?}",
                    end,
                    text
                );
            }
        }
    }

    #[test]
    fn test_stream_past_its_end_is_empty() {
        let text = "{\"a\":1}\n";

        let count = RecordStream::new(Cursor::new(text.as_bytes().to_vec()), 8, Some(7)).count();

        assert_eq!(count, 0);
    }

    #[test]
    fn test_range_end_is_absolute() {
        let text = "{\"a\":1}\n{\"b\":2}\n";

        let count = RecordStream::new(Cursor::new(text.as_bytes().to_vec()), 100, Some(107)).count();

        assert_eq!(count, 1);
    }

    #[test]
    fn test_truncated_object_at_eof() {
        let mut records = stream("{\"a\":1}\n{\"b\":");

        assert_eq!(records.by_ref().count(), 1);
        assert_eq!(records.stats().malformed, 1);
    }

    #[test]
    fn test_truncated_line_does_not_swallow_later_records() {
        let text = concat!(
            "{\"created_at\":\"2024-01-01T10:00:00Z\",\"account\":{\"id\":\"u0\"\n",
            "{\"a\":{\"id\":\"u1\"}}\n",
            "{\"b\":{\"id\":\"u2\"}}\n",
            "{\"c\":{\"id\":\"u3\"}}\n",
            "{\"d\":{\"id\":\"u4\"}}\n",
        );
        let reader = BufReader::with_capacity(5, Cursor::new(text.as_bytes().to_vec()));
        let mut records = RecordStream::new(reader, 0, None);

        let collected: Vec<Record> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(keys(&collected), vec!["a", "b", "c", "d"]);
        assert_eq!(records.stats().malformed, 1);
    }

    #[test]
    fn test_unterminated_string_costs_one_line() {
        let mut records = stream("{\"a\":\"oops\n{\"b\":1}\n{\"c\":2}\n{\"d\":3}\n");

        let collected: Vec<Record> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(keys(&collected), vec!["b", "c", "d"]);
        assert_eq!(records.stats().malformed, 1);
    }

    #[test]
    fn test_unbalanced_object_is_scanned_again() {
        let mut records = stream("{\"a\":\n{\"b\":1}\n{\"c\":2}}\n{\"d\":3}\n");

        let collected: Vec<Record> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(keys(&collected), vec!["b", "c", "d"]);
        assert_eq!(
            records.stats(),
            StreamStats {
                records: 3,
                malformed: 1,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_stray_punctuation_is_skipped() {
        let mut records = stream("},{\"a\":1}");

        assert_eq!(records.by_ref().count(), 1);
        assert_eq!(records.stats().skipped, 2);
    }

    #[test]
    fn test_oversized_object_resyncs_at_next_line() {
        let text = "{\"big\":\"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\"}\n{\"b\":1}\n";
        let reader = BufReader::with_capacity(4, Cursor::new(text.as_bytes().to_vec()));
        let mut records = RecordStream::new(reader, 0, None).max_record_bytes(16);

        let collected: Vec<Record> = records.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(keys(&collected), vec!["b"]);
        assert_eq!(records.stats().malformed, 1);
    }
}
