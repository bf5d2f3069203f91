//! Reader stage: stream one input file's lines onto the record channel.
//!
//! One reader owns one file handle (and its gzip stream, when the filename
//! ends in `.gz`). Lines are located with `memchr` over `fill_buf` windows;
//! a carry buffer joins partial lines across refills so no line is ever
//! re-read. The reader does *not* trim or length-filter — that is worker
//! work, and keeping the reader branch-light keeps decompression fed.
//!
//! # Guarantees
//!
//! - Every non-empty line produces exactly one record, in file order.
//! - The file handle and decompression stream close on all exit paths.
//! - The stop signal is consulted once per buffer refill, not per line.
//!
//! # Failure Semantics
//!
//! Open failures, invalid gzip, mid-stream I/O errors, and lines exceeding
//! the configured cap are critical: the reader returns the error and the
//! build fails. An empty file is not an error.

use crate::cancel::StopSignal;
use crate::error::BuildError;
use crate::table::PresenceMask;

use crossbeam_channel::Sender;
use flate2::read::MultiGzDecoder;
use memchr::memchr;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Read-buffer size for the underlying stream (raw or decompressed).
const READ_BUF_BYTES: usize = 64 * 1024;

/// One line tagged with its file's one-hot presence bit.
pub(crate) struct Record {
    pub bytes: Box<[u8]>,
    pub mask: PresenceMask,
}

/// Streams the lines of exactly one input file.
pub(crate) struct LineReader {
    path: PathBuf,
    mask: PresenceMask,
    max_line_bytes: usize,
}

impl LineReader {
    pub(crate) fn new(path: PathBuf, mask: PresenceMask, max_line_bytes: usize) -> Self {
        Self {
            path,
            mask,
            max_line_bytes,
        }
    }

    /// Runs the reader to completion, returning the number of lines scanned
    /// (including empty and later-filtered ones).
    ///
    /// Returns early with `Ok` when the stop signal is raised or the record
    /// channel disconnects; the orchestrator decides what either means.
    pub(crate) fn run(
        &self,
        records: &Sender<Record>,
        stop: &StopSignal,
    ) -> Result<u64, BuildError> {
        let file = File::open(&self.path).map_err(|source| BuildError::FileOpenFailed {
            path: self.path.clone(),
            source,
        })?;

        if is_gzip_path(&self.path) {
            let rd = BufReader::with_capacity(READ_BUF_BYTES, MultiGzDecoder::new(file));
            self.scan(rd, true, records, stop)
        } else {
            let rd = BufReader::with_capacity(READ_BUF_BYTES, file);
            self.scan(rd, false, records, stop)
        }
    }

    fn scan<R: BufRead>(
        &self,
        mut rd: R,
        gz: bool,
        records: &Sender<Record>,
        stop: &StopSignal,
    ) -> Result<u64, BuildError> {
        let mut lines: u64 = 0;
        // Partial line spanning buffer refills. Grows at most to the line cap.
        let mut carry: Vec<u8> = Vec::new();

        loop {
            if stop.is_set() {
                return Ok(lines);
            }

            let consumed;
            {
                // EINTR-safe refill; see read_some-style retry loops.
                let buf = loop {
                    match rd.fill_buf() {
                        Ok(buf) => break buf,
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(self.classify_stream_error(gz, e)),
                    }
                };

                if buf.is_empty() {
                    // EOF. A final unterminated line still counts.
                    if !carry.is_empty() {
                        lines += 1;
                        let _ = send_line(records, std::mem::take(&mut carry), self.mask);
                    }
                    return Ok(lines);
                }

                match memchr(b'\n', buf) {
                    Some(pos) => {
                        let total = carry.len() + pos;
                        if total > self.max_line_bytes {
                            return Err(self.line_overflow(total));
                        }
                        lines += 1;
                        if total > 0 {
                            let line: Vec<u8> = if carry.is_empty() {
                                buf[..pos].to_vec()
                            } else {
                                carry.extend_from_slice(&buf[..pos]);
                                std::mem::take(&mut carry)
                            };
                            if send_line(records, line, self.mask).is_err() {
                                // All receivers gone: a worker died. The
                                // orchestrator reports the panic; just stop.
                                return Ok(lines);
                            }
                        }
                        consumed = pos + 1;
                    }
                    None => {
                        if carry.len() + buf.len() > self.max_line_bytes {
                            return Err(self.line_overflow(carry.len() + buf.len()));
                        }
                        carry.extend_from_slice(buf);
                        consumed = buf.len();
                    }
                }
            }
            rd.consume(consumed);
        }
    }

    fn line_overflow(&self, len: usize) -> BuildError {
        BuildError::ReadFailed {
            path: self.path.clone(),
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "line of {len} bytes exceeds max_line_bytes ({})",
                    self.max_line_bytes
                ),
            ),
        }
    }

    /// Splits stream failures between the gzip and plain-I/O taxonomies.
    ///
    /// flate2 surfaces header and stream corruption as `InvalidInput` /
    /// `InvalidData`, and truncation as `UnexpectedEof`; anything else on a
    /// gzip stream is ordinary I/O.
    fn classify_stream_error(&self, gz: bool, err: io::Error) -> BuildError {
        let decompression = gz
            && matches!(
                err.kind(),
                io::ErrorKind::InvalidData
                    | io::ErrorKind::InvalidInput
                    | io::ErrorKind::UnexpectedEof
            );
        if decompression {
            BuildError::DecompressionFailed {
                path: self.path.clone(),
                source: err,
            }
        } else {
            BuildError::ReadFailed {
                path: self.path.clone(),
                source: err,
            }
        }
    }
}

fn send_line(
    records: &Sender<Record>,
    line: Vec<u8>,
    mask: PresenceMask,
) -> Result<(), crossbeam_channel::SendError<Record>> {
    records.send(Record {
        bytes: line.into_boxed_slice(),
        mask,
    })
}

/// `.gz` suffix check, ASCII case-insensitive.
fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("gz"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crossbeam_channel::unbounded;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn stop() -> StopSignal {
        StopSignal::new(CancelToken::new())
    }

    fn collect(path: &Path, mask: PresenceMask) -> (u64, Vec<Vec<u8>>) {
        let (tx, rx) = unbounded();
        let reader = LineReader::new(path.to_path_buf(), mask, 64 * 1024);
        let lines = reader.run(&tx, &stop()).unwrap();
        drop(tx);
        let recs: Vec<Vec<u8>> = rx.iter().map(|r| r.bytes.into_vec()).collect();
        (lines, recs)
    }

    #[test]
    fn plain_file_emits_non_empty_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codes.txt");
        fs::write(&path, "ALPHA111\n\nBRAVO222\nCHARLIE33").unwrap();

        let (lines, recs) = collect(&path, 0b001);
        // Three non-empty lines plus one empty line scanned.
        assert_eq!(lines, 4);
        assert_eq!(recs, vec![b"ALPHA111".to_vec(), b"BRAVO222".to_vec(), b"CHARLIE33".to_vec()]);
    }

    #[test]
    fn crlf_lines_keep_the_carriage_return() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crlf.txt");
        fs::write(&path, "ALPHA111\r\nBRAVO222\r\n").unwrap();

        let (_, recs) = collect(&path, 0b001);
        // Trimming is worker work; the reader passes the CR through.
        assert_eq!(recs, vec![b"ALPHA111\r".to_vec(), b"BRAVO222\r".to_vec()]);
    }

    #[test]
    fn gzip_file_is_transparently_decompressed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codes.txt.gz");
        let file = fs::File::create(&path).unwrap();
        let mut enc = GzEncoder::new(file, Compression::default());
        enc.write_all(b"GZCODE001\nGZCODE002\n").unwrap();
        enc.finish().unwrap();

        let (lines, recs) = collect(&path, 0b010);
        assert_eq!(lines, 2);
        assert_eq!(recs, vec![b"GZCODE001".to_vec(), b"GZCODE002".to_vec()]);
    }

    #[test]
    fn gz_suffix_is_case_insensitive() {
        assert!(is_gzip_path(Path::new("codes.GZ")));
        assert!(is_gzip_path(Path::new("codes.txt.Gz")));
        assert!(!is_gzip_path(Path::new("codes.gzip")));
        assert!(!is_gzip_path(Path::new("codes.txt")));
    }

    #[test]
    fn invalid_gzip_is_a_decompression_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.gz");
        fs::write(&path, b"this is not a gzip stream at all").unwrap();

        let (tx, _rx) = unbounded();
        let reader = LineReader::new(path, 0b001, 64 * 1024);
        match reader.run(&tx, &stop()) {
            Err(BuildError::DecompressionFailed { .. }) => {}
            other => panic!("expected DecompressionFailed, got {other:?}"),
        }
    }

    #[test]
    fn oversized_line_is_a_read_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.txt");
        let mut data = vec![b'x'; 200];
        data.push(b'\n');
        fs::write(&path, &data).unwrap();

        let (tx, _rx) = unbounded();
        let reader = LineReader::new(path, 0b001, 128);
        match reader.run(&tx, &stop()) {
            Err(BuildError::ReadFailed { .. }) => {}
            other => panic!("expected ReadFailed, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_open_failure() {
        let (tx, _rx) = unbounded();
        let reader = LineReader::new(PathBuf::from("/nonexistent/codes.txt"), 0b001, 1024);
        match reader.run(&tx, &stop()) {
            Err(BuildError::FileOpenFailed { .. }) => {}
            other => panic!("expected FileOpenFailed, got {other:?}"),
        }
    }

    #[test]
    fn raised_stop_signal_halts_before_reading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codes.txt");
        fs::write(&path, "ALPHA111\nBRAVO222\n").unwrap();

        let signal = stop();
        signal.raise_abort();

        let (tx, rx) = unbounded();
        let reader = LineReader::new(path, 0b001, 1024);
        let lines = reader.run(&tx, &signal).unwrap();
        drop(tx);
        assert_eq!(lines, 0);
        assert_eq!(rx.iter().count(), 0);
    }

    #[test]
    fn empty_file_completes_with_zero_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "").unwrap();

        let (lines, recs) = collect(&path, 0b100);
        assert_eq!(lines, 0);
        assert!(recs.is_empty());
    }
}
