// src/readers/logstream.rs

//! Implements a [`LogStream`], the file-access layer of the engine.
//!
//! A `LogStream` owns exactly one file handle. Small files are
//! pre-parsed into an in-memory ordered sequence during the initial
//! classification pass; files above [`STREAM_SZ_THRESHOLD`] stay in
//! streaming mode and are re-read via seek-to-0 on every restart.
//!
//! Character-decode failures never abort a scan: the affected line is
//! re-decoded as Latin-1, a diagnostic naming the byte offset and the
//! last recoverable line is printed, and `file_corrupt` is latched.
//!
//! [`STREAM_SZ_THRESHOLD`]: crate::common::STREAM_SZ_THRESHOLD

use crate::common::{Count, FPath, FileSz, LineIndex, Pid, TriageError, TriageResult,
                    STREAM_SZ_THRESHOLD};
use crate::data::record::{parse_line, LogRecord};
use crate::{de_err, e_wrn};

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

use ::more_asserts::debug_assert_le;
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LogStream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The set of pids observed in a file. Ordered.
pub type Pids = BTreeSet<Pid>;

/// Per-call record filters for [`LogStream::iterate`]. Supplied per
/// call; never mutates stored stream state.
#[derive(Clone, Copy, Debug, Default)]
pub struct IterFilter {
    /// only structured records of this pid
    pub pid: Option<Pid>,
    /// exclude structured records that are not function-call traces
    pub trace_only: bool,
    /// include `RawRecord`s (which carry no pid)
    pub raw: bool,
}

impl IterFilter {
    fn admits(&self, record: &LogRecord) -> bool {
        match record {
            LogRecord::Raw(_) => self.raw,
            LogRecord::Trace(tr) => {
                if let Some(pid) = self.pid {
                    if tr.pid != pid {
                        return false;
                    }
                }
                if self.trace_only && !tr.is_trace {
                    return false;
                }

                true
            }
        }
    }
}

/// Loads or streams one CaRT log file and produces restartable,
/// filterable sequences of [`LogRecord`]s.
pub struct LogStream {
    /// path to the log file
    pub path: FPath,
    /// file size in bytes at open
    filesz: FileSz,
    /// streaming mode? (decided once at open)
    streaming: bool,
    /// the single file handle; `None` after a preloading pass has
    /// consumed the file
    reader: Option<BufReader<File>>,
    /// pre-parsed records (preloaded mode only)
    records: Vec<LogRecord>,
    /// pids observed during the initial classification pass
    pids: Pids,
    /// latched when any line needed the Latin-1 decode fallback
    pub file_corrupt: bool,
    /// lines scanned during the initial pass
    count_lines: Count,
    /// lines that did not match the structured grammar
    count_raw: Count,
}

impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("LogStream")
            .field("path", &self.path)
            .field("filesz", &self.filesz)
            .field("streaming", &self.streaming)
            .field("pids", &self.pids)
            .field("lines", &self.count_lines)
            .field("raw", &self.count_raw)
            .field("file_corrupt", &self.file_corrupt)
            .finish()
    }
}

/// Decode one line of bytes: UTF-8, falling back to Latin-1.
///
/// On fallback, prints one diagnostic naming the failing byte offset
/// and the last fully-recoverable line, and latches `corrupt`.
fn decode_line(bytes: &[u8], index: LineIndex, offset: FileSz, corrupt: &mut bool) -> String {
    match std::str::from_utf8(bytes) {
        Ok(val) => val.to_string(),
        Err(err) => {
            if !*corrupt {
                e_wrn!(
                    "UTF-8 decode error at byte offset {} (last good line {}); \
                     re-decoding as Latin-1",
                    offset + err.valid_up_to() as FileSz,
                    index.saturating_sub(1),
                );
            }
            *corrupt = true;

            encoding_rs::mem::decode_latin1(bytes).into_owned()
        }
    }
}

impl LogStream {
    /// Open a log file and run the initial classification pass.
    ///
    /// The pass validates every severity keyword (so
    /// [`TriageError::InvalidLogFile`] surfaces here, in both modes),
    /// collects the pid set, and — for files at or below
    /// [`STREAM_SZ_THRESHOLD`] — materializes the record sequence.
    pub fn new(path: &FPath) -> TriageResult<LogStream> {
        LogStream::new_with_threshold(path, STREAM_SZ_THRESHOLD)
    }

    /// [`LogStream::new`] with an explicit streaming threshold.
    pub fn new_with_threshold(path: &FPath, threshold: FileSz) -> TriageResult<LogStream> {
        defn!("({:?}, {})", path, threshold);
        let file = File::open(path)?;
        let filesz: FileSz = file.metadata()?.len();
        let streaming: bool = filesz > threshold;
        defo!("filesz {}, streaming {}", filesz, streaming);
        let mut stream = LogStream {
            path: path.clone(),
            filesz,
            streaming,
            reader: Some(BufReader::new(file)),
            records: Vec::new(),
            pids: Pids::new(),
            file_corrupt: false,
            count_lines: 0,
            count_raw: 0,
        };
        stream.classify()?;
        defx!("{:?}", stream);

        Ok(stream)
    }

    /// The initial classification pass over the whole file.
    fn classify(&mut self) -> TriageResult<()> {
        let reader = match self.reader.as_mut() {
            Some(val) => val,
            None => return Ok(()),
        };
        let mut buf: Vec<u8> = Vec::with_capacity(0x200);
        let mut index: LineIndex = 0;
        let mut offset: FileSz = 0;
        loop {
            buf.clear();
            let sz = reader.read_until(b'\n', &mut buf)?;
            if sz == 0 {
                break;
            }
            index += 1;
            let line = decode_line(&buf, index, offset, &mut self.file_corrupt);
            offset += sz as FileSz;
            debug_assert_le!(offset, self.filesz);
            let record = parse_line(&line, index)?;
            match &record {
                LogRecord::Trace(tr) => {
                    self.pids.insert(tr.pid);
                }
                LogRecord::Raw(_) => {
                    self.count_raw += 1;
                }
            }
            if !self.streaming {
                self.records.push(record);
            }
        }
        self.count_lines = index as Count;
        if !self.streaming {
            // preloaded; the file handle has no further use
            self.reader = None;
        }

        Ok(())
    }

    /// The ordered set of pids observed in the file.
    pub fn pids(&self) -> &Pids {
        &self.pids
    }

    pub fn filesz(&self) -> FileSz {
        self.filesz
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn count_lines(&self) -> Count {
        self.count_lines
    }

    pub fn count_raw(&self) -> Count {
        self.count_raw
    }

    /// A restartable filtered sequence over the file.
    ///
    /// Every call restarts from line 1 (streaming mode seeks the single
    /// file handle back to offset zero). Fails with
    /// [`TriageError::InvalidPid`] when `filter.pid` was never observed.
    pub fn iterate(&mut self, filter: IterFilter) -> TriageResult<RecordIter<'_>> {
        defñ!("({:?})", filter);
        if let Some(pid) = filter.pid {
            if !self.pids.contains(&pid) {
                return Err(TriageError::unknown_pid(pid));
            }
        }
        if let Some(reader) = self.reader.as_mut() {
            reader.seek(SeekFrom::Start(0))?;
        }

        Ok(RecordIter {
            stream: self,
            filter,
            pos: 0,
            index: 0,
            offset: 0,
            buf: Vec::with_capacity(0x200),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RecordIter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One filtered pass over a [`LogStream`], from
/// [`LogStream::iterate`]. Yields `Arc`-shared records, so cloning an
/// item is cheap.
pub struct RecordIter<'a> {
    stream: &'a mut LogStream,
    filter: IterFilter,
    /// cursor into `stream.records` (preloaded mode)
    pos: usize,
    /// running line number (streaming mode)
    index: LineIndex,
    /// running byte offset (streaming mode)
    offset: FileSz,
    /// streaming read buffer, reused between lines
    buf: Vec<u8>,
}

impl RecordIter<'_> {
    fn next_preloaded(&mut self) -> Option<LogRecord> {
        let record = self.stream.records.get(self.pos)?.clone();
        self.pos += 1;

        Some(record)
    }

    fn next_streaming(&mut self) -> Option<LogRecord> {
        let reader = self.stream.reader.as_mut()?;
        loop {
            self.buf.clear();
            let sz = match reader.read_until(b'\n', &mut self.buf) {
                Ok(val) => val,
                Err(err) => {
                    de_err!("read_until failed at line {}: {}", self.index + 1, err);
                    return None;
                }
            };
            if sz == 0 {
                return None;
            }
            self.index += 1;
            let line = decode_line(
                &self.buf,
                self.index,
                self.offset,
                &mut self.stream.file_corrupt,
            );
            self.offset += sz as FileSz;
            match parse_line(&line, self.index) {
                Ok(record) => return Some(record),
                Err(err) => {
                    // the initial pass validated the whole file; a parse
                    // failure on a re-pass means the file changed under us
                    de_err!("line {} failed to re-parse: {}", self.index, err);
                    continue;
                }
            }
        }
    }
}

impl Iterator for RecordIter<'_> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<LogRecord> {
        loop {
            let record = if self.stream.streaming {
                self.next_streaming()?
            } else {
                self.next_preloaded()?
            };
            if self.filter.admits(&record) {
                return Some(record);
            }
        }
    }
}
