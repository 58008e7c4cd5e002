// src/data/record.rs

//! Implements [`TraceRecord`] and [`RawRecord`], the two classifications
//! of one line of a CaRT log file, and the line parser producing them.
//!
//! The line grammar is the `dlog` header format:
//!
//! ```text
//! MM/DD-HH:MM:SS.cc hostname TAG[pid/tid/uid] fac  LVL <remainder>
//! ```
//!
//! The remainder of a _trace_ line encodes a function call with an
//! optional descriptor argument:
//!
//! ```text
//! src/cart/crt_rpc.c:244 crt_rpc_priv_alloc(0x55a3f8132e60) (opc: 0x1010001 rpc_pub: 0x55a3f8132e60) allocated.
//! ```
//!
//! Anything not matching the preamble grammar becomes a [`RawRecord`]
//! (foreign-library output is routinely interleaved in the same file).
//!
//! [`TraceRecord`]: TraceRecord
//! [`RawRecord`]: RawRecord

use crate::common::{Count, LineIndex, Pid, Tid, TriageError, TriageResult};

use std::fmt;
use std::sync::Arc;

use ::lazy_static::lazy_static;
use ::phf::phf_map;
use ::regex::Regex;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Severity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity of one log line; the closed 8-keyword set of the CaRT
/// logging macros, declared in rank order so that `Ord` means
/// "at least as severe": `severity <= Severity::Warn` is the usual
/// "WARN or worse" check.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Severity {
    Fatal = 1,
    Emrg = 2,
    Crit = 3,
    Err = 4,
    Warn = 5,
    Note = 6,
    Info = 7,
    Dbug = 8,
}

/// The closed severity keyword map. A keyword outside this map within a
/// well-formed preamble means the file is not a CaRT log
/// ([`TriageError::InvalidLogFile`]).
pub static SEVERITY_KEYWORDS: phf::Map<&'static str, Severity> = phf_map! {
    "FATAL" => Severity::Fatal,
    "EMRG" => Severity::Emrg,
    "CRIT" => Severity::Crit,
    "ERR" => Severity::Err,
    "WARN" => Severity::Warn,
    "NOTE" => Severity::Note,
    "INFO" => Severity::Info,
    "DBUG" => Severity::Dbug,
};

impl Severity {
    /// Numeric rank, 1 (most severe) ..= 8 (least severe).
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// The keyword as printed in a log line preamble.
    pub const fn as_keyword(self) -> &'static str {
        match self {
            Severity::Fatal => "FATAL",
            Severity::Emrg => "EMRG",
            Severity::Crit => "CRIT",
            Severity::Err => "ERR",
            Severity::Warn => "WARN",
            Severity::Note => "NOTE",
            Severity::Info => "INFO",
            Severity::Dbug => "DBUG",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_keyword())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RawRecord
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One line that did not match the structured grammar; kept verbatim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRecord {
    /// the verbatim line, trailing newline stripped
    pub line: String,
    /// source line number, 1-based
    pub index: LineIndex,
}

/// Thread-safe Atomic Reference Counting pointer to a [`RawRecord`].
pub type RawRecordP = Arc<RawRecord>;

impl RawRecord {
    pub fn new(line: &str, index: LineIndex) -> RawRecord {
        RawRecord {
            line: line.trim_end_matches(['\n', '\r']).to_string(),
            index,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TraceRecord
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timestamp field is fixed-width: `MM/DD-HH:MM:SS.cc`
const TIMESTAMP_LEN: usize = 17;

/// Facility and severity columns are printed `%-4s`; shorter names are
/// space-padded to this width.
const FAC_COL_MIN: usize = 4;

/// Facilities whose INFO/CRIT lines carry a leading `<host:port>`
/// annotation inserted by the transport; stripped before message-field
/// extraction. Applies only under that exact (severity, facility)
/// combination.
const HOST_ANNOTATED_FACS: [&str; 2] = ["hg", "external"];

/// A classified log line.
///
/// `fields` holds the whitespace-split remainder after the preamble:
/// `fields[0]` is the `file.c:lineno` token, `fields[1]` the function
/// token, `fields[2..]` the message. `filename`, `lineno`, `function`
/// and `descriptor` are computed eagerly at parse time.
///
/// `descriptor` is the raw pointer text as printed. It is **not**
/// disambiguated: the same address may name different objects over the
/// life of the file, and is only meaningful within one pid's address
/// space. See [`IdentityResolver`].
///
/// [`IdentityResolver`]: crate::readers::resolver::IdentityResolver
#[derive(Clone, Debug)]
pub struct TraceRecord {
    /// source line number, 1-based, strictly increasing per file scan
    pub index: LineIndex,
    /// process id that emitted the line
    pub pid: Pid,
    /// thread id that emitted the line
    pub tid: Tid,
    /// timestamp text, verbatim
    pub ts: String,
    /// emitting hostname
    pub hostname: String,
    /// facility mask (subsystem tag)
    pub facility: String,
    pub severity: Severity,
    /// does the remainder encode a function call (with optional
    /// descriptor argument)?
    pub is_trace: bool,
    /// called function name; always present when `is_trace`
    pub function: Option<String>,
    /// raw descriptor/pointer text; empty if none or `(nil)`
    pub descriptor: String,
    /// remainder tokens; see struct docs for layout
    pub fields: Vec<String>,
    /// source file of the logging call, from `fields[0]`
    pub filename: Option<String>,
    /// source line of the logging call, from `fields[0]`
    pub lineno: Option<u32>,
}

/// Thread-safe Atomic Reference Counting pointer to a [`TraceRecord`].
pub type TraceRecordP = Arc<TraceRecord>;

/// One parsed line of a log file: either structured or verbatim.
#[derive(Clone, Debug)]
pub enum LogRecord {
    Trace(TraceRecordP),
    Raw(RawRecordP),
}

impl LogRecord {
    pub fn index(&self) -> LineIndex {
        match self {
            LogRecord::Trace(tr) => tr.index,
            LogRecord::Raw(rr) => rr.index,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, LogRecord::Raw(_))
    }

    /// `pid` of a structured record; `RawRecord`s have no pid.
    pub fn pid(&self) -> Option<Pid> {
        match self {
            LogRecord::Trace(tr) => Some(tr.pid),
            LogRecord::Raw(_) => None,
        }
    }

    /// the verbatim or reconstructed line text, for dump printing
    pub fn text(&self) -> String {
        match self {
            LogRecord::Trace(tr) => tr.to_line(),
            LogRecord::Raw(rr) => rr.line.clone(),
        }
    }
}

lazy_static! {
    /// pointers, e.g. `0x55a3f8132e60`
    static ref RE_POINTER: Regex = Regex::new(r"0x[0-9a-fA-F]+").unwrap();
    /// opaque-id substructures, e.g. `Gah(root.rev.other)`
    static ref RE_OPAQUE_ID: Regex =
        Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\(([A-Za-z0-9_]+)\.[^().\s]+\.[^().\s]+\)").unwrap();
}

/// Parse one text line into a classified [`LogRecord`].
///
/// Never fails for malformed structure; such lines become [`RawRecord`]s.
/// The single hard failure is a recognized preamble carrying a severity
/// keyword outside [`SEVERITY_KEYWORDS`].
pub fn parse_line(line: &str, index: LineIndex) -> TriageResult<LogRecord> {
    match TraceRecord::parse(line, index)? {
        Some(record) => Ok(LogRecord::Trace(TraceRecordP::new(record))),
        None => Ok(LogRecord::Raw(RawRecordP::new(RawRecord::new(line, index)))),
    }
}

/// Is this byte string a plausible `MM/DD-HH:MM:SS.cc` timestamp?
fn is_timestamp(field: &str) -> bool {
    let b = field.as_bytes();
    if b.len() != TIMESTAMP_LEN {
        return false;
    }
    if b[2] != b'/' || b[5] != b'-' {
        return false;
    }

    b[0].is_ascii_digit() && b[1].is_ascii_digit()
}

/// Extract `(pid, tid)` from a `TAG[pid/tid/uid]` preamble field.
fn parse_pidfield(field: &str) -> Option<(Pid, Tid)> {
    let open = field.find('[')?;
    let inner = field
        .strip_suffix(']')?
        .get(open + 1..)?;
    let mut parts = inner.split('/');
    let pid: Pid = parts.next()?.parse().ok()?;
    let tid: Tid = match parts.next() {
        Some(val) => val.parse().ok()?,
        None => 0,
    };

    Some((pid, tid))
}

impl TraceRecord {
    /// Parse one line. Returns `Ok(None)` when the line does not match
    /// the structured grammar.
    pub fn parse(line: &str, index: LineIndex) -> TriageResult<Option<TraceRecord>> {
        let line: &str = line.trim_end_matches(['\n', '\r']);
        let mut preamble = line.split_whitespace();
        let ts = match preamble.next() {
            Some(val) if is_timestamp(val) => val,
            _ => return Ok(None),
        };
        let hostname = match preamble.next() {
            Some(val) => val,
            None => return Ok(None),
        };
        let pidfield = match preamble.next() {
            Some(val) => val,
            None => return Ok(None),
        };
        let (pid, tid) = match parse_pidfield(pidfield) {
            Some(val) => val,
            None => return Ok(None),
        };
        let facility = match preamble.next() {
            Some(val) => val,
            None => return Ok(None),
        };
        let keyword = match preamble.next() {
            Some(val) => val,
            None => return Ok(None),
        };
        // the preamble is well-formed; an unknown severity keyword is
        // now a hard failure, not a RawRecord
        let severity: Severity = match SEVERITY_KEYWORDS.get(keyword) {
            Some(val) => *val,
            None => {
                return Err(TriageError::InvalidLogFile {
                    keyword: keyword.to_string(),
                    index,
                })
            }
        };

        // fixed base offset plus the two variable-width fields; the
        // facility and severity columns are `%-4s`-padded so shorter
        // names still occupy four bytes
        let preamble_len: usize = TIMESTAMP_LEN
            + 1
            + hostname.len()
            + 1
            + pidfield.len()
            + 1
            + FAC_COL_MIN.max(facility.len())
            + 1
            + FAC_COL_MIN.max(keyword.len())
            + 1;
        let remainder: &str = line.get(preamble_len..).unwrap_or("");
        let mut fields: Vec<String> = remainder
            .split_whitespace()
            .map(String::from)
            .collect();

        // transport-inserted `<host:port>` annotation on INFO/CRIT lines
        // of specific facilities; a structural quirk of the grammar
        if matches!(severity, Severity::Info | Severity::Crit)
            && HOST_ANNOTATED_FACS.contains(&facility)
            && fields
                .first()
                .map_or(false, |tok| tok.starts_with('<') && tok.ends_with('>'))
        {
            fields.remove(0);
        }

        let (filename, lineno) = match fields.first() {
            Some(tok) => match tok.rsplit_once(':') {
                Some((fname, lno)) => (Some(fname.to_string()), lno.parse::<u32>().ok()),
                None => (Some(tok.clone()), None),
            },
            None => (None, None),
        };

        let mut function: Option<String> = None;
        let mut descriptor = String::new();
        if let Some(tok) = fields.get(1) {
            if let Some(name) = tok.strip_suffix("()") {
                // no-argument call
                function = Some(name.to_string());
            } else if tok.ends_with(')') {
                if let Some(open) = tok.find('(') {
                    function = Some(tok[..open].to_string());
                    let arg = &tok[open + 1..tok.len() - 1];
                    // `(nil)` means "no descriptor"
                    if arg != "(nil)" {
                        descriptor = arg.to_string();
                    }
                }
            }
        }

        Ok(Some(TraceRecord {
            index,
            pid,
            tid,
            ts: ts.to_string(),
            hostname: hostname.to_string(),
            facility: facility.to_string(),
            severity,
            is_trace: function.is_some(),
            function,
            descriptor,
            fields,
            filename,
            lineno,
        }))
    }

    // ─────────────────────────────────────────────────────────────────
    // accessors

    /// Index into `fields`; negative values count from the end, as the
    /// message grammars are often anchored to the line tail.
    pub fn field(&self, idx: isize) -> Option<&str> {
        let n = self.fields.len() as isize;
        let i: isize = if idx < 0 { n + idx } else { idx };
        if i < 0 || i >= n {
            return None;
        }

        Some(self.fields[i as usize].as_str())
    }

    /// Message token `i` (skipping the `file:lineno` and function tokens).
    fn mtok(&self, i: usize) -> Option<&str> {
        self.fields.get(2 + i).map(String::as_str)
    }

    /// The message remainder, filename and function tokens stripped.
    pub fn msg(&self) -> String {
        self.fields
            .get(2..)
            .unwrap_or(&[])
            .join(" ")
    }

    /// Message rendering with addresses and opaque-id substructures
    /// redacted, stable across runs; for diff/dedup reporting.
    pub fn anon_msg(&self) -> String {
        let msg = self.msg();
        let msg = RE_OPAQUE_ID.replace_all(&msg, "$1($2.-.-)");

        RE_POINTER.replace_all(&msg, "0x...").into_owned()
    }

    /// `filename:lineno` of the logging call, for gcc-style reporting.
    pub fn location(&self) -> String {
        match (&self.filename, self.lineno) {
            (Some(fname), Some(lno)) => format!("{}:{}", fname, lno),
            (Some(fname), None) => fname.clone(),
            _ => String::from("Unknown"),
        }
    }

    /// Reconstruct a one-line rendering for dump printing.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} [{}/{}] {:<4} {} {}",
            self.ts,
            self.hostname,
            self.pid,
            self.tid,
            self.facility,
            self.severity,
            self.fields.join(" "),
        )
    }

    // ─────────────────────────────────────────────────────────────────
    // classification predicates

    /// a descriptor registration: `Registered new '<type>' from <parent>.`
    pub fn is_new(&self) -> bool {
        self.is_trace && self.mtok(0) == Some("Registered") && self.mtok(1) == Some("new")
    }

    /// a descriptor deregistration: `Deregistered.`
    pub fn is_dereg(&self) -> bool {
        self.is_trace && self.mtok(0).map(trim_dot) == Some("Deregistered")
    }

    /// a link event: `Link '<type>' to <target>.`
    ///
    /// The printed target occupies the parent position while the
    /// function argument is the _new_ child; see
    /// [`IdentityResolver`] for the swapped interpretation.
    ///
    /// [`IdentityResolver`]: crate::readers::resolver::IdentityResolver
    pub fn is_link(&self) -> bool {
        self.is_trace && self.mtok(0) == Some("Link")
    }

    /// parent (or link target) address text of a registration or link
    /// event; the sentinel parent is `"root"`
    pub fn parent(&self) -> Option<&str> {
        if !self.is_new() && !self.is_link() {
            return None;
        }

        self.field(-1).map(trim_dot)
    }

    /// a new RPC: `(opc: 0x… rpc_pub: 0x…) allocated.`, or the
    /// server-side `… allocated per RPC request received.`
    pub fn is_new_rpc(&self) -> bool {
        if !self.is_trace {
            return false;
        }
        match self.field(-1) {
            Some("allocated.") => true,
            Some("received.") => self.fields.iter().any(|tok| tok == "allocated"),
            _ => false,
        }
    }

    /// opcode of a new-RPC event
    pub fn rpc_opcode(&self) -> Option<&str> {
        if !self.is_new_rpc() {
            return None;
        }
        // the server-side form appends four tokens after "allocated"
        match self.field(-4) {
            Some("per") => self.field(-8),
            other => other,
        }
    }

    /// an RPC teardown: `destroying.`
    pub fn is_dereg_rpc(&self) -> bool {
        self.is_trace && self.mtok(0).map(trim_dot) == Some("destroying")
    }

    /// RPC submitted to the transport: `submitted.`
    pub fn is_submitted(&self) -> bool {
        self.is_trace && self.field(-1) == Some("submitted.")
    }

    /// RPC handed to the network: `sent to rank N uri: U`
    pub fn is_sent(&self) -> bool {
        self.is_trace
            && self.function.as_deref() == Some("crt_hg_req_send")
            && self.field(-6) == Some("sent")
    }

    /// RPC completion: `Invoking RPC callback … rc: N`
    pub fn is_callback(&self) -> bool {
        self.is_trace
            && self.mtok(0) == Some("Invoking")
            && self.mtok(1) == Some("RPC")
            && self.mtok(2) == Some("callback")
    }

    /// completion result code, the integer following the `rc:` token
    pub fn callback_result(&self) -> Option<i64> {
        let pos = self.fields.iter().position(|tok| tok == "rc:")?;
        let val = self.fields.get(pos + 1)?;

        trim_dot(val).parse::<i64>().ok()
    }

    // ─────────────────────────────────────────────────────────────────
    // memory-call predicates
    //
    // `alloc('buf') size: 24 at 0x….`
    // `alloc('arr') size: 8 * 10 at 0x….`          (count * element-size)
    // `free('buf') at 0x….`
    // `realloc('arr') size: 160 (was 80) old: 0x… new: 0x….`

    /// an allocation point
    pub fn is_alloc(&self) -> bool {
        self.mtok(0).map_or(false, |tok| tok.starts_with("alloc("))
    }

    /// byte size of an allocation, computing the array variant; `None`
    /// when the printed sizes do not parse or their product overflows
    pub fn alloc_size(&self) -> Option<Count> {
        let size: Count = self.mtok(2)?.parse().ok()?;
        if self.mtok(3) == Some("*") {
            let count: Count = self.mtok(4)?.parse().ok()?;
            return size.checked_mul(count);
        }

        Some(size)
    }

    /// pointer of an allocation (also of the leak-report form)
    pub fn alloc_pointer(&self) -> Option<&str> {
        self.field(-1).map(trim_dot)
    }

    /// a free point
    pub fn is_free(&self) -> bool {
        self.mtok(0).map_or(false, |tok| tok.starts_with("free("))
    }

    /// pointer being freed; may be the literal `(nil)`
    pub fn free_pointer(&self) -> Option<&str> {
        self.field(-1).map(trim_dot)
    }

    /// a realloc point
    pub fn is_realloc(&self) -> bool {
        self.mtok(0).map_or(false, |tok| tok.starts_with("realloc("))
    }

    /// `(new, old)` pointers of a realloc
    pub fn realloc_pointers(&self) -> Option<(&str, &str)> {
        let new = self.field(-1).map(trim_dot)?;
        let old = self.field(-3)?;

        Some((new, old))
    }

    /// `(new, old)` byte sizes of a realloc
    pub fn realloc_sizes(&self) -> Option<(Count, Count)> {
        let new: Count = self.mtok(2)?.parse().ok()?;
        let old: Count = self.mtok(4)?.trim_end_matches(')').parse().ok()?;

        Some((new, old))
    }
}

/// strip the sentence-ending period of a message token
fn trim_dot(tok: &str) -> &str {
    tok.trim_end_matches('.')
}
