// src/tests/report_tests.rs

//! Tests of violation rendering, the tally table, the hierarchy dump
//! and the frequency summary.

use crate::data::record::{LogRecord, Severity, TraceRecordP};
use crate::printer::report::{render_rpc_table, HierarchyReporter, ReportSession};
use crate::printer::summary::LogSummary;
use crate::readers::logstream::{IterFilter, LogStream};
use crate::readers::resolver::IdentityResolver;
use crate::trackers::rpc::RpcLifecycleTracker;
use crate::trackers::Violation;
use crate::tests::common::{
    create_temp_file,
    dlog_line,
    dlog_line_pid,
    ntf_fpath,
    rem_ref,
    rem_register,
    rem_rpc_alloc,
    rem_rpc_complete,
    rem_rpc_destroy,
    rem_rpc_sent,
    rem_rpc_submit,
    NTF,
    PID_A,
    PID_B,
};

fn parse_one(line: &str) -> TraceRecordP {
    TraceRecordP::new(
        crate::data::record::TraceRecord::parse(line, 1)
            .unwrap()
            .unwrap(),
    )
}

#[test]
fn test_violation_render_gcc_format() {
    let record = parse_one(&dlog_line("rpc", "DBUG", &rem_rpc_alloc("0xAB1234", "0x1010001")));
    let violation = Violation::error("not deregistered", Some(record));
    let rendered = violation.render();
    assert!(
        rendered.starts_with("src/cart/crt_rpc.c:244:1: ERROR: not deregistered '"),
        "{}",
        rendered
    );
    // pointers redacted, so the rendering is stable across runs
    assert!(rendered.contains("0x..."), "{}", rendered);
    assert!(!rendered.contains("0xAB1234"), "{}", rendered);
    assert!(!rendered.contains("0x1010001"), "{}", rendered);
}

#[test]
fn test_violation_render_without_record() {
    let violation = Violation::error("Opcode 0x1: Alloc'd Total = 2, Dealloc'd Total = 1", None);
    assert_eq!(
        violation.render(),
        "ERROR: Opcode 0x1: Alloc'd Total = 2, Dealloc'd Total = 1"
    );
}

#[test]
fn test_session_dedup() {
    let record = parse_one(&dlog_line("rpc", "DBUG", &rem_rpc_destroy("0xAB")));
    let violation = Violation::error("invalid rpc remove", Some(record));
    let mut session = ReportSession::new();
    assert!(session.show(&violation).is_some());
    assert!(session.show(&violation).is_none());
    // both were counted, the second was only not re-rendered
    assert_eq!(session.err_count, 2);
    assert!(session.has_errors());
}

#[test]
fn test_session_counts_warnings() {
    let mut session = ReportSession::new();
    session.show(&Violation::warning("rpc not deallocated", None));
    assert_eq!(session.warn_count, 1);
    assert!(!session.has_errors());
}

#[test]
fn test_rpc_table_layout() {
    let data = [
        dlog_line("rpc", "DBUG", &rem_rpc_alloc("0xAB", "0x1010001")),
        dlog_line("rpc", "DBUG", &rem_rpc_submit("0xAB")),
        dlog_line("hg", "DBUG", &rem_rpc_sent("0xAB")),
        dlog_line("rpc", "DBUG", &rem_rpc_complete("0xAB", 0)),
        dlog_line("rpc", "DBUG", &rem_rpc_destroy("0xAB")),
    ]
    .join("\n");
    let ntf: NTF = create_temp_file(&data);
    let mut stream = LogStream::new(&ntf_fpath(&ntf)).unwrap();
    let mut tracker = RpcLifecycleTracker::new();
    for resolved in IdentityResolver::new(&mut stream, PID_A).unwrap() {
        tracker.observe(&resolved);
    }
    tracker.finish();

    let table = render_rpc_table(&tracker);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "Opcode State Transition Tally");
    assert!(lines[1].contains("OPCODE"), "{}", lines[1]);
    assert!(lines[1].contains("DEALLOCATED"), "{}", lines[1]);
    // result columns carry the leading dash, success first
    assert!(lines[1].ends_with("-DER_SUCCESS"), "{}", lines[1]);
    assert!(lines[2].starts_with("-"), "{}", lines[2]);
    assert!(lines[3].contains("0x1010001"), "{}", lines[3]);
    // right-aligned single-digit tallies under wide headers
    assert!(lines[3].ends_with("1"), "{}", lines[3]);
}

#[test]
fn test_rpc_table_empty_without_activity() {
    let tracker = RpcLifecycleTracker::new();
    assert_eq!(render_rpc_table(&tracker), "");
}

#[test]
fn test_hierarchy_dump_marks_members() {
    let data = [
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_register("0xBB", "pool", "0xAA")),
        dlog_line("rpc", "DBUG", &rem_register("0xCC", "other", "root")),
        dlog_line("rpc", "WARN", &rem_ref("0xBB", "something went wrong")),
        String::from("libfabric:17:ofi_rxm:ep_ctrl: peer init"),
    ]
    .join("\n");
    let ntf: NTF = create_temp_file(&data);
    let mut stream = LogStream::new(&ntf_fpath(&ntf)).unwrap();
    let dump = HierarchyReporter::new().dump(&mut stream, PID_A).unwrap();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 5);
    // seed 0xBB walks up to 0xAA; 0xCC is outside the hierarchy
    assert!(lines[0].starts_with("* "), "{}", lines[0]);
    assert!(lines[1].starts_with("* "), "{}", lines[1]);
    assert!(lines[2].starts_with("  "), "{}", lines[2]);
    assert!(lines[3].starts_with("* "), "{}", lines[3]);
    // raw line included at the default dump level, unannotated
    assert!(lines[4].starts_with("  libfabric"), "{}", lines[4]);
}

#[test]
fn test_hierarchy_dump_level_bounds_output() {
    let data = [
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_register("0xCC", "other", "root")),
        dlog_line("rpc", "WARN", &rem_ref("0xAA", "something went wrong")),
    ]
    .join("\n");
    let ntf: NTF = create_temp_file(&data);
    let mut stream = LogStream::new(&ntf_fpath(&ntf)).unwrap();
    let dump = HierarchyReporter::new()
        .with_dump_level(Severity::Warn)
        .dump(&mut stream, PID_A)
        .unwrap();
    let lines: Vec<&str> = dump.lines().collect();
    // member lines always show; the unrelated DBUG registration is
    // below the WARN bound
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("* "), "{}", lines[0]);
    assert!(lines[1].starts_with("* "), "{}", lines[1]);
}

#[test]
fn test_hierarchy_dump_path_filter_fallback() {
    // no WARN-or-worse line; the seed comes from the path filter
    let data = [
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_register("0xBB", "pool", "0xAA")),
    ]
    .join("\n");
    let ntf: NTF = create_temp_file(&data);
    let mut stream = LogStream::new(&ntf_fpath(&ntf)).unwrap();
    let dump = HierarchyReporter::new()
        .with_path_filter("src/gurt/")
        .dump(&mut stream, PID_A)
        .unwrap();
    assert!(dump.lines().next().unwrap().starts_with("* "), "{}", dump);

    // no filter, no warning: nothing to report
    let dump = HierarchyReporter::new().dump(&mut stream, PID_A).unwrap();
    assert_eq!(dump, "");
}

#[test]
fn test_summary_render() {
    let mut summary = LogSummary::new();
    let record = parse_one(&dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")));
    for _ in 0..12 {
        summary.observe(&record);
    }
    assert_eq!(summary.lines(), 12);
    let rendered = summary.render();
    assert!(rendered.contains("Parsed 12 lines of logs"), "{}", rendered);
    assert!(
        rendered.contains("Logging used 12 times at src/gurt/misc.c:123 (100.0%)"),
        "{}",
        rendered
    );
    assert!(rendered.contains("rpc: 12 (100.0%)"), "{}", rendered);
    assert!(rendered.contains("DBUG: 12 (100.0%)"), "{}", rendered);
}

#[test]
fn test_summary_elides_rare_entries() {
    let mut summary = LogSummary::new();
    let common = parse_one(&dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")));
    let rare = parse_one(&dlog_line("hg", "INFO", &rem_rpc_sent("0xAB")));
    for _ in 0..15 {
        summary.observe(&common);
    }
    summary.observe(&rare);
    let rendered = summary.render();
    assert!(rendered.contains("src/gurt/misc.c:123"), "{}", rendered);
    assert!(!rendered.contains("crt_hg.c"), "{}", rendered);
    assert!(!rendered.contains("INFO"), "{}", rendered);
}

#[test]
fn test_summary_counts_all_structured_lines() {
    // plain structured messages and other pids count toward the parsed
    // total; raw foreign-library lines do not
    let data = [
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("crt", "INFO", "src/cart/crt_init.c:312 module initialized"),
        dlog_line_pid(PID_B, "rpc", "DBUG", &rem_register("0xBB", "ctx", "root")),
        String::from("libfabric:17:ofi_rxm:ep_ctrl: peer init"),
    ]
    .join("\n");
    let ntf: NTF = create_temp_file(&data);
    let mut stream = LogStream::new(&ntf_fpath(&ntf)).unwrap();
    let mut summary = LogSummary::new();
    for record in stream.iterate(IterFilter::default()).unwrap() {
        if let LogRecord::Trace(tr) = record {
            summary.observe(&tr);
        }
    }
    assert_eq!(summary.lines(), 3);
    let rendered = summary.render();
    assert!(rendered.contains("Parsed 3 lines of logs"), "{}", rendered);
}

#[test]
fn test_summary_empty() {
    assert_eq!(LogSummary::new().render(), "");
}
