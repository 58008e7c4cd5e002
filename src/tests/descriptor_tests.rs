// src/tests/descriptor_tests.rs

//! Tests of descriptor register/link/deregister verification and
//! cascading cleanup.

use crate::readers::logstream::LogStream;
use crate::readers::resolver::IdentityResolver;
use crate::trackers::descriptor::DescriptorLifecycleTracker;
use crate::trackers::memory::MemoryTracker;
use crate::tests::common::{
    create_temp_file,
    dlog_line,
    ntf_fpath,
    rem_alloc,
    rem_dereg,
    rem_free,
    rem_link,
    rem_ref,
    rem_register,
    NTF,
    PID_A,
};

/// One pass feeding the descriptor and memory trackers, no `finish`.
fn track_both(lines: &[String]) -> (DescriptorLifecycleTracker, MemoryTracker) {
    let data = lines.join("\n");
    let ntf: NTF = create_temp_file(&data);
    let mut stream = LogStream::new(&ntf_fpath(&ntf)).unwrap();
    let mut tracker = DescriptorLifecycleTracker::new();
    let mut memory = MemoryTracker::new();
    for resolved in IdentityResolver::new(&mut stream, PID_A).unwrap() {
        tracker.observe(&resolved, &memory);
        memory.observe(&resolved);
    }

    (tracker, memory)
}

/// Run one tracker pass over the given lines, `finish` included.
fn track(lines: &[String]) -> DescriptorLifecycleTracker {
    let (mut tracker, _memory) = track_both(lines);
    tracker.finish();

    tracker
}

#[test]
fn test_clean_lifecycle() {
    let tracker = track(&[
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_register("0xBB", "pool", "0xAA")),
        dlog_line("rpc", "DBUG", &rem_dereg("0xBB")),
        dlog_line("rpc", "DBUG", &rem_dereg("0xAA")),
    ]);
    assert!(tracker.violations().is_empty(), "{:?}", tracker.violations());
    assert_eq!(tracker.active_count(), 0);
}

#[test]
fn test_leak_reported_exactly_once() {
    let tracker = track(&[dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root"))]);
    let leaks: Vec<_> = tracker
        .violations()
        .iter()
        .filter(|violation| violation.message.contains("desc not deregistered"))
        .collect();
    assert_eq!(leaks.len(), 1);
    assert!(leaks[0].message.contains("Registered"), "{}", leaks[0].message);
}

#[test]
fn test_invalid_remove() {
    let tracker = track(&[dlog_line("rpc", "DBUG", &rem_dereg("0xAA"))]);
    assert_eq!(tracker.violations().len(), 1);
    assert!(tracker.violations()[0].message.contains("invalid desc remove"));
}

#[test]
fn test_double_register() {
    let tracker = track(&[
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_dereg("0xAA")),
    ]);
    // the resolver gives the second registration a fresh identity, so
    // the register/register clash never fires; the first generation is
    // the one left leaking
    let messages: Vec<&str> = tracker
        .violations()
        .iter()
        .map(|violation| violation.message.as_str())
        .collect();
    assert!(
        messages.iter().any(|msg| msg.contains("desc not deregistered")),
        "{:?}",
        messages
    );
}

#[test]
fn test_register_with_bad_parent() {
    let tracker = track(&[dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "0xFF"))]);
    assert!(
        tracker
            .violations()
            .iter()
            .any(|violation| violation.message.contains("add with bad parent")),
        "{:?}",
        tracker.violations()
    );
}

#[test]
fn test_cascade_removal() {
    // deregistering the parent sweeps the linked child with it
    let tracker = track(&[
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_link("0xBB", "pool", "0xAA")),
        dlog_line("rpc", "DBUG", &rem_dereg("0xAA")),
    ]);
    assert!(tracker.violations().is_empty(), "{:?}", tracker.violations());
    assert_eq!(tracker.active_count(), 0);
}

#[test]
fn test_deregister_of_linked_descriptor() {
    let tracker = track(&[
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_link("0xBB", "pool", "0xAA")),
        dlog_line("rpc", "DBUG", &rem_dereg("0xBB")),
        dlog_line("rpc", "DBUG", &rem_dereg("0xAA")),
    ]);
    assert!(
        tracker
            .violations()
            .iter()
            .any(|violation| violation.message.contains("deregister of Linked")),
        "{:?}",
        tracker.violations()
    );
}

#[test]
fn test_link_with_bad_parent() {
    let tracker = track(&[dlog_line("rpc", "DBUG", &rem_link("0xBB", "pool", "0xFF"))]);
    assert!(
        tracker
            .violations()
            .iter()
            .any(|violation| violation.message.contains("link with bad parent")),
        "{:?}",
        tracker.violations()
    );
}

#[test]
fn test_reference_to_untracked_address() {
    // a trace line naming an address in neither lifecycle table
    let tracker = track(&[dlog_line("rpc", "DBUG", &rem_ref("0xDEAD", "progressing"))]);
    assert_eq!(tracker.violations().len(), 1);
    assert!(tracker.violations()[0].is_error());
    assert!(tracker.violations()[0].message.contains("inactive desc"));
}

#[test]
fn test_reference_check_needs_debug_logging() {
    // without debug-level logging, creation events are routinely
    // missing; the check stays off
    let tracker = track(&[dlog_line("rpc", "WARN", &rem_ref("0xDEAD", "progressing"))]);
    assert!(tracker.violations().is_empty(), "{:?}", tracker.violations());
}

#[test]
fn test_reference_to_tracked_address_is_clean() {
    let tracker = track(&[
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("rpc", "DBUG", &rem_ref("0xAA", "progressing")),
        dlog_line("rpc", "DBUG", &rem_dereg("0xAA")),
    ]);
    assert!(tracker.violations().is_empty(), "{:?}", tracker.violations());
}

#[test]
fn test_reference_to_allocated_memory() {
    // the unregistered address is a live allocation; its allocation
    // site is reported alongside
    let tracker = track(&[
        dlog_line("mem", "DBUG", &rem_alloc("buf", 24, "0xDEAD")),
        dlog_line("rpc", "DBUG", &rem_ref("0xDEAD", "progressing")),
    ]);
    let messages: Vec<&str> = tracker
        .violations()
        .iter()
        .map(|violation| violation.message.as_str())
        .collect();
    assert_eq!(
        messages,
        vec!["inactive desc", "Used as descriptor without registering"]
    );
    // the companion points at the allocation line, not the reference
    let site = tracker.violations()[1].record.as_ref().unwrap();
    assert_eq!(site.location(), "src/gurt/misc.c:210");
}

#[test]
fn test_register_parent_is_allocated_memory() {
    let tracker = track(&[
        dlog_line("mem", "DBUG", &rem_alloc("buf", 24, "0xFEED")),
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "0xFEED")),
    ]);
    let messages: Vec<&str> = tracker
        .violations()
        .iter()
        .map(|violation| violation.message.as_str())
        .collect();
    assert!(
        messages.contains(&"add with bad parent"),
        "{:?}",
        messages
    );
    assert!(
        messages.contains(&"used as parent without registering"),
        "{:?}",
        messages
    );
}

#[test]
fn test_free_releases_descriptor() {
    // freeing the backing memory tears the descriptor down; no leak
    // and no double report
    let tracker = track(&[
        dlog_line("rpc", "DBUG", &rem_register("0xAA", "ctx", "root")),
        dlog_line("mem", "DBUG", &rem_alloc("ctx", 64, "0xAA")),
        dlog_line("mem", "DBUG", &rem_free("0xAA")),
    ]);
    assert!(tracker.violations().is_empty(), "{:?}", tracker.violations());
    assert_eq!(tracker.active_count(), 0);
}
