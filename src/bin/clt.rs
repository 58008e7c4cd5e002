// src/bin/clt.rs

//! Binary `clt`, the CaRT log triage tool.
//!
//! Thin harness over _cltlib_: runs the lifecycle trackers over every
//! pid of one log file (or a single pid), prints violations and
//! aggregate tables, and exits nonzero when any ERROR-severity
//! violation was found or the file needed a decode fallback.

use ::anyhow::Context;
use ::clap::Parser;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

use ::cltlib::common::{FPath, Pid, TriageResult};
use ::cltlib::data::record::LogRecord;
use ::cltlib::printer::report::{render_rpc_table, HierarchyReporter, ReportSession};
use ::cltlib::printer::summary::LogSummary;
use ::cltlib::readers::logstream::{IterFilter, LogStream};
use ::cltlib::readers::resolver::IdentityResolver;
use ::cltlib::trackers::descriptor::DescriptorLifecycleTracker;
use ::cltlib::trackers::memory::MemoryTracker;
use ::cltlib::trackers::rpc::RpcLifecycleTracker;

#[derive(Parser, Debug)]
#[command(
    name = "clt",
    author,
    version,
    about = "Triage a CaRT log file: verify RPC and descriptor lifecycles, report violations"
)]
struct CliArgs {
    /// Path of the log file to triage.
    file: FPath,

    /// Check only this pid (default: every pid in the file).
    #[arg(long)]
    pid: Option<Pid>,

    /// Report still-allocated memory at end of pass.
    #[arg(long)]
    memleaks: bool,

    /// Print the logging-frequency summary.
    #[arg(long)]
    summary: bool,

    /// Print the hierarchy dump for each checked pid.
    #[arg(long)]
    dump: bool,

    /// Source-path prefix for the dump's fallback seed selection.
    #[arg(long)]
    path_filter: Option<String>,
}

/// One tracker pass over one pid. Prints violations and tables as it
/// goes; the session accumulates dedup state and error counts across
/// pids.
fn check_pid(
    stream: &mut LogStream,
    pid: Pid,
    args: &CliArgs,
    session: &mut ReportSession,
) -> TriageResult<()> {
    defn!("(pid {})", pid);
    let mut rpc_tracker = RpcLifecycleTracker::new();
    let mut desc_tracker = DescriptorLifecycleTracker::new();
    let mut mem_tracker = MemoryTracker::new();

    let resolver = IdentityResolver::new(stream, pid)?;
    for resolved in resolver {
        rpc_tracker.observe(&resolved);
        desc_tracker.observe(&resolved, &mem_tracker);
        mem_tracker.observe(&resolved);
    }
    rpc_tracker.finish();
    // memory first: leaked regions backing a live descriptor report as
    // "descriptor not freed" and are released before the leak report
    if args.memleaks {
        mem_tracker.finish(&mut desc_tracker);
    }
    desc_tracker.finish();

    println!("Pid {}", pid);
    for line in session.show_all(rpc_tracker.violations()) {
        println!("{}", line);
    }
    for line in session.show_all(desc_tracker.violations()) {
        println!("{}", line);
    }
    for line in session.show_all(mem_tracker.violations()) {
        println!("{}", line);
    }
    let table = render_rpc_table(&rpc_tracker);
    if !table.is_empty() {
        print!("{}", table);
    }
    if mem_tracker.memsize.has_data() {
        println!("Memsize: {}", mem_tracker.memsize);
    }

    if args.dump {
        let mut reporter = HierarchyReporter::new();
        if let Some(filter) = &args.path_filter {
            reporter = reporter.with_path_filter(filter.clone());
        }
        let dump = reporter.dump(stream, pid)?;
        if !dump.is_empty() {
            print!("{}", dump);
        }
    }
    defx!();

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    defo!("{:?}", args);

    let mut stream = LogStream::new(&args.file)
        .with_context(|| format!("failed to open log file {:?}", args.file))?;

    let pids: Vec<Pid> = match args.pid {
        Some(pid) => vec![pid],
        None => stream.pids().iter().copied().collect(),
    };

    let mut session = ReportSession::new();
    for pid in &pids {
        check_pid(&mut stream, *pid, &args, &mut session)
            .with_context(|| format!("pass failed for pid {}", pid))?;
    }

    if args.summary {
        // the summary counts every structured line of the file, not
        // just the per-pid trace records the trackers consume
        let mut summary = LogSummary::new();
        for record in stream.iterate(IterFilter::default())? {
            if let LogRecord::Trace(tr) = record {
                summary.observe(&tr);
            }
        }
        print!("{}", summary.render());
    }

    if session.has_errors() || stream.file_corrupt {
        std::process::exit(1);
    }

    Ok(())
}
