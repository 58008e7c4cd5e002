// src/tests/common.rs

//! Shared test helpers: `dlog`-format line builders and temporary-file
//! fixtures.

use crate::common::{FPath, Pid};

use std::io::Write;

use ::tempfile::NamedTempFile;

/// shorthand
pub type NTF = NamedTempFile;

/// Create a temporary file with the given content.
pub fn create_temp_file(data: &str) -> NTF {
    create_temp_file_bytes(data.as_bytes())
}

/// Create a temporary file with the given bytes.
pub fn create_temp_file_bytes(data: &[u8]) -> NTF {
    let mut ntf = NamedTempFile::new().unwrap();
    ntf.write_all(data).unwrap();

    ntf
}

/// Path of a temporary file as a `FPath`.
pub fn ntf_fpath(ntf: &NTF) -> FPath {
    FPath::from(ntf.path().to_str().unwrap())
}

pub const HOSTNAME: &str = "wolf-55";
pub const PID_A: Pid = 2138824;
pub const PID_B: Pid = 2138825;

/// Build one `dlog`-format line for `PID_A`.
///
/// The facility and severity columns are `%-4s `-padded, so the
/// remainder lands exactly at the computed preamble offset.
pub fn dlog_line(fac: &str, sev: &str, remainder: &str) -> String {
    dlog_line_pid(PID_A, fac, sev, remainder)
}

/// Build one `dlog`-format line for an arbitrary pid.
pub fn dlog_line_pid(pid: Pid, fac: &str, sev: &str, remainder: &str) -> String {
    format!(
        "02/22-08:21:08.43 {} DAOS[{}/{}/0] {:<4} {:<4} {}",
        HOSTNAME, pid, pid, fac, sev, remainder,
    )
}

// ─────────────────────────────────────────────────────────────────────
// remainder fixtures (message grammars under test)

/// client-side RPC allocation remainder for `addr` and `opc`
pub fn rem_rpc_alloc(addr: &str, opc: &str) -> String {
    format!(
        "src/cart/crt_rpc.c:244 crt_rpc_priv_alloc({}) (opc: {} rpc_pub: {}) allocated.",
        addr, opc, addr,
    )
}

/// server-side RPC allocation remainder (allocated on request receipt)
pub fn rem_rpc_alloc_server(addr: &str, opc: &str) -> String {
    format!(
        "src/cart/crt_rpc.c:513 crt_rpc_handler_common({}) (opc: {} rpc_pub: {}) \
         allocated per RPC request received.",
        addr, opc, addr,
    )
}

pub fn rem_rpc_submit(addr: &str) -> String {
    format!("src/cart/crt_context.c:780 crt_req_send({}) submitted.", addr)
}

pub fn rem_rpc_sent(addr: &str) -> String {
    format!(
        "src/cart/crt_hg.c:1114 crt_hg_req_send({}) sent to rank 1 uri: ofi+tcp://10.8.1.152:31416",
        addr,
    )
}

pub fn rem_rpc_complete(addr: &str, rc: i64) -> String {
    format!(
        "src/cart/crt_context.c:330 crt_rpc_complete({}) Invoking RPC callback (rank 1 tag 0 rpc {}) rc: {}",
        addr, addr, rc,
    )
}

pub fn rem_rpc_destroy(addr: &str) -> String {
    format!("src/cart/crt_rpc.c:342 crt_hg_req_destroy({}) destroying.", addr)
}

/// descriptor registration remainder, `parent` may be `root`
pub fn rem_register(addr: &str, dtype: &str, parent: &str) -> String {
    format!(
        "src/gurt/misc.c:123 d_gurt_register({}) Registered new '{}' from {}.",
        addr, dtype, parent,
    )
}

pub fn rem_dereg(addr: &str) -> String {
    format!("src/gurt/misc.c:140 d_gurt_deregister({}) Deregistered.", addr)
}

pub fn rem_link(addr: &str, dtype: &str, target: &str) -> String {
    format!(
        "src/gurt/misc.c:150 d_gurt_link({}) Link '{}' to {}.",
        addr, dtype, target,
    )
}

pub fn rem_alloc(name: &str, size: u64, addr: &str) -> String {
    format!(
        "src/gurt/misc.c:210 d_calloc() alloc('{}') size: {} at {}.",
        name, size, addr,
    )
}

pub fn rem_alloc_array(name: &str, elem: u64, count: u64, addr: &str) -> String {
    format!(
        "src/gurt/misc.c:210 d_calloc() alloc('{}') size: {} * {} at {}.",
        name, elem, count, addr,
    )
}

pub fn rem_free(addr: &str) -> String {
    format!("src/gurt/misc.c:230 d_free() free('buf') at {}.", addr)
}

pub fn rem_realloc(new_sz: u64, old_sz: u64, old: &str, new: &str) -> String {
    format!(
        "src/gurt/misc.c:250 d_realloc() realloc('arr') size: {} (was {}) old: {} new: {}.",
        new_sz, old_sz, old, new,
    )
}

/// an arbitrary trace line referencing `addr` at the given severity
pub fn rem_ref(addr: &str, sev_note: &str) -> String {
    format!("src/cart/crt_context.c:900 crt_context_check({}) {}", addr, sev_note)
}
