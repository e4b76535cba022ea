//! Audit hashing for query reports
//!
//! The final report carries a hash of everything that grounded it, so a
//! reviewer can tell whether two runs saw the same inputs.

use crate::state::QueryState;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::io::Write;

/// Compute a SHA-256 hash over the query, extracted symbols, and the full
/// tool-call log. Uses zero-copy streaming serialization into the hasher.
pub fn compute_context_hash(state: &QueryState) -> String {
    let context = json!({
        "query": state.query,
        "symbols": state.symbols,
        "tool_calls": state.tool_calls,
    });

    let mut hasher = Sha256::new();
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &context).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
