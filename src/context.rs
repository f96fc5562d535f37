//! The analysis context: everything the executor and the detectors share
//! read-only for the duration of one analysis.

use crate::fields::TxnIndex;
use crate::flowgraph::FlowGraph;
use crate::lexer::Instruction;
use crate::solver::Satisfier;
use sha2::{Digest, Sha512_256};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use z3::Context;

/// Whether the analyzed program is a smart contract or a logic signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Application,
    Signature,
}

/// The group position a logic signature calls its validator application at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCallIndex {
    /// The signature's own transaction is the application call (`txn`).
    Own,
    /// The call index came off the stack (`gtxns`).
    Stack,
    /// A literal group index (`gtxn N`).
    Literal(u64),
}

/// Caller-tunable knobs for one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub mode: AnalysisMode,
    /// Splice the called application's approval program into a logic
    /// signature before analysis.
    pub include_app: bool,
    /// Preload fetched on-chain global state into the initial configuration.
    pub load_state: bool,
    /// Analyze the on-chain application with this ID instead of a local file.
    pub app_id: Option<u64>,
    /// Wall-clock budget for the whole analysis.
    pub timeout: Duration,
    /// Override for the logic signature's address.
    pub lsig_address: Option<String>,
    /// Per-path executed-block budget, bounding loop exploration.
    pub block_budget: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Application,
            include_app: false,
            load_state: false,
            app_id: None,
            timeout: Duration::from_secs(300),
            lsig_address: None,
            block_budget: 512,
        }
    }
}

/// Immutable per-analysis state threaded through the pipeline. The solver is
/// the one interior-mutable member; it serializes its own queries.
pub struct AnalysisContext<'ctx> {
    pub z3: &'ctx Context,
    pub mode: AnalysisMode,
    pub version: u8,
    pub instructions: Vec<Instruction>,
    pub labels: BTreeMap<String, usize>,
    pub graph: FlowGraph,
    pub solver: Satisfier<'ctx>,
    /// The logic signature's address; detectors compare transaction senders
    /// against it. Meaningful in signature mode only.
    pub lsig_address: String,
    /// Set when an application body was inlined into the signature.
    pub app_call_index: Option<AppCallIndex>,
    /// First address of the inlined application body, when one exists.
    pub app_boundary: Option<usize>,
    pub deadline: Option<Instant>,
    pub block_budget: u32,
}

impl<'ctx> AnalysisContext<'ctx> {
    /// The group position the inlined application body executes at, for
    /// constraint-index lookups.
    pub fn app_txn_index(&self) -> TxnIndex {
        match self.app_call_index {
            Some(AppCallIndex::Literal(n)) => TxnIndex::Literal(n),
            _ => TxnIndex::Group,
        }
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// Derive a stable address for a logic signature from its source text.
///
/// The production address of a logic signature is the hash of its compiled
/// program; compilation is out of scope here, so the digest of the source
/// stands in. Detectors only need a distinguished constant to compare
/// transaction senders against.
pub fn lsig_address_for(source: &str) -> String {
    let digest = Sha512_256::digest(source.as_bytes());
    let mut out = String::with_capacity(digest.as_slice().len() * 2);
    for byte in digest.as_slice() {
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsig_address_is_stable_and_distinct() {
        let a = lsig_address_for("#pragma version 2\nint 1\nreturn\n");
        let b = lsig_address_for("#pragma version 2\nint 1\nreturn\n");
        let c = lsig_address_for("#pragma version 2\nint 0\nreturn\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
