//! Static security analyzer for Algorand TEAL programs.
//!
//! The pipeline lexes a TEAL source file into an instruction stream, resolves
//! labels, partitions the program into basic blocks, and executes the
//! control-flow graph symbolically against Z3. Every feasible terminating
//! path is inspected by a registry of vulnerability detectors whose findings
//! are reported as the union over all paths.
//!
//! For logic signatures the pipeline can optionally splice the approval
//! program of the validator application the signature delegates to into the
//! analyzed source, turning the cross-program check into an intra-procedural
//! one.

pub mod chain;
pub mod context;
pub mod detectors;
pub mod error;
pub mod executor;
pub mod fields;
pub mod flowgraph;
pub mod inline;
pub mod lexer;
pub mod opcodes;
pub mod solver;
pub mod sourcemap;
pub mod state;
pub mod step;

pub use chain::{AppStore, DirAppStore, GlobalState, NullAppStore, StateValue};
pub use context::{AnalysisContext, AnalysisMode, AnalysisOptions, AppCallIndex};
pub use detectors::{Finding, Vulnerability};
pub use error::{AnalysisError, Location};

use crate::flowgraph::FlowGraph;
use crate::solver::Satisfier;
use crate::state::Configuration;
use log::info;
use std::path::Path;
use std::time::Instant;

/// Analyze the program in `source_path` (or, when `options.app_id` is set,
/// the on-chain application it names) and return the detector findings.
pub fn analyze(
    z3: &z3::Context,
    source_path: &Path,
    options: &AnalysisOptions,
    store: &dyn AppStore,
) -> Result<Vec<Finding>, AnalysisError> {
    if let Some(app_id) = options.app_id {
        let (path, global_state) = store
            .read_app_info(app_id, true)
            .map_err(|err| std::io::Error::other(format!("fetching application {app_id}: {err:#}")))?;
        let path = path.ok_or_else(|| {
            std::io::Error::other(format!("application {app_id} does not exist"))
        })?;
        let source = std::fs::read_to_string(path)?;
        return run_pipeline(z3, &source, global_state, options, store);
    }
    let source = std::fs::read_to_string(source_path)?;
    run_pipeline(z3, &source, GlobalState::new(), options, store)
}

/// Analyze an in-memory source text. `options.app_id` is ignored.
pub fn analyze_source(
    z3: &z3::Context,
    source: &str,
    options: &AnalysisOptions,
    store: &dyn AppStore,
) -> Result<Vec<Finding>, AnalysisError> {
    run_pipeline(z3, source, GlobalState::new(), options, store)
}

fn run_pipeline(
    z3: &z3::Context,
    source: &str,
    mut preload: GlobalState,
    options: &AnalysisOptions,
    store: &dyn AppStore,
) -> Result<Vec<Finding>, AnalysisError> {
    let deadline = Some(Instant::now() + options.timeout);

    // The signature's address derives from the source as written, before any
    // splicing changes the text.
    let lsig_address = options
        .lsig_address
        .clone()
        .unwrap_or_else(|| context::lsig_address_for(source));

    let mut analyzed_source = source.to_string();
    let mut app_call_index = None;
    let mut inlined = None;
    if options.mode == AnalysisMode::Signature && options.include_app {
        if let Some(program) = inline::include_app(source, store)? {
            analyzed_source = std::fs::read_to_string(program.source_path())?;
            app_call_index = Some(program.group_index);
            if options.load_state {
                preload.extend(program.global_state.clone());
            }
            info!("included application {}", program.app_id);
            inlined = Some(program);
        }
    }

    let mut listing =
        lexer::parse_instructions(&analyzed_source, options.mode, inlined.is_some())?;
    let labels = sourcemap::resolve_labels(&mut listing.instructions)?;
    lexer::normalize_int_constants(&mut listing);
    let graph = FlowGraph::build(&listing.instructions)?;

    let app_boundary = if inlined.is_some() {
        labels.get("app_label").copied()
    } else {
        None
    };

    let actx = AnalysisContext {
        z3,
        mode: options.mode,
        version: listing.version,
        instructions: listing.instructions,
        labels,
        graph,
        solver: Satisfier::new(z3),
        lsig_address,
        app_call_index,
        app_boundary,
        deadline,
        block_budget: options.block_budget,
    };

    let mut initial = Configuration::new(z3);
    for (key, value) in &preload {
        match value {
            StateValue::Uint(v) => initial.preload_global_uint(key, *v),
            StateValue::Bytes(v) => initial.preload_global_bytes(key, v),
        }
    }

    executor::run(&actx, initial)
}
