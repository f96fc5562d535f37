//! Command-line entry point for the analyzer.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tealscan::{
    AnalysisError, AnalysisMode, AnalysisOptions, AppStore, DirAppStore, Finding, NullAppStore,
};

#[derive(Parser)]
#[command(
    name = "tealscan",
    version,
    about = "Static security analyzer for Algorand TEAL programs"
)]
struct Args {
    /// TEAL source file to analyze.
    #[arg(required_unless_present = "app_id")]
    source: Option<PathBuf>,

    /// Analyze the program as a logic signature instead of an application.
    #[arg(long)]
    signature: bool,

    /// Splice the validator application called by the signature into the
    /// analyzed source.
    #[arg(long, requires = "signature")]
    include_app: bool,

    /// Preload fetched on-chain global state into the initial state.
    #[arg(long)]
    load_state: bool,

    /// Analyze the on-chain application with this ID instead of a local file.
    #[arg(long, conflicts_with = "source")]
    app_id: Option<u64>,

    /// Wall-clock timeout for the whole analysis, in seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Directory of pre-disassembled programs (`<id>.teal`, `<id>.json`).
    #[arg(long, value_name = "DIR")]
    app_store: Option<PathBuf>,

    /// Override the logic signature's address.
    #[arg(long)]
    lsig_address: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(findings) => report(&findings),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}

fn run(args: &Args) -> Result<Vec<Finding>, AnalysisError> {
    let options = AnalysisOptions {
        mode: if args.signature {
            AnalysisMode::Signature
        } else {
            AnalysisMode::Application
        },
        include_app: args.include_app,
        load_state: args.load_state,
        app_id: args.app_id,
        timeout: Duration::from_secs(args.timeout),
        lsig_address: args.lsig_address.clone(),
        ..AnalysisOptions::default()
    };

    let store: Box<dyn AppStore> = match &args.app_store {
        Some(dir) => Box::new(DirAppStore::new(dir)),
        None => Box::new(NullAppStore),
    };

    let source = args.source.clone().unwrap_or_default();
    let z3 = z3::Context::new(&z3::Config::new());
    tealscan::analyze(&z3, &source, &options, store.as_ref())
}

fn report(findings: &[Finding]) {
    if findings.is_empty() {
        println!("no findings");
        return;
    }
    for finding in findings {
        println!("{finding}");
    }
}
