//! End-to-end analyses of small TEAL programs, from source text to findings.

use std::time::Duration;
use tealscan::{
    analyze_source, AnalysisError, AnalysisMode, AnalysisOptions, DirAppStore, Finding,
    NullAppStore, Vulnerability,
};

fn run(source: &str, mode: AnalysisMode) -> Vec<Finding> {
    let z3 = z3::Context::new(&z3::Config::new());
    let options = AnalysisOptions {
        mode,
        ..AnalysisOptions::default()
    };
    analyze_source(&z3, source, &options, &NullAppStore).unwrap()
}

fn has(findings: &[Finding], kind: Vulnerability) -> bool {
    findings.iter().any(|finding| finding.kind == kind)
}

#[test]
fn arbitrary_update_on_unconstrained_on_completion() {
    let findings = run(
        "#pragma version 4\ntxn ApplicationID\nint 0\n==\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(has(&findings, Vulnerability::ArbitraryUpdate));
    assert!(has(&findings, Vulnerability::ArbitraryDelete));
}

#[test]
fn timestamp_dependency_reported() {
    let findings = run(
        "#pragma version 4\nglobal LatestTimestamp\nint 1000\n>\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(has(&findings, Vulnerability::TimestampDependency));
}

#[test]
fn unchecked_group_size_on_state_write() {
    let findings = run(
        "#pragma version 4\nbyte \"counter\"\nint 1\napp_global_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(has(&findings, Vulnerability::UncheckedGroupSize));
}

#[test]
fn group_size_check_suppresses_the_finding() {
    let findings = run(
        "#pragma version 4\nglobal GroupSize\nint 2\n==\nassert\nbyte \"counter\"\nint 1\napp_global_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(!has(&findings, Vulnerability::UncheckedGroupSize));
}

#[test]
fn unchecked_payment_receiver_reported() {
    let findings = run(
        "#pragma version 4\ngtxn 1 Amount\nint 1000\n==\nassert\nbyte \"paid\"\nint 1\napp_global_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(has(&findings, Vulnerability::UncheckedPaymentReceiver));
    let finding = findings
        .iter()
        .find(|f| f.kind == Vulnerability::UncheckedPaymentReceiver)
        .unwrap();
    assert_eq!(finding.indices, vec![tealscan::fields::TxnIndex::Literal(1)]);
}

#[test]
fn checked_payment_receiver_is_quiet() {
    let findings = run(
        "#pragma version 4\ngtxn 1 Amount\nint 1000\n==\nassert\ngtxn 1 Receiver\naddr RECEIVER\n==\nassert\nbyte \"paid\"\nint 1\napp_global_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(!has(&findings, Vulnerability::UncheckedPaymentReceiver));
}

#[test]
fn hash_gated_paths_report_nothing() {
    let findings = run(
        "#pragma version 4\ntxn Sender\nsha256\nbyte \"gate\"\n==\nassert\nbyte \"counter\"\nint 1\napp_global_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(findings.is_empty());
}

#[test]
fn lsig_fee_unchecked_with_uninspected_group() {
    let findings = run(
        "#pragma version 2\ngtxn 0 Fee\npop\nint 1\nreturn\n",
        AnalysisMode::Signature,
    );
    assert!(has(&findings, Vulnerability::UncheckedTransactionFee));
}

#[test]
fn lsig_fee_check_suppresses_the_fee_finding() {
    let findings = run(
        "#pragma version 2\ntxn Fee\nint 1000\n<=\nbnz ok\nerr\nok:\nint 1\nreturn\n",
        AnalysisMode::Signature,
    );
    assert!(!has(&findings, Vulnerability::UncheckedTransactionFee));
    // A fee-only signature still leaves its account rekeyable.
    assert!(has(&findings, Vulnerability::UncheckedRekeyTo));
}

#[test]
fn lsig_rekey_check_suppresses_the_rekey_finding() {
    let findings = run(
        "#pragma version 2\ntxn RekeyTo\nglobal ZeroAddress\n==\nassert\ntxn Fee\nint 1000\n<=\nassert\nint 1\nreturn\n",
        AnalysisMode::Signature,
    );
    assert!(!has(&findings, Vulnerability::UncheckedRekeyTo));
    assert!(!has(&findings, Vulnerability::UncheckedTransactionFee));
    assert!(has(&findings, Vulnerability::UncheckedCloseRemainderTo));
}

#[test]
fn rekey_is_not_reported_before_teal_v2() {
    let findings = run(
        "#pragma version 1\ntxn Fee\nint 1000\n<=\nassert\nint 1\nreturn\n",
        AnalysisMode::Signature,
    );
    assert!(!has(&findings, Vulnerability::UncheckedRekeyTo));
}

#[test]
fn unsatisfiable_branches_are_pruned() {
    // The branch to the timestamp read can never be taken.
    let findings = run(
        "#pragma version 4\nint 0\nbnz dead\nint 1\nreturn\ndead:\nglobal LatestTimestamp\npop\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(!has(&findings, Vulnerability::TimestampDependency));
}

#[test]
fn both_branch_sides_are_explored() {
    // The timestamp read sits on a feasible branch; the other side writes
    // state. Findings are the union over both paths.
    let findings = run(
        "#pragma version 4\ntxn NumAppArgs\nint 0\n==\nbnz stamped\nbyte \"k\"\nint 1\napp_global_put\nint 1\nreturn\nstamped:\nglobal LatestTimestamp\npop\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(has(&findings, Vulnerability::TimestampDependency));
    assert!(has(&findings, Vulnerability::UncheckedGroupSize));
}

#[test]
fn switch_takes_only_feasible_targets() {
    let findings = run(
        "#pragma version 8\nint 1\nswitch a b\nglobal LatestTimestamp\npop\nint 1\nreturn\na:\nint 1\nreturn\nb:\nbyte \"k\"\nint 1\napp_global_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    // A literal selector of 1 reaches only the second target; neither the
    // fall-through (with its timestamp read) nor the first target runs.
    assert!(has(&findings, Vulnerability::UncheckedGroupSize));
    assert!(!has(&findings, Vulnerability::TimestampDependency));
}

#[test]
fn subroutines_return_to_their_call_site() {
    let findings = run(
        "#pragma version 4\ncallsub stamp\nint 1\nreturn\nstamp:\nglobal LatestTimestamp\npop\nretsub\n",
        AnalysisMode::Application,
    );
    assert!(has(&findings, Vulnerability::TimestampDependency));
}

#[test]
fn symbolic_inner_fee_reported() {
    let findings = run(
        "#pragma version 6\nitxn_begin\ntxn NumAppArgs\nitxn_field Fee\nitxn_submit\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(has(&findings, Vulnerability::SymbolicInnerTxnFee));
}

#[test]
fn literal_inner_fee_is_quiet() {
    let findings = run(
        "#pragma version 6\nitxn_begin\nint 0\nitxn_field Fee\nitxn_submit\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(!has(&findings, Vulnerability::SymbolicInnerTxnFee));
}

#[test]
fn inlined_validator_is_analyzed_with_the_signature() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("42.teal"),
        "#pragma version 6\nglobal LatestTimestamp\npop\nint 1\nreturn\n",
    )
    .unwrap();
    let store = DirAppStore::new(dir.path());

    let z3 = z3::Context::new(&z3::Config::new());
    let options = AnalysisOptions {
        mode: AnalysisMode::Signature,
        include_app: true,
        ..AnalysisOptions::default()
    };
    let findings = analyze_source(
        &z3,
        "#pragma version 4\ntxn ApplicationID\npushint 42\n==\nreturn\n",
        &options,
        &store,
    )
    .unwrap();
    // The signature alone references nothing; the combined program still
    // terminates through the application body and reports on it.
    assert!(has(&findings, Vulnerability::UncheckedTransactionFee));
}

#[test]
fn force_clear_state_on_foreign_account() {
    let findings = run(
        "#pragma version 4\ntxn Receiver\nbyte \"score\"\nint 1\napp_local_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    let finding = findings
        .iter()
        .find(|f| f.kind == Vulnerability::ForceClearState)
        .expect("foreign-account local write should report");
    assert!(finding.address.is_some());
}

#[test]
fn local_write_for_the_sender_is_quiet() {
    let findings = run(
        "#pragma version 4\ntxn Sender\nbyte \"score\"\nint 1\napp_local_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(!has(&findings, Vulnerability::ForceClearState));
}

#[test]
fn unchecked_asset_receiver_reported() {
    let findings = run(
        "#pragma version 4\ngtxn 1 AssetAmount\nint 5\n==\nassert\nbyte \"k\"\nint 1\napp_global_put\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(has(&findings, Vulnerability::UncheckedAssetReceiver));
}

#[test]
fn sender_check_suppresses_update_delete_and_optin() {
    let findings = run(
        "#pragma version 4\ntxn Sender\naddr OWNER\n==\nassert\nint 1\nreturn\n",
        AnalysisMode::Application,
    );
    assert!(!has(&findings, Vulnerability::ArbitraryUpdate));
    assert!(!has(&findings, Vulnerability::ArbitraryDelete));
    assert!(!has(&findings, Vulnerability::UncheckedOptIn));
}

#[test]
fn lsig_with_no_group_references_is_arbitrarily_spendable() {
    let findings = run(
        "#pragma version 2\nint 1\nreturn\n",
        AnalysisMode::Signature,
    );
    let finding = findings
        .iter()
        .find(|f| f.kind == Vulnerability::ArbitrarySpend)
        .expect("an unconstrained signature should be spendable");
    assert_eq!(finding.indices, vec![tealscan::fields::TxnIndex::Group]);
}

#[test]
fn zero_timeout_aborts_with_the_timeout_error() {
    let z3 = z3::Context::new(&z3::Config::new());
    let options = AnalysisOptions {
        timeout: Duration::from_secs(0),
        ..AnalysisOptions::default()
    };
    let err = analyze_source(
        &z3,
        "#pragma version 4\nint 1\nreturn\n",
        &options,
        &NullAppStore,
    )
    .unwrap_err();
    assert!(matches!(err, AnalysisError::Timeout));
}
