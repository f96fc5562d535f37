//! Splicing a called application's approval program into a logic signature.
//!
//! Many logic signatures delegate their real authorization logic to an
//! application and only check `txn ApplicationID == K`. To reason about the
//! combined behavior intra-procedurally, the inliner locates that comparison
//! with a small set of source patterns, fetches the application's approval
//! program, and rewrites the signature so that acceptance falls through into
//! the application body:
//!
//! 1. append a `return` to the signature if it lacks one;
//! 2. rename `label` tokens to `sig_label` to avoid collisions;
//! 3. replace each `return` with `bnz app_label` / `err`;
//! 4. append the approval program under `app_label:`, pragma stripped.
//!
//! The rewrite is textual; it runs before re-parsing, so a malformed splice
//! is caught by the normal lexer. Fetch and parse failures degrade to
//! analyzing the original signature alone.

use crate::chain::{AppStore, GlobalState};
use crate::context::AppCallIndex;
use crate::error::AnalysisError;
use log::{debug, info};
use regex::Regex;
use std::io::Write;
use tempfile::NamedTempFile;

/// The result of a successful splice. Dropping it removes the temporary file
/// holding the combined source.
#[derive(Debug)]
pub struct InlinedProgram {
    pub app_id: u64,
    pub group_index: AppCallIndex,
    pub global_state: GlobalState,
    temp: tempfile::TempPath,
}

impl InlinedProgram {
    pub fn source_path(&self) -> &std::path::Path {
        &self.temp
    }
}

/// How the validator comparison was phrased.
struct ValidatorRef {
    group_index: AppCallIndex,
    /// Literal application ID (`pushint`), or an index into `intcblock`.
    id: IdRef,
}

enum IdRef {
    Direct(u64),
    IntcIndex(usize),
}

/// Locate a `... ApplicationID == K` comparison in `source`.
///
/// Patterns are tried in a fixed order and the last match wins, covering the
/// three field accessors (`txn`, `gtxns`, `gtxn N`) crossed with the three
/// constant forms (`intc_i`, `intc i`, `pushint K`).
fn find_validator(source: &str) -> Option<ValidatorRef> {
    let patterns: [(&str, AppCallIndex); 9] = [
        ("txn ApplicationID\nintc_([0-9]).*\n==", AppCallIndex::Own),
        ("txn ApplicationID\nintc ([0-9]+).*\n==", AppCallIndex::Own),
        ("txn ApplicationID\npushint ([0-9]+).*\n==", AppCallIndex::Own),
        ("gtxns ApplicationID\nintc_([0-9]).*\n==", AppCallIndex::Stack),
        ("gtxns ApplicationID\nintc ([0-9]+).*\n==", AppCallIndex::Stack),
        (
            "gtxns ApplicationID\npushint ([0-9]+).*\n==",
            AppCallIndex::Stack,
        ),
        ("gtxn ([0-9]+) ApplicationID\nintc_([0-9]).*\n==", AppCallIndex::Own),
        ("gtxn ([0-9]+) ApplicationID\nintc ([0-9]+).*\n==", AppCallIndex::Own),
        (
            "gtxn ([0-9]+) ApplicationID\npushint ([0-9]+).*\n==",
            AppCallIndex::Own,
        ),
    ];

    let mut found = None;
    for (i, (pattern, index_kind)) in patterns.iter().enumerate() {
        let re = Regex::new(pattern).expect("static regex");
        if let Some(captures) = re.captures(source) {
            let literal_indexed = i >= 6;
            let group_index = if literal_indexed {
                AppCallIndex::Literal(captures[1].parse().ok()?)
            } else {
                *index_kind
            };
            let constant = captures[if literal_indexed { 2 } else { 1 }].parse().ok()?;
            let direct = i % 3 == 2;
            let id = if direct {
                IdRef::Direct(constant)
            } else {
                IdRef::IntcIndex(constant as usize)
            };
            found = Some(ValidatorRef { group_index, id });
        }
    }
    found
}

/// Resolve an `intcblock` index to its literal value.
fn resolve_intcblock(source: &str, index: usize) -> Option<u64> {
    let re = Regex::new("intcblock(.*)\n").expect("static regex");
    let captures = re.captures(source)?;
    let constants: Vec<&str> = captures[1].split_whitespace().collect();
    constants.get(index)?.parse().ok()
}

/// Attempt to inline the validator application called by `source`.
///
/// `Ok(None)` means inlining was skipped (no validator, or a recoverable
/// fetch/parse failure); analysis proceeds on the original source. The one
/// fatal case is a source that mentions `ApplicationID` in a shape none of
/// the patterns recognize.
pub fn include_app(
    source: &str,
    store: &dyn AppStore,
) -> Result<Option<InlinedProgram>, AnalysisError> {
    let validator = match find_validator(source) {
        Some(validator) => validator,
        None => {
            if source.contains("ApplicationID") {
                return Err(AnalysisError::IncludeValidator(
                    "validator exists but could not be matched".to_string(),
                ));
            }
            info!("validator does not exist");
            return Ok(None);
        }
    };

    let app_id = match validator.id {
        IdRef::Direct(id) => id,
        IdRef::IntcIndex(index) => match resolve_intcblock(source, index) {
            Some(id) => id,
            None => {
                info!("failed to parse intcblock");
                return Ok(None);
            }
        },
    };

    let (approval_path, global_state) = match store.read_app_info(app_id, false) {
        Ok((Some(path), state)) => (path, state),
        Ok((None, _)) => {
            info!("application {app_id} does not exist, trying the historical version");
            match store.get_app(app_id) {
                Ok(path) => (path, GlobalState::new()),
                Err(err) => {
                    info!("failed to include the validator: {err:#}");
                    return Ok(None);
                }
            }
        }
        Err(err) => {
            info!("failed to include the validator: {err:#}");
            return Ok(None);
        }
    };

    let approval = match std::fs::read_to_string(&approval_path) {
        Ok(content) => content,
        Err(err) => {
            info!("failed to read the validator program: {err}");
            return Ok(None);
        }
    };

    let combined = splice(source, &approval);
    let mut temp = NamedTempFile::new()?;
    temp.write_all(combined.as_bytes())?;
    let temp = temp.into_temp_path();
    info!("included application {app_id}, combined source at {}", temp.display());
    debug!("validator call group index: {:?}", validator.group_index);

    Ok(Some(InlinedProgram {
        app_id,
        group_index: validator.group_index,
        global_state,
        temp,
    }))
}

/// Build the combined source text.
fn splice(signature: &str, approval: &str) -> String {
    let mut combined = signature.to_string();
    if !combined.trim_end().ends_with("return") {
        combined.push_str("\nreturn");
    }
    let combined = combined.replace("label", "sig_label");
    let mut combined = combined.replace("return", "bnz app_label\nerr");
    combined.push_str("\napp_label:\n");

    // The approval program's own pragma line goes away; the combined file
    // keeps the signature's directive.
    let body = approval.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    combined.push_str(body);
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{DirAppStore, NullAppStore, StateValue};

    const SIG: &str = "#pragma version 4\ntxn ApplicationID\npushint 42\n==\nreturn\n";
    const APPROVAL: &str = "#pragma version 6\nint 1\nreturn\n";

    fn store_with_app(id: u64) -> (tempfile::TempDir, DirAppStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("{id}.teal")), APPROVAL).unwrap();
        std::fs::write(
            dir.path().join(format!("{id}.json")),
            r#"{"total": {"type": "uint", "value": 5}}"#,
        )
        .unwrap();
        let store = DirAppStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn pushint_validator_is_spliced() {
        let (_dir, store) = store_with_app(42);
        let inlined = include_app(SIG, &store).unwrap().unwrap();
        assert_eq!(inlined.app_id, 42);
        assert_eq!(inlined.group_index, AppCallIndex::Own);
        assert_eq!(inlined.global_state["total"], StateValue::Uint(5));

        let combined = std::fs::read_to_string(inlined.source_path()).unwrap();
        assert!(combined.contains("bnz app_label\nerr"));
        assert!(combined.contains("\napp_label:\n"));
        // The approval body must appear without its own pragma.
        assert_eq!(combined.matches("#pragma").count(), 1);
    }

    #[test]
    fn intcblock_indirection_resolves() {
        let sig = "#pragma version 4\nintcblock 7 42 9\ntxn ApplicationID\nintc 1\n==\nreturn\n";
        let (_dir, store) = store_with_app(42);
        let inlined = include_app(sig, &store).unwrap().unwrap();
        assert_eq!(inlined.app_id, 42);
    }

    #[test]
    fn gtxn_literal_index_is_recorded() {
        let sig = "#pragma version 4\ngtxn 2 ApplicationID\npushint 42\n==\nreturn\n";
        let (_dir, store) = store_with_app(42);
        let inlined = include_app(sig, &store).unwrap().unwrap();
        assert_eq!(inlined.group_index, AppCallIndex::Literal(2));
    }

    #[test]
    fn signature_labels_are_renamed() {
        let sig = "#pragma version 4\nb my_label\nmy_label:\ntxn ApplicationID\npushint 42\n==\nreturn\n";
        let (_dir, store) = store_with_app(42);
        let inlined = include_app(sig, &store).unwrap().unwrap();
        let combined = std::fs::read_to_string(inlined.source_path()).unwrap();
        assert!(combined.contains("my_sig_label:"));
        assert!(!combined.contains("my_label:"));
    }

    #[test]
    fn fetch_failure_degrades() {
        assert!(include_app(SIG, &NullAppStore).unwrap().is_none());
    }

    #[test]
    fn no_validator_is_not_an_error() {
        let sig = "#pragma version 4\nint 1\nreturn\n";
        assert!(include_app(sig, &NullAppStore).unwrap().is_none());
    }

    #[test]
    fn unmatched_validator_is_fatal() {
        let sig = "#pragma version 4\ntxn ApplicationID\nint 42\n==\nreturn\n";
        let err = include_app(sig, &NullAppStore).unwrap_err();
        assert!(matches!(err, AnalysisError::IncludeValidator(_)));
    }

    #[test]
    fn bad_intcblock_degrades() {
        let sig = "#pragma version 4\nintcblock 7\ntxn ApplicationID\nintc 5\n==\nreturn\n";
        let (_dir, store) = store_with_app(42);
        assert!(include_app(sig, &store).unwrap().is_none());
    }
}
