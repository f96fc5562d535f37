//! Label resolution.
//!
//! Maps label names to instruction addresses and rewrites the label-valued
//! parameters of branch instructions in place, so the block builder and the
//! executor only ever see numeric targets.

use crate::error::AnalysisError;
use crate::lexer::Instruction;
use crate::opcodes;
use log::debug;
use std::collections::BTreeMap;

/// Resolve all labels in `instructions` and rewrite branch parameters to
/// instruction addresses. Returns the label table.
///
/// Resolution is idempotent: a branch parameter that already is a numeric
/// address is left untouched, so running this pass twice is a no-op.
pub fn resolve_labels(
    instructions: &mut [Instruction],
) -> Result<BTreeMap<String, usize>, AnalysisError> {
    let mut labels = BTreeMap::new();
    for inst in instructions.iter() {
        if let Some(label) = &inst.label {
            if let Some(previous) = labels.insert(label.clone(), inst.address) {
                debug!("label {label} redefined (was address {previous})");
            }
        }
    }

    for inst in instructions.iter_mut() {
        if opcodes::is_branch(&inst.opcode) {
            let param = inst.params.first().cloned().ok_or_else(|| {
                AnalysisError::parse_labels(inst.line_number, "branch without a target")
            })?;
            if let Some((name, address)) = resolve_one(&labels, &param, inst.line_number)? {
                inst.dest_label = Some(name);
                inst.params[0] = address.to_string();
            }
        } else if inst.opcode == "switch" || inst.opcode == "match" {
            for param in inst.params.iter_mut() {
                if let Some((_, address)) = resolve_one(&labels, param, inst.line_number)? {
                    *param = address.to_string();
                }
            }
        }
    }
    Ok(labels)
}

/// Resolve a single label parameter. `Ok(None)` means the parameter was
/// already numeric.
fn resolve_one(
    labels: &BTreeMap<String, usize>,
    param: &str,
    line_number: usize,
) -> Result<Option<(String, usize)>, AnalysisError> {
    if param.parse::<usize>().is_ok() {
        return Ok(None);
    }
    match labels.get(param) {
        Some(&address) => Ok(Some((param.to_string(), address))),
        None => Err(AnalysisError::parse_labels(
            line_number,
            format!("invalid label ({param})"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AnalysisMode;
    use crate::lexer::parse_instructions;

    fn lex(source: &str) -> Vec<Instruction> {
        parse_instructions(source, AnalysisMode::Application, false)
            .unwrap()
            .instructions
    }

    #[test]
    fn branch_targets_are_rewritten() {
        let mut instructions = lex("#pragma version 4\nbnz done\nint 0\ndone:\nint 1\nreturn\n");
        let labels = resolve_labels(&mut instructions).unwrap();
        assert_eq!(labels["done"], 2);
        assert_eq!(instructions[0].params[0], "2");
        assert_eq!(instructions[0].dest_label.as_deref(), Some("done"));
    }

    #[test]
    fn unknown_label_is_fatal() {
        let mut instructions = lex("#pragma version 4\nb nowhere\nint 1\nreturn\n");
        let err = resolve_labels(&mut instructions).unwrap_err();
        assert!(matches!(err, AnalysisError::ParseLabels { .. }));
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut instructions = lex("#pragma version 4\nbnz done\nint 0\ndone:\nint 1\nreturn\n");
        resolve_labels(&mut instructions).unwrap();
        let snapshot = instructions.to_vec();
        resolve_labels(&mut instructions).unwrap();
        assert_eq!(snapshot, instructions);
    }

    #[test]
    fn switch_targets_are_rewritten() {
        let mut instructions =
            lex("#pragma version 8\nint 0\nswitch a b\na:\nint 1\nb:\nint 2\nreturn\n");
        resolve_labels(&mut instructions).unwrap();
        assert_eq!(instructions[1].params.to_vec(), vec!["2", "3"]);
    }
}
