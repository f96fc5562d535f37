//! Lexer for TEAL assembly source.
//!
//! Turns a source file into the ordered instruction stream the rest of the
//! pipeline consumes. Instructions are immutable after this pass, except for
//! the in-place branch-target rewrite performed by label resolution.

use crate::context::AnalysisMode;
use crate::error::AnalysisError;
use crate::opcodes;
use log::debug;
use regex::Regex;
use smallvec::SmallVec;

/// Highest TEAL version the analyzer understands.
pub const MAX_TEAL_VERSION: u8 = 8;

/// A single lexed instruction.
///
/// `address` is the instruction's index in the program; `label` is a jump
/// target name attached to this instruction, resolved later by the label pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: usize,
    pub opcode: String,
    pub params: SmallVec<[String; 2]>,
    pub label: Option<String>,
    pub dest_label: Option<String>,
    pub comment: Option<String>,
    pub line_number: usize,
}

/// The lexed program: its version directive and instruction stream.
#[derive(Debug, Clone)]
pub struct Listing {
    pub version: u8,
    pub instructions: Vec<Instruction>,
}

/// Lex `source` into a [`Listing`].
///
/// `skip_checks` disables the arity and mode verification; it is set when the
/// source was produced by the application inliner, whose spliced body may use
/// opcodes the outer mode forbids.
pub fn parse_instructions(
    source: &str,
    mode: AnalysisMode,
    skip_checks: bool,
) -> Result<Listing, AnalysisError> {
    let byte_literal = Regex::new("^(byte \".*\")").expect("static regex");
    let pushbytes_literal = Regex::new("^(pushbytes \".*\")").expect("static regex");
    let label_def = Regex::new("^([a-zA-Z0-9_]+):").expect("static regex");

    let mut lines = source.lines().enumerate();
    let version = parse_pragma(&mut lines)?;

    let mut instructions: Vec<Instruction> = Vec::new();
    let mut pending_labels: SmallVec<[String; 1]> = SmallVec::new();
    let mut address = 0usize;
    let mut last_line = 1usize;

    for (index, raw) in lines {
        let line_number = index + 1;
        last_line = line_number;
        let mut token = raw.trim();
        if token.is_empty() || token.starts_with("//") {
            continue;
        }
        if token.starts_with("#pragma") {
            debug!("ignoring extra pragma at line {line_number}");
            continue;
        }

        // Strip a trailing comment, but never reach inside a quoted byte
        // literal: the scan for `//` starts after the literal's closing quote.
        let mut comment = None;
        let literal_end = byte_literal
            .captures(token)
            .or_else(|| pushbytes_literal.captures(token))
            .and_then(|c| c.get(1))
            .map(|m| m.end())
            .unwrap_or(0);
        if let Some(pos) = token[literal_end..].find("//") {
            let at = literal_end + pos;
            comment = Some(token[at + 2..].trim().to_string());
            token = token[..at].trim();
        }

        if let Some(captures) = label_def.captures(token) {
            pending_labels.push(captures[1].to_string());
            continue;
        }

        if pending_labels.len() > 1 {
            return Err(AnalysisError::parse_instructions(
                line_number,
                "multiple labels attached to one instruction",
            ));
        }
        let label = pending_labels.pop();

        let mut parts = token.split_whitespace();
        let opcode = parts.next().unwrap_or_default().to_string();
        let params: SmallVec<[String; 2]> = parts.map(str::to_string).collect();

        if !skip_checks {
            check_instruction(&opcode, params.len(), mode, line_number)?;
        }

        instructions.push(Instruction {
            address,
            opcode,
            params,
            label,
            dest_label: None,
            comment,
            line_number,
        });
        address += 1;
    }

    if !pending_labels.is_empty() {
        return Err(AnalysisError::parse_instructions(
            last_line,
            "file ends with a dangling label",
        ));
    }

    // Guarantee a well-defined terminal block.
    let needs_return = instructions
        .last()
        .map(|inst| inst.opcode != "return" && inst.opcode != "err")
        .unwrap_or(true);
    if needs_return {
        debug!("synthesizing trailing return at address {address}");
        instructions.push(Instruction {
            address,
            opcode: "return".to_string(),
            params: SmallVec::new(),
            label: None,
            dest_label: None,
            comment: None,
            line_number: last_line + 1,
        });
    }

    Ok(Listing {
        version,
        instructions,
    })
}

/// Rewrite named integer constants (`int NoOp`, `int axfer`, ...) to their
/// numeric values so the executor only ever sees numerals.
pub fn normalize_int_constants(listing: &mut Listing) {
    for inst in &mut listing.instructions {
        if inst.opcode == "int" || inst.opcode == "pushint" {
            if let Some(first) = inst.params.first_mut() {
                if let Some(value) = opcodes::int_constant(first) {
                    *first = value.to_string();
                }
            }
        }
    }
}

fn parse_pragma<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
) -> Result<u8, AnalysisError> {
    for (index, raw) in lines {
        let line_number = index + 1;
        let token = raw.trim();
        if token.is_empty() || token.starts_with("//") {
            continue;
        }
        let version = token
            .strip_prefix("#pragma version")
            .map(str::trim)
            .ok_or_else(|| {
                AnalysisError::parse_instructions(line_number, "unable to resolve TEAL version")
            })?;
        let version: u8 = version.parse().map_err(|_| {
            AnalysisError::parse_instructions(line_number, "unable to resolve TEAL version")
        })?;
        if version == 0 || version > MAX_TEAL_VERSION {
            return Err(AnalysisError::parse_instructions(
                line_number,
                format!("unsupported TEAL version {version}"),
            ));
        }
        return Ok(version);
    }
    Err(AnalysisError::parse_instructions(
        0,
        "unable to resolve TEAL version",
    ))
}

fn check_instruction(
    opcode: &str,
    params: usize,
    mode: AnalysisMode,
    line_number: usize,
) -> Result<(), AnalysisError> {
    let arity = opcodes::params_number(opcode).ok_or_else(|| {
        AnalysisError::parse_instructions(line_number, format!("unknown opcode ({opcode})"))
    })?;
    if arity != opcodes::VARIADIC && arity as usize != params {
        return Err(AnalysisError::parse_instructions(
            line_number,
            format!("opcode ({opcode}) parameter number mismatch"),
        ));
    }
    match mode {
        AnalysisMode::Application if !opcodes::support_application_mode(opcode) => {
            Err(AnalysisError::parse_instructions(
                line_number,
                format!("opcode ({opcode}) does not support application mode"),
            ))
        }
        AnalysisMode::Signature if !opcodes::support_signature_mode(opcode) => {
            Err(AnalysisError::parse_instructions(
                line_number,
                format!("opcode ({opcode}) does not support signature mode"),
            ))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Result<Listing, AnalysisError> {
        parse_instructions(source, AnalysisMode::Application, false)
    }

    #[test]
    fn version_bounds() {
        assert!(lex("#pragma version 8\nint 1\nreturn\n").is_ok());
        assert!(lex("#pragma version 9\nint 1\nreturn\n").is_err());
        assert!(lex("int 1\nreturn\n").is_err());
    }

    #[test]
    fn pragma_after_leading_comments() {
        let listing = lex("// header\n\n#pragma version 6\nint 1\nreturn\n").unwrap();
        assert_eq!(listing.version, 6);
        assert_eq!(listing.instructions.len(), 2);
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let listing = lex("#pragma version 4\n\n// note\nint 1 // trailing\nreturn\n").unwrap();
        assert_eq!(listing.instructions.len(), 2);
        assert_eq!(listing.instructions[0].comment.as_deref(), Some("trailing"));
        assert_eq!(listing.instructions[0].params[0], "1");
    }

    #[test]
    fn byte_literal_keeps_slashes() {
        let listing = lex("#pragma version 4\nbyte \"a//b\" // real comment\nint 1\nreturn\n")
            .unwrap();
        let inst = &listing.instructions[0];
        assert_eq!(inst.opcode, "byte");
        assert_eq!(inst.params[0], "\"a//b\"");
        assert_eq!(inst.comment.as_deref(), Some("real comment"));
    }

    #[test]
    fn label_attaches_to_next_instruction() {
        let listing = lex("#pragma version 4\nb done\ndone:\nint 1\nreturn\n").unwrap();
        assert_eq!(listing.instructions[1].label.as_deref(), Some("done"));
    }

    #[test]
    fn stacked_labels_are_fatal() {
        let err = lex("#pragma version 4\na:\nb:\nint 1\nreturn\n").unwrap_err();
        assert!(matches!(err, AnalysisError::ParseInstructions { .. }));
    }

    #[test]
    fn dangling_label_is_fatal() {
        assert!(lex("#pragma version 4\nint 1\nreturn\nend:\n").is_err());
    }

    #[test]
    fn missing_terminator_synthesizes_return() {
        let listing = lex("#pragma version 4\nint 1\n").unwrap();
        assert_eq!(listing.instructions.last().unwrap().opcode, "return");
        // An explicit trailing return is left alone.
        let listing = lex("#pragma version 4\nint 1\nreturn\n").unwrap();
        assert_eq!(listing.instructions.len(), 2);
    }

    #[test]
    fn arity_mismatch_is_fatal() {
        assert!(lex("#pragma version 4\nint\nreturn\n").is_err());
        assert!(lex("#pragma version 4\ngtxn 0\nreturn\n").is_err());
    }

    #[test]
    fn mode_violations_are_fatal() {
        assert!(lex("#pragma version 4\narg 0\nreturn\n").is_err());
        let err = parse_instructions(
            "#pragma version 4\napp_global_get\nreturn\n",
            AnalysisMode::Signature,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("signature mode"));
    }

    #[test]
    fn checks_skipped_for_inlined_source() {
        let listing = parse_instructions(
            "#pragma version 4\napp_global_get\nreturn\n",
            AnalysisMode::Signature,
            true,
        )
        .unwrap();
        assert_eq!(listing.instructions[0].opcode, "app_global_get");
    }

    #[test]
    fn relex_of_rendered_listing_is_stable() {
        let source = "#pragma version 4\nint 1\nloop:\nint 2\nbnz loop\nreturn\n";
        let first = lex(source).unwrap();
        let rendered: Vec<String> = first
            .instructions
            .iter()
            .map(|inst| {
                let mut line = String::new();
                if let Some(label) = &inst.label {
                    line.push_str(&format!("{label}:\n"));
                }
                line.push_str(&inst.opcode);
                for p in &inst.params {
                    line.push(' ');
                    line.push_str(p);
                }
                line
            })
            .collect();
        let rendered = format!("#pragma version 4\n{}\n", rendered.join("\n"));
        let second = lex(&rendered).unwrap();
        let strip = |l: &Listing| -> Vec<(String, Vec<String>, Option<String>)> {
            l.instructions
                .iter()
                .map(|i| (i.opcode.clone(), i.params.to_vec(), i.label.clone()))
                .collect()
        };
        assert_eq!(strip(&first), strip(&second));
    }

    #[test]
    fn int_constant_normalization() {
        let mut listing = lex("#pragma version 4\nint UpdateApplication\nint 7\nreturn\n").unwrap();
        normalize_int_constants(&mut listing);
        assert_eq!(listing.instructions[0].params[0], "4");
        assert_eq!(listing.instructions[1].params[0], "7");
    }
}
