//! Basic-block construction over the lexed instruction stream.
//!
//! A basic block is a maximal run of instructions where only the first may
//! carry a label and only the last may transfer control. Blocks are keyed by
//! the address of their first instruction; branch targets always point at a
//! block start once label resolution has run.

use crate::error::AnalysisError;
use crate::lexer::Instruction;
use crate::opcodes;
use std::collections::BTreeMap;

/// A contiguous run of instructions with a single entry and a single exit.
///
/// `adjacent_block_address` is the fall-through successor; the one block in a
/// well-formed program without a fall-through successor is the terminal block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub start_address: usize,
    pub end_address: usize,
    pub adjacent_block_address: Option<usize>,
}

/// The program's control-flow graph: blocks keyed by start address.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    blocks: BTreeMap<usize, BasicBlock>,
}

impl FlowGraph {
    /// Partition `instructions` into basic blocks and verify the result.
    pub fn build(instructions: &[Instruction]) -> Result<Self, AnalysisError> {
        let mut graph = Self::default();
        let mut current_start: Option<usize> = None;

        for inst in instructions {
            if inst.label.is_some() {
                if let Some(start) = current_start.take() {
                    graph.push_block(start, inst.address - 1, instructions.len());
                }
            }
            let start = *current_start.get_or_insert(inst.address);
            if opcodes::is_block_terminator(&inst.opcode) {
                graph.push_block(start, inst.address, instructions.len());
                current_start = None;
            }
        }
        if let Some(start) = current_start {
            graph.push_block(start, instructions.len() - 1, instructions.len());
        }

        graph.verify(instructions)?;
        Ok(graph)
    }

    fn push_block(&mut self, start: usize, end: usize, program_len: usize) {
        let adjacent = if end + 1 < program_len {
            Some(end + 1)
        } else {
            None
        };
        self.blocks.insert(
            start,
            BasicBlock {
                start_address: start,
                end_address: end,
                adjacent_block_address: adjacent,
            },
        );
    }

    /// Every branch parameter must name a block start, and exactly one block
    /// may lack a fall-through successor.
    fn verify(&self, instructions: &[Instruction]) -> Result<(), AnalysisError> {
        for inst in instructions {
            if opcodes::is_branch(&inst.opcode) {
                let target: usize = inst
                    .params
                    .first()
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| {
                        AnalysisError::BlockConstruction(format!(
                            "unresolved branch target at line {}",
                            inst.line_number
                        ))
                    })?;
                if !self.blocks.contains_key(&target) {
                    return Err(AnalysisError::BlockConstruction(format!(
                        "branch at line {} targets address {target}, which is not a block start",
                        inst.line_number
                    )));
                }
            }
        }

        let end_blocks = self
            .blocks
            .values()
            .filter(|block| block.adjacent_block_address.is_none())
            .count();
        if end_blocks != 1 {
            return Err(AnalysisError::BlockConstruction(format!(
                "expected exactly one end block, found {end_blocks}"
            )));
        }
        Ok(())
    }

    /// The block starting at `address`, if any.
    pub fn block_at(&self, address: usize) -> Option<&BasicBlock> {
        self.blocks.get(&address)
    }

    /// The block containing `address`, if any. Execution resumes mid-block
    /// after a multi-way branch, which does not end its block.
    pub fn containing(&self, address: usize) -> Option<&BasicBlock> {
        self.blocks
            .range(..=address)
            .next_back()
            .map(|(_, block)| block)
            .filter(|block| block.end_address >= address)
    }

    /// All blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.values()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AnalysisMode;
    use crate::lexer::parse_instructions;
    use crate::sourcemap::resolve_labels;

    fn build(source: &str) -> Result<FlowGraph, AnalysisError> {
        let mut listing = parse_instructions(source, AnalysisMode::Application, false).unwrap();
        resolve_labels(&mut listing.instructions).unwrap();
        FlowGraph::build(&listing.instructions)
    }

    #[test]
    fn straight_line_is_one_block() {
        let graph = build("#pragma version 4\nint 1\nint 2\n+\nreturn\n").unwrap();
        assert_eq!(graph.len(), 1);
        let block = graph.block_at(0).unwrap();
        assert_eq!(block.end_address, 3);
        assert_eq!(block.adjacent_block_address, None);
    }

    #[test]
    fn branches_split_blocks() {
        let graph = build(
            "#pragma version 4\nint 1\nbnz yes\nint 0\nb done\nyes:\nint 1\ndone:\nreturn\n",
        )
        .unwrap();
        // Blocks: [0,1] bnz, [2,3] b, [4] labeled, [5] labeled terminal.
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.block_at(0).unwrap().end_address, 1);
        assert_eq!(graph.block_at(2).unwrap().end_address, 3);
        assert_eq!(graph.block_at(4).unwrap().adjacent_block_address, Some(5));
        assert_eq!(graph.block_at(5).unwrap().adjacent_block_address, None);
    }

    #[test]
    fn exactly_one_terminal_block() {
        let graph = build(
            "#pragma version 4\nint 1\nbnz done\nint 0\ndone:\nint 1\nreturn\n",
        )
        .unwrap();
        let terminals = graph
            .blocks()
            .filter(|b| b.adjacent_block_address.is_none())
            .count();
        assert_eq!(terminals, 1);
    }

    #[test]
    fn labeled_block_starts_match_branch_targets() {
        let graph =
            build("#pragma version 4\nbnz over\nint 0\nover:\nint 1\nreturn\n").unwrap();
        assert!(graph.block_at(2).is_some());
    }

    #[test]
    fn unresolved_target_is_rejected() {
        let mut listing = parse_instructions(
            "#pragma version 4\nbnz somewhere\nint 1\nreturn\n",
            AnalysisMode::Application,
            false,
        )
        .unwrap();
        // Skip label resolution so the branch parameter stays symbolic.
        let err = FlowGraph::build(&listing.instructions).unwrap_err();
        assert!(matches!(err, AnalysisError::BlockConstruction(_)));
        // After resolution the same program fails on the missing label instead.
        assert!(resolve_labels(&mut listing.instructions).is_err());
    }
}
