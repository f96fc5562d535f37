//! The symbolic execution driver.
//!
//! Explores the control-flow graph depth-first from the entry configuration.
//! Conditional branches are checked against the solver on both sides; each
//! satisfiable side continues in a forked configuration, unsatisfiable sides
//! are pruned. Paths that reach a `return` are handed to the detection
//! registry; `err` paths and paths the interpreter cannot model are dropped.

use crate::context::AnalysisContext;
use crate::detectors::{self, Finding};
use crate::error::AnalysisError;
use crate::state::Configuration;
use crate::step::{self, Flow};
use log::{debug, trace, warn};
use std::collections::BTreeSet;
use z3::ast::{Ast, Bool, BV};

/// Run `initial` to all feasible terminal configurations and collect the
/// union of detector findings.
pub fn run<'ctx>(
    actx: &AnalysisContext<'ctx>,
    initial: Configuration<'ctx>,
) -> Result<Vec<Finding>, AnalysisError> {
    let mut findings: BTreeSet<Finding> = BTreeSet::new();
    let mut worklist = vec![initial];

    'paths: while let Some(mut config) = worklist.pop() {
        if actx.deadline_exceeded() {
            return Err(AnalysisError::Timeout);
        }
        if config.executed_blocks >= actx.block_budget {
            warn!("path exceeded the block budget, pruning");
            continue;
        }
        config.executed_blocks += 1;

        if let Some(boundary) = actx.app_boundary {
            if config.pc >= boundary {
                config.app_area = true;
            }
        }

        let block = actx.graph.containing(config.pc).ok_or_else(|| {
            AnalysisError::BlockConstruction(format!("no block contains address {}", config.pc))
        })?;
        trace!(
            "executing block [{}, {}] from {}, {} paths pending",
            block.start_address,
            block.end_address,
            config.pc,
            worklist.len()
        );

        for address in config.pc..=block.end_address {
            let inst = &actx.instructions[address];
            let flow = match step::step(actx, &mut config, inst) {
                Ok(flow) => flow,
                Err(err) => {
                    warn!("pruning path at line {}: {err}", inst.line_number);
                    continue 'paths;
                }
            };
            match flow {
                Flow::Continue => {}
                Flow::Assume { cond, deps } => {
                    if actx
                        .solver
                        .is_sat(config.constraints.terms(), &[cond.clone()])
                    {
                        config.assume(cond, &deps);
                    } else {
                        debug!("assert at line {} is unsatisfiable", inst.line_number);
                        continue 'paths;
                    }
                }
                Flow::Jump(target) => {
                    config.pc = target;
                    worklist.push(config);
                    continue 'paths;
                }
                Flow::Call(target) => {
                    config.call_stack.push(address + 1);
                    config.pc = target;
                    worklist.push(config);
                    continue 'paths;
                }
                Flow::Ret => {
                    match config.call_stack.pop() {
                        Some(return_address) => {
                            config.pc = return_address;
                            worklist.push(config);
                        }
                        None => warn!("retsub with an empty call stack at line {}", inst.line_number),
                    }
                    continue 'paths;
                }
                Flow::Branch { cond, deps, target } => {
                    if actx
                        .solver
                        .is_sat(config.constraints.terms(), &[cond.clone()])
                    {
                        let mut taken = config.clone();
                        taken.assume(cond.clone(), &deps);
                        taken.pc = target;
                        worklist.push(taken);
                    }
                    let fallthrough = cond.not();
                    if actx
                        .solver
                        .is_sat(config.constraints.terms(), &[fallthrough.clone()])
                    {
                        config.assume(fallthrough, &deps);
                        match block.adjacent_block_address {
                            Some(next) => {
                                config.pc = next;
                                worklist.push(config);
                            }
                            None => {
                                findings.extend(detectors::inspect(actx, &config));
                            }
                        }
                    }
                    continue 'paths;
                }
                Flow::Switch {
                    value,
                    deps,
                    targets,
                } => {
                    let mut misses: Vec<Bool<'ctx>> = Vec::with_capacity(targets.len());
                    for (position, target) in targets.iter().enumerate() {
                        let cond = value._eq(&BV::from_u64(actx.z3, position as u64, 64));
                        if actx
                            .solver
                            .is_sat(config.constraints.terms(), &[cond.clone()])
                        {
                            let mut taken = config.clone();
                            taken.assume(cond.clone(), &deps);
                            taken.pc = *target;
                            worklist.push(taken);
                        }
                        misses.push(cond.not());
                    }
                    let refs: Vec<&Bool<'ctx>> = misses.iter().collect();
                    let none_taken = Bool::and(actx.z3, &refs);
                    if actx
                        .solver
                        .is_sat(config.constraints.terms(), &[none_taken.clone()])
                    {
                        config.assume(none_taken, &deps);
                        // A multi-way branch does not end its block; execution
                        // resumes at the next instruction.
                        if address < block.end_address {
                            config.pc = address + 1;
                            worklist.push(config);
                        } else {
                            match block.adjacent_block_address {
                                Some(next) => {
                                    config.pc = next;
                                    worklist.push(config);
                                }
                                None => findings.extend(detectors::inspect(actx, &config)),
                            }
                        }
                    }
                    continue 'paths;
                }
                Flow::Return => {
                    findings.extend(detectors::inspect(actx, &config));
                    continue 'paths;
                }
                Flow::Fail => {
                    debug!("path rejected at line {}", inst.line_number);
                    continue 'paths;
                }
            }
        }

        // The block ended without a control transfer: fall through.
        match block.adjacent_block_address {
            Some(next) => {
                config.pc = next;
                worklist.push(config);
            }
            None => {
                findings.extend(detectors::inspect(actx, &config));
            }
        }
    }

    Ok(findings.into_iter().collect())
}
