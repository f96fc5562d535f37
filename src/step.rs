//! Symbolic semantics for individual opcodes.
//!
//! `step` interprets one instruction against a configuration and reports how
//! control continues. Values the analysis cannot usefully reason about
//! (hashes, byte-array math, array-valued transaction fields) become fresh
//! uninterpreted constants that still carry their operands' dependency sets,
//! so the constraint index stays sound. Opcodes with no model here make the
//! executor prune the path rather than abort the run.

use crate::context::AnalysisContext;
use crate::fields::{self, TxnField, TxnIndex};
use crate::lexer::Instruction;
use crate::state::{Configuration, SymTerm, SymValue, ValueDeps};
use log::debug;
use z3::ast::{Ast, Bool, BV};

/// How control continues after one instruction.
#[derive(Debug)]
pub enum Flow<'ctx> {
    Continue,
    /// An `assert`: the condition joins the path constraints or the path dies.
    Assume { cond: Bool<'ctx>, deps: ValueDeps },
    Jump(usize),
    Branch {
        cond: Bool<'ctx>,
        deps: ValueDeps,
        target: usize,
    },
    Switch {
        value: BV<'ctx>,
        deps: ValueDeps,
        targets: Vec<usize>,
    },
    Call(usize),
    Ret,
    /// A `return`: the path terminates and is handed to the detectors.
    Return,
    /// An `err`: the path terminates rejected.
    Fail,
}

/// A non-fatal failure to interpret one instruction; the executor prunes the
/// affected path.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("stack underflow executing {0}")]
    StackUnderflow(String),
    #[error("operand type mismatch executing {0}")]
    TypeMismatch(String),
    #[error("bad parameter for {0}")]
    BadParameter(String),
    #[error("unsupported opcode ({0})")]
    Unsupported(String),
}

type StepResult<'ctx> = Result<Flow<'ctx>, StepError>;

/// Execute `inst` against `config`.
pub fn step<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &mut Configuration<'ctx>,
    inst: &Instruction,
) -> StepResult<'ctx> {
    let ctx = actx.z3;
    let op = inst.opcode.as_str();
    match op {
        "err" => return Ok(Flow::Fail),
        "return" => {
            pop(config, op)?;
            return Ok(Flow::Return);
        }
        "assert" => {
            let (value, deps) = pop_uint(config, op)?;
            return Ok(Flow::Assume {
                cond: nonzero(ctx, &value),
                deps,
            });
        }
        "bnz" | "bz" => {
            let (value, deps) = pop_uint(config, op)?;
            let cond = if op == "bnz" {
                nonzero(ctx, &value)
            } else {
                value._eq(&BV::from_u64(ctx, 0, 64))
            };
            return Ok(Flow::Branch {
                cond,
                deps,
                target: param_usize(inst, 0)?,
            });
        }
        "b" => return Ok(Flow::Jump(param_usize(inst, 0)?)),
        "callsub" => return Ok(Flow::Call(param_usize(inst, 0)?)),
        "retsub" => return Ok(Flow::Ret),
        "switch" => {
            let (value, deps) = pop_uint(config, op)?;
            let targets = (0..inst.params.len())
                .map(|i| param_usize(inst, i))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Flow::Switch {
                value,
                deps,
                targets,
            });
        }
        _ => {}
    }

    match op {
        // Constants.
        "int" | "pushint" => {
            let value = param_u64(inst, 0)?;
            config.push(SymValue::literal_u64(ctx, value));
        }
        "addr" => {
            let literal = fields::bytes_val(ctx, param_str(inst, 0)?);
            config.push(SymValue::bytes(literal, ValueDeps::default()));
        }
        "byte" | "pushbytes" | "method" => {
            let literal = byte_literal(inst);
            config.push(SymValue::bytes(
                fields::bytes_val(ctx, &literal),
                ValueDeps::default(),
            ));
        }
        "intcblock" => {
            config.intc = inst
                .params
                .iter()
                .map(|p| p.parse::<u64>())
                .collect::<Result<_, _>>()
                .map_err(|_| StepError::BadParameter(op.to_string()))?;
        }
        "intc" | "intc_0" | "intc_1" | "intc_2" | "intc_3" => {
            let index = constant_index(inst, op, "intc")?;
            let value = *config
                .intc
                .get(index)
                .ok_or_else(|| StepError::BadParameter(op.to_string()))?;
            config.push(SymValue::literal_u64(ctx, value));
        }
        "bytecblock" => {
            config.bytec = inst.params.iter().map(|p| unquote(p)).collect();
        }
        "bytec" | "bytec_0" | "bytec_1" | "bytec_2" | "bytec_3" => {
            let index = constant_index(inst, op, "bytec")?;
            let value = config
                .bytec
                .get(index)
                .cloned()
                .ok_or_else(|| StepError::BadParameter(op.to_string()))?;
            config.push(SymValue::bytes(
                fields::bytes_val(ctx, &value),
                ValueDeps::default(),
            ));
        }

        // Logic-signature arguments.
        "arg" | "arg_0" | "arg_1" | "arg_2" | "arg_3" => {
            let value = config.fresh_bytes("arg");
            config.push(SymValue::bytes(value, ValueDeps::default()));
        }
        "args" => {
            let (_, deps) = pop_uint(config, op)?;
            let value = config.fresh_bytes("arg");
            config.push(SymValue::bytes(value, deps));
        }

        // Arithmetic.
        "+" | "-" | "*" | "/" | "%" | "|" | "&" | "^" | "shl" | "shr" => {
            let (b, b_deps) = pop_uint(config, op)?;
            let (a, a_deps) = pop_uint(config, op)?;
            let term = match op {
                "+" => a.bvadd(&b),
                "-" => a.bvsub(&b),
                "*" => a.bvmul(&b),
                "/" => a.bvudiv(&b),
                "%" => a.bvurem(&b),
                "|" => a.bvor(&b),
                "&" => a.bvand(&b),
                "^" => a.bvxor(&b),
                "shl" => a.bvshl(&b),
                _ => a.bvlshr(&b),
            };
            config.push(SymValue::uint(term, a_deps.merged(&b_deps)));
        }
        "~" => {
            let (a, deps) = pop_uint(config, op)?;
            config.push(SymValue::uint(a.bvnot(), deps));
        }

        // Comparison and logic.
        "<" | ">" | "<=" | ">=" => {
            let (b, b_deps) = pop_uint(config, op)?;
            let (a, a_deps) = pop_uint(config, op)?;
            let cond = match op {
                "<" => a.bvult(&b),
                ">" => a.bvugt(&b),
                "<=" => a.bvule(&b),
                _ => a.bvuge(&b),
            };
            config.push(SymValue::uint(
                bool_to_uint(ctx, &cond),
                a_deps.merged(&b_deps),
            ));
        }
        "==" | "!=" => {
            let b = pop(config, op)?;
            let a = pop(config, op)?;
            let cond = match (&a.term, &b.term) {
                (SymTerm::Uint(x), SymTerm::Uint(y)) => x._eq(y),
                (SymTerm::Bytes(x), SymTerm::Bytes(y)) => x._eq(y),
                _ => return Err(StepError::TypeMismatch(op.to_string())),
            };
            let cond = if op == "!=" { cond.not() } else { cond };
            config.push(SymValue::uint(
                bool_to_uint(ctx, &cond),
                a.deps.merged(&b.deps),
            ));
        }
        "&&" | "||" => {
            let (b, b_deps) = pop_uint(config, op)?;
            let (a, a_deps) = pop_uint(config, op)?;
            let (a, b) = (nonzero(ctx, &a), nonzero(ctx, &b));
            let cond = if op == "&&" {
                Bool::and(ctx, &[&a, &b])
            } else {
                Bool::or(ctx, &[&a, &b])
            };
            config.push(SymValue::uint(
                bool_to_uint(ctx, &cond),
                a_deps.merged(&b_deps),
            ));
        }
        "!" => {
            let (a, deps) = pop_uint(config, op)?;
            let cond = a._eq(&BV::from_u64(ctx, 0, 64));
            config.push(SymValue::uint(bool_to_uint(ctx, &cond), deps));
        }

        // Byte-array operators the analysis keeps uninterpreted.
        "len" | "btoi" => {
            let (_, deps) = pop_bytes(config, op)?;
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, deps));
        }
        "itob" => {
            let (_, deps) = pop_uint(config, op)?;
            let value = config.fresh_bytes(op);
            config.push(SymValue::bytes(value, deps));
        }
        "concat" => {
            let (_, b_deps) = pop_bytes(config, op)?;
            let (_, a_deps) = pop_bytes(config, op)?;
            let value = config.fresh_bytes(op);
            config.push(SymValue::bytes(value, a_deps.merged(&b_deps)));
        }
        "b==" | "b!=" => {
            let (b, b_deps) = pop_bytes(config, op)?;
            let (a, a_deps) = pop_bytes(config, op)?;
            let cond = a._eq(&b);
            let cond = if op == "b!=" { cond.not() } else { cond };
            config.push(SymValue::uint(
                bool_to_uint(ctx, &cond),
                a_deps.merged(&b_deps),
            ));
        }
        "b+" | "b-" | "b/" | "b*" | "b%" | "b|" | "b&" | "b^" => {
            let (_, b_deps) = pop_bytes(config, op)?;
            let (_, a_deps) = pop_bytes(config, op)?;
            let value = config.fresh_bytes("bmath");
            config.push(SymValue::bytes(value, a_deps.merged(&b_deps)));
        }
        "b<" | "b>" | "b<=" | "b>=" => {
            let (_, b_deps) = pop_bytes(config, op)?;
            let (_, a_deps) = pop_bytes(config, op)?;
            let value = config.fresh_uint("bcmp");
            config.push(SymValue::uint(value, a_deps.merged(&b_deps)));
        }
        "b~" | "bzero" => {
            let v = pop(config, op)?;
            let value = config.fresh_bytes(op);
            config.push(SymValue::bytes(value, v.deps));
        }
        "bsqrt" => {
            let (_, deps) = pop_bytes(config, op)?;
            let value = config.fresh_bytes(op);
            config.push(SymValue::bytes(value, deps));
        }
        "sqrt" | "bitlen" => {
            let v = pop(config, op)?;
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, v.deps));
        }
        "exp" => {
            let (_, b_deps) = pop_uint(config, op)?;
            let (_, a_deps) = pop_uint(config, op)?;
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, a_deps.merged(&b_deps)));
        }
        "divw" => {
            let mut deps = ValueDeps::default();
            for _ in 0..3 {
                deps.union(&pop_uint(config, op)?.1);
            }
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, deps));
        }
        "mulw" | "addw" | "expw" => {
            let (_, b_deps) = pop_uint(config, op)?;
            let (_, a_deps) = pop_uint(config, op)?;
            let deps = a_deps.merged(&b_deps);
            let high = config.fresh_uint(op);
            let low = config.fresh_uint(op);
            config.push(SymValue::uint(high, deps.clone()));
            config.push(SymValue::uint(low, deps));
        }
        "divmodw" => {
            let mut deps = ValueDeps::default();
            for _ in 0..4 {
                deps.union(&pop(config, op)?.deps);
            }
            for _ in 0..4 {
                let value = config.fresh_uint(op);
                config.push(SymValue::uint(value, deps.clone()));
            }
        }

        // Byte-array slicing, uninterpreted.
        "substring" | "extract" | "replace2" | "base64_decode" | "json_ref" => {
            let (_, deps) = pop_bytes(config, op)?;
            let value = config.fresh_bytes(op);
            config.push(SymValue::bytes(value, deps));
        }
        "substring3" | "extract3" | "replace3" | "setbyte" => {
            let mut deps = ValueDeps::default();
            for _ in 0..3 {
                deps.union(&pop(config, op)?.deps);
            }
            let value = config.fresh_bytes(op);
            config.push(SymValue::bytes(value, deps));
        }
        "extract_uint16" | "extract_uint32" | "extract_uint64" | "getbyte" | "getbit" => {
            let mut deps = ValueDeps::default();
            for _ in 0..2 {
                deps.union(&pop(config, op)?.deps);
            }
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, deps));
        }
        "setbit" => {
            let mut deps = ValueDeps::default();
            let (_, c_deps) = pop_uint(config, op)?;
            let (_, b_deps) = pop_uint(config, op)?;
            let target = pop(config, op)?;
            deps.union(&c_deps);
            deps.union(&b_deps);
            deps.union(&target.deps);
            match target.term {
                SymTerm::Uint(_) => {
                    let value = config.fresh_uint(op);
                    config.push(SymValue::uint(value, deps));
                }
                SymTerm::Bytes(_) => {
                    let value = config.fresh_bytes(op);
                    config.push(SymValue::bytes(value, deps));
                }
            }
        }

        // Hashes and signature checks taint their result; a tainted value
        // reaching a path constraint marks the whole path as hash-gated.
        "sha256" | "keccak256" | "sha512_256" | "sha3_256" => {
            let (_, deps) = pop_bytes(config, op)?;
            let value = config.fresh_bytes(op);
            config.push(SymValue::bytes(value, deps.merged(&ValueDeps::hashed())));
        }
        "ed25519verify" | "ed25519verify_bare" => {
            let mut deps = ValueDeps::hashed();
            for _ in 0..3 {
                deps.union(&pop(config, op)?.deps);
            }
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, deps));
        }
        "ecdsa_verify" => {
            let mut deps = ValueDeps::hashed();
            for _ in 0..5 {
                deps.union(&pop(config, op)?.deps);
            }
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, deps));
        }
        "ecdsa_pk_decompress" | "ecdsa_pk_recover" | "vrf_verify" => {
            let pops = match op {
                "ecdsa_pk_decompress" => 1,
                "ecdsa_pk_recover" => 4,
                _ => 3,
            };
            let mut deps = ValueDeps::hashed();
            for _ in 0..pops {
                deps.union(&pop(config, op)?.deps);
            }
            let first = config.fresh_bytes(op);
            let second = config.fresh_bytes(op);
            config.push(SymValue::bytes(first, deps.clone()));
            config.push(SymValue::bytes(second, deps));
        }

        // Stack manipulation.
        "pop" => {
            pop(config, op)?;
        }
        "dup" => {
            let top = peek(config, op, 0)?.clone();
            config.push(top);
        }
        "dup2" => {
            let b = peek(config, op, 0)?.clone();
            let a = peek(config, op, 1)?.clone();
            config.push(a);
            config.push(b);
        }
        "dupn" => {
            let count = param_usize(inst, 0)?;
            let top = peek(config, op, 0)?.clone();
            for _ in 0..count {
                config.push(top.clone());
            }
        }
        "popn" => {
            let count = param_usize(inst, 0)?;
            for _ in 0..count {
                pop(config, op)?;
            }
        }
        "swap" => {
            let b = pop(config, op)?;
            let a = pop(config, op)?;
            config.push(b);
            config.push(a);
        }
        "select" => {
            let (c, c_deps) = pop_uint(config, op)?;
            let b = pop(config, op)?;
            let a = pop(config, op)?;
            let cond = nonzero(ctx, &c);
            let deps = c_deps.merged(&a.deps).merged(&b.deps);
            match (&a.term, &b.term) {
                (SymTerm::Uint(x), SymTerm::Uint(y)) => {
                    config.push(SymValue::uint(cond.ite(y, x), deps));
                }
                (SymTerm::Bytes(x), SymTerm::Bytes(y)) => {
                    config.push(SymValue::bytes(cond.ite(y, x), deps));
                }
                _ => return Err(StepError::TypeMismatch(op.to_string())),
            }
        }
        "dig" => {
            let depth = param_usize(inst, 0)?;
            let value = peek(config, op, depth)?.clone();
            config.push(value);
        }
        "cover" => {
            let depth = param_usize(inst, 0)?;
            let value = pop(config, op)?;
            let len = config.stack.len();
            if depth > len {
                return Err(StepError::StackUnderflow(op.to_string()));
            }
            config.stack.insert(len - depth, value);
        }
        "uncover" => {
            let depth = param_usize(inst, 0)?;
            let len = config.stack.len();
            if depth >= len {
                return Err(StepError::StackUnderflow(op.to_string()));
            }
            let value = config.stack.remove(len - 1 - depth);
            config.push(value);
        }

        // Scratch space.
        "store" => {
            let value = pop(config, op)?;
            config.scratch_store(param_u64(inst, 0)?, &value);
        }
        "load" => {
            let value = config.scratch_load(param_u64(inst, 0)?);
            config.push(value);
        }
        "stores" => {
            let value = pop(config, op)?;
            let slot = pop(config, op)?;
            match slot.as_literal_u64() {
                Some(slot) => config.scratch_store(slot, &value),
                None => debug!("stores with a symbolic slot at line {}", inst.line_number),
            }
        }
        "loads" => {
            let slot = pop(config, op)?;
            match slot.as_literal_u64() {
                Some(slot) => {
                    let value = config.scratch_load(slot);
                    config.push(value);
                }
                None => {
                    let value = config.fresh_uint("scratch");
                    config.push(SymValue::uint(value, slot.deps));
                }
            }
        }

        // Transaction and global fields.
        "txn" => {
            let index = if config.app_area {
                actx.app_txn_index()
            } else {
                TxnIndex::Group
            };
            let value = read_txn_field(config, param_str(inst, 0)?, index, None);
            config.push(value);
        }
        "gtxn" => {
            let index = TxnIndex::Literal(param_u64(inst, 0)?);
            config.opcode_record.gtxn_indices.insert(index);
            let value = read_txn_field(config, param_str(inst, 1)?, index, None);
            config.push(value);
        }
        "gtxns" => {
            let (index_bv, index_deps) = pop_uint(config, op)?;
            let index = match index_bv.as_u64() {
                Some(n) => TxnIndex::Literal(n),
                None => TxnIndex::Group,
            };
            config.opcode_record.gtxn_indices.insert(index);
            let mut value = read_txn_field(config, param_str(inst, 0)?, index, Some(&index_bv));
            value.deps.union(&index_deps);
            config.push(value);
        }
        "global" => {
            let value = read_global_field(config, param_str(inst, 0)?);
            config.push(value);
        }
        "txna" | "gtxna" => {
            let value = config.fresh_bytes("txnarray");
            config.push(SymValue::bytes(value, ValueDeps::default()));
        }
        "txnas" | "gtxnas" | "gtxnsa" => {
            let (_, deps) = pop_uint(config, op)?;
            let value = config.fresh_bytes("txnarray");
            config.push(SymValue::bytes(value, deps));
        }
        "gtxnsas" => {
            let (_, b_deps) = pop_uint(config, op)?;
            let (_, a_deps) = pop_uint(config, op)?;
            let value = config.fresh_bytes("txnarray");
            config.push(SymValue::bytes(value, a_deps.merged(&b_deps)));
        }

        // Application state.
        "app_global_put" => {
            let value = pop(config, op)?;
            let (key, _) = pop_bytes(config, op)?;
            config.opcode_record.app_global_put = true;
            match &value.term {
                SymTerm::Uint(bv) => {
                    config.global_state_uint = config.global_state_uint.store(&key, bv);
                }
                SymTerm::Bytes(s) => {
                    config.global_state_bytes = config.global_state_bytes.store(&key, s);
                }
            }
        }
        "app_global_get" => {
            let (key, deps) = pop_bytes(config, op)?;
            let value = config
                .global_state_uint
                .select(&key)
                .as_bv()
                .expect("global state uint view has bitvector range");
            config.push(SymValue::uint(value, deps));
        }
        "app_global_get_ex" => {
            let (_, key_deps) = pop_bytes(config, op)?;
            let (_, app_deps) = pop_uint(config, op)?;
            let value = config.fresh_uint("global_ex");
            let exists = config.fresh_uint("exists");
            config.push(SymValue::uint(value, key_deps.merged(&app_deps)));
            config.push(SymValue::uint(exists, ValueDeps::default()));
        }
        "app_global_del" => {
            pop_bytes(config, op)?;
        }
        "app_local_get" => {
            let (key, key_deps) = pop_bytes(config, op)?;
            let account = pop(config, op)?;
            config.opcode_record.app_local_get = true;
            config.opcode_record.local_users.insert(account.render());
            let value = config
                .local_state_uint
                .select(&key)
                .as_bv()
                .expect("local state uint view has bitvector range");
            config.push(SymValue::uint(value, key_deps.merged(&account.deps)));
        }
        "app_local_get_ex" => {
            let (_, key_deps) = pop_bytes(config, op)?;
            let (_, _) = pop_uint(config, op)?;
            let account = pop(config, op)?;
            config.opcode_record.app_local_get = true;
            config.opcode_record.local_users.insert(account.render());
            let value = config.fresh_uint("local_ex");
            let exists = config.fresh_uint("exists");
            config.push(SymValue::uint(value, key_deps.merged(&account.deps)));
            config.push(SymValue::uint(exists, ValueDeps::default()));
        }
        "app_local_put" => {
            let value = pop(config, op)?;
            let (key, _) = pop_bytes(config, op)?;
            let account = pop(config, op)?;
            config.opcode_record.app_local_put = true;
            config.opcode_record.local_users.insert(account.render());
            match &value.term {
                SymTerm::Uint(bv) => {
                    config.local_state_uint = config.local_state_uint.store(&key, bv);
                }
                SymTerm::Bytes(s) => {
                    config.local_state_bytes = config.local_state_bytes.store(&key, s);
                }
            }
        }
        "app_local_del" => {
            pop_bytes(config, op)?;
            let account = pop(config, op)?;
            config.opcode_record.local_users.insert(account.render());
        }
        "app_opted_in" => {
            let (_, app_deps) = pop_uint(config, op)?;
            let account = pop(config, op)?;
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, app_deps.merged(&account.deps)));
        }
        "balance" | "min_balance" => {
            let account = pop(config, op)?;
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, account.deps));
        }
        "asset_holding_get" => {
            let (_, asset_deps) = pop_uint(config, op)?;
            let account = pop(config, op)?;
            let value = config.fresh_uint(op);
            let exists = config.fresh_uint("exists");
            config.push(SymValue::uint(value, asset_deps.merged(&account.deps)));
            config.push(SymValue::uint(exists, ValueDeps::default()));
        }
        "asset_params_get" | "app_params_get" | "acct_params_get" => {
            let operand = pop(config, op)?;
            let value = config.fresh_uint(op);
            let exists = config.fresh_uint("exists");
            config.push(SymValue::uint(value, operand.deps));
            config.push(SymValue::uint(exists, ValueDeps::default()));
        }
        "log" => {
            pop(config, op)?;
        }

        // Inner transactions.
        "itxn_begin" | "itxn_next" => {}
        "itxn_field" => {
            let value = pop(config, op)?;
            if param_str(inst, 0)? == "Fee" && value.as_literal_u64().is_none() {
                config.symbolic_inner_txn_fee = true;
            }
        }
        "itxn_submit" => {
            config.opcode_record.itxn_submit = true;
        }
        "itxn" => {
            let field = param_str(inst, 0)?.to_string();
            let value = fresh_for_field(config, &field);
            config.push(value);
        }
        "itxna" | "gitxn" | "gitxna" => {
            let value = config.fresh_bytes("itxnarray");
            config.push(SymValue::bytes(value, ValueDeps::default()));
        }
        "itxnas" | "gitxnas" => {
            let (_, deps) = pop_uint(config, op)?;
            let value = config.fresh_bytes("itxnarray");
            config.push(SymValue::bytes(value, deps));
        }

        // Cross-program scratch and transaction ids.
        "gload" | "gaid" => {
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, ValueDeps::default()));
        }
        "gloads" | "gaids" | "block" => {
            let operand = pop(config, op)?;
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, operand.deps));
        }
        "gloadss" => {
            let (_, b_deps) = pop_uint(config, op)?;
            let (_, a_deps) = pop_uint(config, op)?;
            let value = config.fresh_uint(op);
            config.push(SymValue::uint(value, a_deps.merged(&b_deps)));
        }

        "proto" => {}

        other => return Err(StepError::Unsupported(other.to_string())),
    }
    Ok(Flow::Continue)
}

/// Read a transaction field at `index`, selecting with `select_bv` when the
/// index came off the stack as a symbolic value.
fn read_txn_field<'ctx>(
    config: &mut Configuration<'ctx>,
    field_name: &str,
    index: TxnIndex,
    select_bv: Option<&BV<'ctx>>,
) -> SymValue<'ctx> {
    let ctx = config.ctx;
    match TxnField::parse(field_name) {
        Some(field) => {
            let owned;
            let at = match select_bv {
                Some(bv) => bv,
                None => {
                    owned = index.to_bv(ctx);
                    &owned
                }
            };
            let deps = ValueDeps::txn_field(field, index);
            if field.is_bytes() {
                SymValue::bytes(fields::gtxn_bytes(ctx, field, at), deps)
            } else {
                SymValue::uint(fields::gtxn_uint(ctx, field, at), deps)
            }
        }
        None if bytes_like_field(field_name) => {
            let value = config.fresh_bytes(&format!("gtxn_{field_name}"));
            SymValue::bytes(value, ValueDeps::default())
        }
        None => {
            let value = config.fresh_uint(&format!("gtxn_{field_name}"));
            SymValue::uint(value, ValueDeps::default())
        }
    }
}

fn read_global_field<'ctx>(config: &mut Configuration<'ctx>, field: &str) -> SymValue<'ctx> {
    let ctx = config.ctx;
    match field {
        "GroupSize" => {
            let mut deps = ValueDeps::default();
            deps.group_size = true;
            SymValue::uint(fields::group_size(ctx), deps)
        }
        "LatestTimestamp" => {
            config.opcode_record.timestamp = true;
            SymValue::uint(
                BV::new_const(ctx, "global_LatestTimestamp", 64),
                ValueDeps::default(),
            )
        }
        "ZeroAddress" => SymValue::bytes(fields::zero_address(ctx), ValueDeps::default()),
        "MinTxnFee" => SymValue::literal_u64(ctx, 1000),
        "MinBalance" => SymValue::literal_u64(ctx, 100_000),
        "MaxTxnLife" => SymValue::literal_u64(ctx, 1000),
        "GroupID" | "CreatorAddress" | "CurrentApplicationAddress" | "CallerApplicationAddress" => {
            SymValue::bytes(
                z3::ast::String::new_const(ctx, format!("global_{field}")),
                ValueDeps::default(),
            )
        }
        _ => SymValue::uint(
            BV::new_const(ctx, format!("global_{field}"), 64),
            ValueDeps::default(),
        ),
    }
}

/// Array-valued transaction fields are byte strings; everything else the
/// precise table does not cover defaults to uint64 unless the name says
/// otherwise.
fn bytes_like_field(name: &str) -> bool {
    matches!(
        name,
        "Note" | "Lease" | "VotePK" | "SelectionPK" | "StateProofPK" | "TxID"
    ) || name.ends_with("Address")
        || name.ends_with("Program")
}

fn fresh_for_field<'ctx>(config: &mut Configuration<'ctx>, field: &str) -> SymValue<'ctx> {
    let is_bytes = TxnField::parse(field)
        .map(|f| f.is_bytes())
        .unwrap_or_else(|| bytes_like_field(field));
    if is_bytes {
        let value = config.fresh_bytes(&format!("itxn_{field}"));
        SymValue::bytes(value, ValueDeps::default())
    } else {
        let value = config.fresh_uint(&format!("itxn_{field}"));
        SymValue::uint(value, ValueDeps::default())
    }
}

fn pop<'ctx>(config: &mut Configuration<'ctx>, op: &str) -> Result<SymValue<'ctx>, StepError> {
    config
        .pop()
        .ok_or_else(|| StepError::StackUnderflow(op.to_string()))
}

fn pop_uint<'ctx>(
    config: &mut Configuration<'ctx>,
    op: &str,
) -> Result<(BV<'ctx>, ValueDeps), StepError> {
    match pop(config, op)? {
        SymValue {
            term: SymTerm::Uint(bv),
            deps,
        } => Ok((bv, deps)),
        _ => Err(StepError::TypeMismatch(op.to_string())),
    }
}

fn pop_bytes<'ctx>(
    config: &mut Configuration<'ctx>,
    op: &str,
) -> Result<(z3::ast::String<'ctx>, ValueDeps), StepError> {
    match pop(config, op)? {
        SymValue {
            term: SymTerm::Bytes(s),
            deps,
        } => Ok((s, deps)),
        _ => Err(StepError::TypeMismatch(op.to_string())),
    }
}

fn peek<'a, 'ctx>(
    config: &'a Configuration<'ctx>,
    op: &str,
    depth: usize,
) -> Result<&'a SymValue<'ctx>, StepError> {
    let len = config.stack.len();
    if depth >= len {
        return Err(StepError::StackUnderflow(op.to_string()));
    }
    Ok(&config.stack[len - 1 - depth])
}

fn param_str<'a>(inst: &'a Instruction, index: usize) -> Result<&'a str, StepError> {
    inst.params
        .get(index)
        .map(|p| p.as_str())
        .ok_or_else(|| StepError::BadParameter(inst.opcode.clone()))
}

fn param_u64(inst: &Instruction, index: usize) -> Result<u64, StepError> {
    inst.params
        .get(index)
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| StepError::BadParameter(inst.opcode.clone()))
}

fn param_usize(inst: &Instruction, index: usize) -> Result<usize, StepError> {
    inst.params
        .get(index)
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| StepError::BadParameter(inst.opcode.clone()))
}

/// `intc_2` style fixed indices and `intc 2` style parameter indices.
fn constant_index(inst: &Instruction, op: &str, base: &str) -> Result<usize, StepError> {
    match op.strip_prefix(base).and_then(|s| s.strip_prefix('_')) {
        Some(fixed) => fixed
            .parse()
            .map_err(|_| StepError::BadParameter(op.to_string())),
        None => param_usize(inst, 0),
    }
}

/// Join and unquote the token list of a byte-literal pseudo-op.
fn byte_literal(inst: &Instruction) -> String {
    unquote(&inst.params.join(" "))
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn nonzero<'ctx>(ctx: &'ctx z3::Context, value: &BV<'ctx>) -> Bool<'ctx> {
    value._eq(&BV::from_u64(ctx, 0, 64)).not()
}

fn bool_to_uint<'ctx>(ctx: &'ctx z3::Context, cond: &Bool<'ctx>) -> BV<'ctx> {
    cond.ite(&BV::from_u64(ctx, 1, 64), &BV::from_u64(ctx, 0, 64))
}
