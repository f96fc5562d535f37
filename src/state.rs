//! The symbolic state of one execution path.
//!
//! A [`Configuration`] owns everything a path mutates: the symbolic stack,
//! the dual-view scratch memory, the application state arrays, the opcode
//! record, and the accumulated path constraints. Instructions and blocks are
//! shared read-only; forking a path clones the configuration (Z3 terms are
//! reference-counted, so a fork copies pointers, not ASTs).

use crate::fields::{TxnField, TxnIndex};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use z3::ast::{Array, Bool, String as SymString, BV};
use z3::{Context, Sort};

/// Named symbolic inputs a value is derived from. Maintained by the executor
/// so that "is this variable constrained?" is an index lookup instead of an
/// AST scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueDeps {
    pub txn: BTreeSet<(TxnField, TxnIndex)>,
    pub group_size: bool,
    pub hash: bool,
}

impl ValueDeps {
    pub fn txn_field(field: TxnField, index: TxnIndex) -> Self {
        let mut deps = Self::default();
        deps.txn.insert((field, index));
        deps
    }

    pub fn hashed() -> Self {
        Self {
            hash: true,
            ..Self::default()
        }
    }

    pub fn union(&mut self, other: &Self) {
        self.txn.extend(other.txn.iter().copied());
        self.group_size |= other.group_size;
        self.hash |= other.hash;
    }

    pub fn merged(mut self, other: &Self) -> Self {
        self.union(other);
        self
    }
}

/// A symbolic stack slot: a 64-bit bit-vector or a byte string.
#[derive(Debug, Clone)]
pub enum SymTerm<'ctx> {
    Uint(BV<'ctx>),
    Bytes(SymString<'ctx>),
}

/// A symbolic value together with the named inputs it depends on.
#[derive(Debug, Clone)]
pub struct SymValue<'ctx> {
    pub term: SymTerm<'ctx>,
    pub deps: ValueDeps,
}

impl<'ctx> SymValue<'ctx> {
    pub fn uint(term: BV<'ctx>, deps: ValueDeps) -> Self {
        Self {
            term: SymTerm::Uint(term),
            deps,
        }
    }

    pub fn bytes(term: SymString<'ctx>, deps: ValueDeps) -> Self {
        Self {
            term: SymTerm::Bytes(term),
            deps,
        }
    }

    pub fn literal_u64(ctx: &'ctx Context, value: u64) -> Self {
        Self::uint(BV::from_u64(ctx, value, 64), ValueDeps::default())
    }

    /// The literal value, when the term is a bit-vector numeral.
    pub fn as_literal_u64(&self) -> Option<u64> {
        match &self.term {
            SymTerm::Uint(bv) => bv.as_u64(),
            SymTerm::Bytes(_) => None,
        }
    }

    /// Render the underlying term, used for recording account identities.
    pub fn render(&self) -> String {
        match &self.term {
            SymTerm::Uint(bv) => bv.to_string(),
            SymTerm::Bytes(s) => s.to_string(),
        }
    }
}

/// Which interesting opcodes have executed along this path, plus the group
/// transaction indices the path referenced and the accounts passed to the
/// local-state opcodes. Monotonically additive; entries are never cleared.
#[derive(Debug, Clone, Default)]
pub struct OpcodeRecord {
    pub itxn_submit: bool,
    pub app_global_put: bool,
    pub app_local_put: bool,
    pub app_local_get: bool,
    pub timestamp: bool,
    pub gtxn_indices: BTreeSet<TxnIndex>,
    pub local_users: BTreeSet<String>,
}

/// The accumulated path constraints and the typed index of which transaction
/// fields they mention.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet<'ctx> {
    terms: Vec<Bool<'ctx>>,
    index: BTreeMap<(TxnField, TxnIndex), SmallVec<[u32; 4]>>,
    group_size_terms: SmallVec<[u32; 4]>,
}

impl<'ctx> ConstraintSet<'ctx> {
    /// Append `cond` and index the fields it depends on. Returns whether the
    /// condition carried a hash-derived operand.
    pub fn assume(&mut self, cond: Bool<'ctx>, deps: &ValueDeps) -> bool {
        let id = self.terms.len() as u32;
        self.terms.push(cond);
        for key in &deps.txn {
            self.index.entry(*key).or_default().push(id);
        }
        if deps.group_size {
            self.group_size_terms.push(id);
        }
        deps.hash
    }

    /// Whether any path constraint mentions `field` at `index`.
    pub fn is_constrained(&self, field: TxnField, index: TxnIndex) -> bool {
        self.index.contains_key(&(field, index))
    }

    /// Whether any path constraint mentions the group size.
    pub fn constrains_group_size(&self) -> bool {
        !self.group_size_terms.is_empty()
    }

    pub fn terms(&self) -> &[Bool<'ctx>] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// The symbolic state of one path through the program.
#[derive(Debug, Clone)]
pub struct Configuration<'ctx> {
    pub ctx: &'ctx Context,
    pub stack: Vec<SymValue<'ctx>>,

    // Two views of the same 256-slot scratch memory, disambiguated by the
    // reading opcode. Slots default to uint64 zero / the empty string.
    pub scratch_uint: Array<'ctx>,
    pub scratch_bytes: Array<'ctx>,
    scratch_kinds: BTreeMap<u64, ScratchKind>,

    pub global_state_uint: Array<'ctx>,
    pub global_state_bytes: Array<'ctx>,
    pub local_state_uint: Array<'ctx>,
    pub local_state_bytes: Array<'ctx>,

    pub opcode_record: OpcodeRecord,
    pub constraints: ConstraintSet<'ctx>,

    pub symbolic_hash_variable_used: bool,
    pub symbolic_inner_txn_fee: bool,
    pub app_area: bool,

    pub pc: usize,
    pub call_stack: SmallVec<[usize; 4]>,

    pub intc: Vec<u64>,
    pub bytec: Vec<String>,

    pub executed_blocks: u32,
    fresh: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScratchKind {
    Uint,
    Bytes,
}

impl<'ctx> Configuration<'ctx> {
    /// The entry configuration: empty stack, zero-initialized scratch, fresh
    /// state arrays, no constraints.
    pub fn new(ctx: &'ctx Context) -> Self {
        let bv64 = Sort::bitvector(ctx, 64);
        let string = Sort::string(ctx);

        let mut scratch_uint = Array::new_const(ctx, "scratch_space_uint", &bv64, &bv64);
        let mut scratch_bytes = Array::new_const(ctx, "scratch_space_bytes", &bv64, &string);
        let zero = BV::from_u64(ctx, 0, 64);
        let empty = crate::fields::bytes_val(ctx, "");
        for slot in 0..256u64 {
            let key = BV::from_u64(ctx, slot, 64);
            scratch_uint = scratch_uint.store(&key, &zero);
            scratch_bytes = scratch_bytes.store(&key, &empty);
        }

        Self {
            ctx,
            stack: Vec::new(),
            scratch_uint,
            scratch_bytes,
            scratch_kinds: BTreeMap::new(),
            global_state_uint: Array::new_const(ctx, "global_state_uint", &string, &bv64),
            global_state_bytes: Array::new_const(ctx, "global_state_bytes", &string, &string),
            local_state_uint: Array::new_const(ctx, "local_state_uint", &string, &bv64),
            local_state_bytes: Array::new_const(ctx, "local_state_bytes", &string, &string),
            opcode_record: OpcodeRecord::default(),
            constraints: ConstraintSet::default(),
            symbolic_hash_variable_used: false,
            symbolic_inner_txn_fee: false,
            app_area: false,
            pc: 0,
            call_stack: SmallVec::new(),
            intc: Vec::new(),
            bytec: Vec::new(),
            executed_blocks: 0,
            fresh: 0,
        }
    }

    /// Preload a known on-chain global-state value.
    pub fn preload_global_uint(&mut self, key: &str, value: u64) {
        let key = crate::fields::bytes_val(self.ctx, key);
        self.global_state_uint = self
            .global_state_uint
            .store(&key, &BV::from_u64(self.ctx, value, 64));
    }

    /// Preload a known on-chain global-state byte value.
    pub fn preload_global_bytes(&mut self, key: &str, value: &str) {
        let key = crate::fields::bytes_val(self.ctx, key);
        self.global_state_bytes = self
            .global_state_bytes
            .store(&key, &crate::fields::bytes_val(self.ctx, value));
    }

    /// Append a path constraint, updating the constraint index and the hash
    /// flag when a hash-derived value is consumed.
    pub fn assume(&mut self, cond: Bool<'ctx>, deps: &ValueDeps) {
        if self.constraints.assume(cond, deps) {
            self.symbolic_hash_variable_used = true;
        }
    }

    pub fn push(&mut self, value: SymValue<'ctx>) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<SymValue<'ctx>> {
        self.stack.pop()
    }

    /// A fresh uninterpreted 64-bit constant, unique along this path.
    pub fn fresh_uint(&mut self, tag: &str) -> BV<'ctx> {
        let n = self.next_fresh();
        BV::new_const(self.ctx, format!("{tag}!{n}"), 64)
    }

    /// A fresh uninterpreted string constant, unique along this path.
    pub fn fresh_bytes(&mut self, tag: &str) -> SymString<'ctx> {
        let n = self.next_fresh();
        SymString::new_const(self.ctx, format!("{tag}!{n}"))
    }

    fn next_fresh(&mut self) -> u32 {
        let n = self.fresh;
        self.fresh += 1;
        n
    }

    /// Write `value` to scratch slot `slot`, updating the view the next read
    /// of that slot resolves to.
    pub fn scratch_store(&mut self, slot: u64, value: &SymValue<'ctx>) {
        let key = BV::from_u64(self.ctx, slot, 64);
        match &value.term {
            SymTerm::Uint(bv) => {
                self.scratch_uint = self.scratch_uint.store(&key, bv);
                self.scratch_kinds.insert(slot, ScratchKind::Uint);
            }
            SymTerm::Bytes(s) => {
                self.scratch_bytes = self.scratch_bytes.store(&key, s);
                self.scratch_kinds.insert(slot, ScratchKind::Bytes);
            }
        }
    }

    /// Read scratch slot `slot` through the view of its last write; a slot
    /// never written reads as uint64 zero.
    pub fn scratch_load(&mut self, slot: u64) -> SymValue<'ctx> {
        let key = BV::from_u64(self.ctx, slot, 64);
        match self.scratch_kinds.get(&slot).copied() {
            Some(ScratchKind::Bytes) => {
                let term = self
                    .scratch_bytes
                    .select(&key)
                    .as_string()
                    .expect("scratch byte view has string range");
                SymValue::bytes(term, ValueDeps::default())
            }
            _ => {
                let term = self
                    .scratch_uint
                    .select(&key)
                    .as_bv()
                    .expect("scratch uint view has bitvector range");
                SymValue::uint(term, ValueDeps::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use z3::ast::Ast;
    use z3::{Config, SatResult, Solver};

    fn ctx() -> Context {
        Context::new(&Config::new())
    }

    #[test]
    fn scratch_defaults_to_zero() {
        let ctx = ctx();
        let mut config = Configuration::new(&ctx);
        let value = config.scratch_load(17);
        let solver = Solver::new(&ctx);
        match value.term {
            SymTerm::Uint(bv) => {
                solver.assert(&bv._eq(&BV::from_u64(&ctx, 0, 64)).not());
                assert_eq!(solver.check(), SatResult::Unsat);
            }
            SymTerm::Bytes(_) => panic!("expected uint view"),
        }
    }

    #[test]
    fn scratch_reads_follow_last_write_kind() {
        let ctx = ctx();
        let mut config = Configuration::new(&ctx);
        let bytes = SymValue::bytes(fields::bytes_val(&ctx, "abc"), ValueDeps::default());
        config.scratch_store(3, &bytes);
        assert!(matches!(config.scratch_load(3).term, SymTerm::Bytes(_)));
        let uint = SymValue::literal_u64(&ctx, 9);
        config.scratch_store(3, &uint);
        assert!(matches!(config.scratch_load(3).term, SymTerm::Uint(_)));
    }

    #[test]
    fn constraint_index_tracks_fields() {
        let ctx = ctx();
        let mut config = Configuration::new(&ctx);
        let gi = fields::group_index(&ctx);
        let fee = fields::gtxn_uint(&ctx, TxnField::Fee, &gi);
        let cond = fee._eq(&BV::from_u64(&ctx, 1000, 64));
        config.assume(cond, &ValueDeps::txn_field(TxnField::Fee, TxnIndex::Group));
        assert!(config
            .constraints
            .is_constrained(TxnField::Fee, TxnIndex::Group));
        assert!(!config
            .constraints
            .is_constrained(TxnField::Fee, TxnIndex::Literal(0)));
        assert!(!config
            .constraints
            .is_constrained(TxnField::Sender, TxnIndex::Group));
    }

    #[test]
    fn hash_dep_flips_flag_when_consumed() {
        let ctx = ctx();
        let mut config = Configuration::new(&ctx);
        assert!(!config.symbolic_hash_variable_used);
        let cond = Bool::from_bool(&ctx, true);
        config.assume(cond, &ValueDeps::hashed());
        assert!(config.symbolic_hash_variable_used);
    }

    #[test]
    fn fork_is_independent() {
        let ctx = ctx();
        let mut config = Configuration::new(&ctx);
        config.push(SymValue::literal_u64(&ctx, 1));
        let mut fork = config.clone();
        fork.push(SymValue::literal_u64(&ctx, 2));
        fork.opcode_record.gtxn_indices.insert(TxnIndex::Literal(5));
        fork.assume(Bool::from_bool(&ctx, true), &ValueDeps::default());
        assert_eq!(config.stack.len(), 1);
        assert!(config.opcode_record.gtxn_indices.is_empty());
        assert!(config.constraints.is_empty());
        assert_eq!(fork.stack.len(), 2);
        assert_eq!(fork.constraints.len(), 1);
    }

    #[test]
    fn opcode_record_is_additive() {
        let ctx = ctx();
        let mut config = Configuration::new(&ctx);
        config.opcode_record.gtxn_indices.insert(TxnIndex::Literal(1));
        config.opcode_record.gtxn_indices.insert(TxnIndex::Literal(1));
        assert_eq!(config.opcode_record.gtxn_indices.len(), 1);
    }
}
