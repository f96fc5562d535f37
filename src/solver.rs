//! A thin façade over the Z3 solver.
//!
//! One solver instance serves the whole analysis. Every query pushes a fresh
//! scope, asserts the path constraints plus the caller's temporary
//! constraints, checks, and pops, so no query can pollute a later one. The
//! façade lives behind interior mutability so it can be shared by the
//! executor and the detectors while the rest of the context stays immutable.

use std::cell::RefCell;
use z3::ast::Bool;
use z3::{Context, SatResult, Solver};

pub struct Satisfier<'ctx> {
    inner: RefCell<Solver<'ctx>>,
}

impl<'ctx> Satisfier<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            inner: RefCell::new(Solver::new(ctx)),
        }
    }

    /// Check `path ∧ extra` in a fresh scope.
    pub fn satisfy(&self, path: &[Bool<'ctx>], extra: &[Bool<'ctx>]) -> SatResult {
        let solver = self.inner.borrow_mut();
        solver.push();
        for constraint in path.iter().chain(extra) {
            solver.assert(constraint);
        }
        let result = solver.check();
        solver.pop(1);
        result
    }

    /// Whether `path ∧ extra` is satisfiable. `unknown` counts as
    /// unsatisfiable, so a timed-out query suppresses a finding rather than
    /// inventing one.
    pub fn is_sat(&self, path: &[Bool<'ctx>], extra: &[Bool<'ctx>]) -> bool {
        self.satisfy(path, extra) == SatResult::Sat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::ast::{Ast, BV};
    use z3::Config;

    #[test]
    fn empty_query_is_sat() {
        let ctx = Context::new(&Config::new());
        let satisfier = Satisfier::new(&ctx);
        assert_eq!(satisfier.satisfy(&[], &[]), SatResult::Sat);
    }

    #[test]
    fn queries_do_not_leak_between_calls() {
        let ctx = Context::new(&Config::new());
        let satisfier = Satisfier::new(&ctx);
        let x = BV::new_const(&ctx, "x", 64);
        let is_zero = x._eq(&BV::from_u64(&ctx, 0, 64));
        let is_one = x._eq(&BV::from_u64(&ctx, 1, 64));

        assert!(satisfier.is_sat(&[], &[is_zero.clone()]));
        // If the previous scope leaked, x == 1 would now be unsat.
        assert!(satisfier.is_sat(&[], &[is_one]));
        assert!(!satisfier.is_sat(&[is_zero.clone()], &[is_zero.not()]));
    }

    #[test]
    fn path_constraints_participate() {
        let ctx = Context::new(&Config::new());
        let satisfier = Satisfier::new(&ctx);
        let x = BV::new_const(&ctx, "x", 64);
        let small = x.bvult(&BV::from_u64(&ctx, 10, 64));
        let large = x.bvugt(&BV::from_u64(&ctx, 20, 64));
        assert!(!satisfier.is_sat(&[small], &[large]));
    }
}
