//! Detectors for logic signatures.
//!
//! These share a three-stage shape. First, if the program already constrains
//! the guarded field on its own transaction, there is nothing to report.
//! Second, inside an inlined application body a checked sender means the
//! application authorized the spend. Third, if some group transaction was
//! never inspected at all the finding is immediate; otherwise each referenced
//! index is probed for an unconstrained field on a transaction the signature
//! would sign.

use super::{Finding, Vulnerability};
use crate::context::AnalysisContext;
use crate::fields::{self, TxnField, TxnIndex};
use crate::state::Configuration;
use log::debug;
use z3::ast::{Ast, Bool, BV};

/// Minimum fee of a single transaction, in microalgos.
const MIN_TXN_FEE: u64 = 1000;

/// Spend amounts above this cap (100k algos) are treated as economically
/// implausible rather than reportable.
const SPEND_CAP: u64 = 100_000 * 1_000_000;

pub fn inspect<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Vec<Finding> {
    [
        unchecked_transaction_fee(actx, config),
        unchecked_rekey_to(actx, config),
        unchecked_close_remainder_to(actx, config),
        unchecked_asset_close_to(actx, config),
        arbitrary_spend(actx, config),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Stage two: an inlined application that pins the sender at its call index
/// has authorized the transaction.
fn app_authorizes_sender(actx: &AnalysisContext<'_>, config: &Configuration<'_>) -> bool {
    config.app_area
        && config
            .constraints
            .is_constrained(TxnField::Sender, actx.app_txn_index())
}

/// Stage three, first half: can the group hold a transaction the signature
/// never looked at?
fn some_txn_uninspected(actx: &AnalysisContext<'_>, config: &Configuration<'_>) -> bool {
    let ctx = actx.z3;
    let referenced = config.opcode_record.gtxn_indices.len() as u64;
    let cond = BV::from_u64(ctx, referenced, 64).bvult(&fields::group_size(ctx));
    actx.solver.is_sat(config.constraints.terms(), &[cond])
}

fn referenced(config: &Configuration<'_>) -> Vec<TxnIndex> {
    config.opcode_record.gtxn_indices.iter().copied().collect()
}

fn lsig_sender<'ctx>(
    actx: &AnalysisContext<'ctx>,
    field: TxnField,
    at: &BV<'ctx>,
) -> Bool<'ctx> {
    fields::gtxn_bytes(actx.z3, field, at)._eq(&fields::bytes_val(actx.z3, &actx.lsig_address))
}

pub fn unchecked_transaction_fee<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    if config
        .constraints
        .is_constrained(TxnField::Fee, TxnIndex::Group)
    {
        return None;
    }
    if app_authorizes_sender(actx, config) {
        return None;
    }
    if some_txn_uninspected(actx, config) {
        return Some(
            Finding::new(Vulnerability::UncheckedTransactionFee).involving(referenced(config)),
        );
    }

    let ctx = actx.z3;
    for index in referenced(config) {
        if config.constraints.is_constrained(TxnField::Fee, index) {
            continue;
        }
        let at = index.to_bv(ctx);
        let query = [
            lsig_sender(actx, TxnField::Sender, &at),
            fields::group_index(ctx)._eq(&at),
        ];
        if actx.solver.is_sat(config.constraints.terms(), &query) {
            debug!("unchecked transaction fee at index {index}");
            return Some(Finding::new(Vulnerability::UncheckedTransactionFee).at(index));
        }
    }
    None
}

pub fn unchecked_rekey_to<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    // Rekeying does not exist before TEAL v2.
    if actx.version <= 1 {
        return None;
    }
    if config
        .constraints
        .is_constrained(TxnField::RekeyTo, TxnIndex::Group)
    {
        return None;
    }

    let ctx = actx.z3;
    let gi = fields::group_index(ctx);
    // A rekey only matters when the funds do not already leave through a
    // close-out.
    let no_close = [
        fields::gtxn_bytes(ctx, TxnField::CloseRemainderTo, &gi)
            ._eq(&fields::zero_address(ctx)),
        fields::gtxn_bytes(ctx, TxnField::AssetCloseTo, &gi)._eq(&fields::zero_address(ctx)),
    ];
    if !actx.solver.is_sat(config.constraints.terms(), &no_close) {
        return None;
    }
    if app_authorizes_sender(actx, config) {
        return None;
    }
    if some_txn_uninspected(actx, config) {
        return Some(Finding::new(Vulnerability::UncheckedRekeyTo).involving(referenced(config)));
    }

    for index in referenced(config) {
        if config.constraints.is_constrained(TxnField::RekeyTo, index) {
            continue;
        }
        let at = index.to_bv(ctx);
        let query = [
            lsig_sender(actx, TxnField::Sender, &at),
            fields::group_index(ctx)._eq(&at),
            fields::gtxn_bytes(ctx, TxnField::CloseRemainderTo, &at)
                ._eq(&fields::zero_address(ctx)),
            fields::gtxn_bytes(ctx, TxnField::AssetCloseTo, &at)._eq(&fields::zero_address(ctx)),
        ];
        if actx.solver.is_sat(config.constraints.terms(), &query) {
            debug!("unchecked RekeyTo at index {index}");
            return Some(Finding::new(Vulnerability::UncheckedRekeyTo).at(index));
        }
    }
    None
}

pub fn unchecked_close_remainder_to<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    if config
        .constraints
        .is_constrained(TxnField::CloseRemainderTo, TxnIndex::Group)
    {
        return None;
    }
    let ctx = actx.z3;
    let gi = fields::group_index(ctx);
    if !actx
        .solver
        .is_sat(config.constraints.terms(), &[fields::is_pay(ctx, &gi)])
    {
        return None;
    }
    if app_authorizes_sender(actx, config) {
        return None;
    }
    if some_txn_uninspected(actx, config) {
        return Some(
            Finding::new(Vulnerability::UncheckedCloseRemainderTo).involving(referenced(config)),
        );
    }

    for index in referenced(config) {
        let at = index.to_bv(ctx);
        if !actx
            .solver
            .is_sat(config.constraints.terms(), &[fields::is_pay(ctx, &at)])
        {
            continue;
        }
        if config
            .constraints
            .is_constrained(TxnField::CloseRemainderTo, index)
        {
            continue;
        }
        let query = [
            fields::is_pay(ctx, &at),
            lsig_sender(actx, TxnField::Sender, &at),
            fields::group_index(ctx)._eq(&at),
        ];
        if actx.solver.is_sat(config.constraints.terms(), &query) {
            debug!("unchecked CloseRemainderTo at index {index}");
            return Some(Finding::new(Vulnerability::UncheckedCloseRemainderTo).at(index));
        }
    }
    None
}

pub fn unchecked_asset_close_to<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    if config
        .constraints
        .is_constrained(TxnField::AssetCloseTo, TxnIndex::Group)
    {
        return None;
    }
    let ctx = actx.z3;
    let gi = fields::group_index(ctx);
    if !actx
        .solver
        .is_sat(config.constraints.terms(), &[fields::is_axfer(ctx, &gi)])
    {
        return None;
    }
    if app_authorizes_sender(actx, config) {
        return None;
    }
    if some_txn_uninspected(actx, config) {
        return Some(
            Finding::new(Vulnerability::UncheckedAssetCloseTo).involving(referenced(config)),
        );
    }

    for index in referenced(config) {
        let at = index.to_bv(ctx);
        if !actx
            .solver
            .is_sat(config.constraints.terms(), &[fields::is_axfer(ctx, &at)])
        {
            continue;
        }
        if config
            .constraints
            .is_constrained(TxnField::AssetCloseTo, index)
        {
            continue;
        }
        // The zero sender excludes the asset-accept and clawback forms, where
        // the signature's account is not the one losing funds.
        let query = [
            fields::is_axfer(ctx, &at),
            lsig_sender(actx, TxnField::AssetSender, &at),
            fields::group_index(ctx)._eq(&at),
            fields::gtxn_bytes(ctx, TxnField::Sender, &at)._eq(&fields::zero_address(ctx)),
        ];
        if actx.solver.is_sat(config.constraints.terms(), &query) {
            debug!("unchecked AssetCloseTo at index {index}");
            return Some(Finding::new(Vulnerability::UncheckedAssetCloseTo).at(index));
        }
    }
    None
}

/// The signature signs as both sender and asset sender while paying an
/// ordinary fee, with nothing in the group capping what it spends.
pub fn arbitrary_spend<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    if config.opcode_record.app_local_get {
        return None;
    }
    if app_authorizes_sender(actx, config) {
        return None;
    }

    let ctx = actx.z3;
    let gi = fields::group_index(ctx);
    let indices = referenced(config);

    if indices.is_empty() {
        let query = [
            lsig_sender(actx, TxnField::Sender, &gi),
            lsig_sender(actx, TxnField::AssetSender, &gi),
            fields::gtxn_uint(ctx, TxnField::Fee, &gi)
                .bvuge(&BV::from_u64(ctx, MIN_TXN_FEE, 64)),
        ];
        if actx.solver.is_sat(config.constraints.terms(), &query) {
            debug!("arbitrary spend on the signature's own transaction");
            return Some(Finding::new(Vulnerability::ArbitrarySpend).at(TxnIndex::Group));
        }
    }

    let over_cap = fields::gtxn_uint(ctx, TxnField::Amount, &gi)
        .bvugt(&BV::from_u64(ctx, SPEND_CAP, 64));
    if actx.solver.is_sat(config.constraints.terms(), &[over_cap]) {
        return None;
    }
    for index in &indices {
        let at = index.to_bv(ctx);
        let over_cap = fields::gtxn_uint(ctx, TxnField::Amount, &at)
            .bvugt(&BV::from_u64(ctx, SPEND_CAP, 64));
        if actx.solver.is_sat(config.constraints.terms(), &[over_cap]) {
            return None;
        }
    }

    let group_fee = indices.len() as u64 * MIN_TXN_FEE;
    for index in indices {
        let at = index.to_bv(ctx);
        let query = [
            lsig_sender(actx, TxnField::Sender, &at),
            lsig_sender(actx, TxnField::AssetSender, &at),
            fields::gtxn_uint(ctx, TxnField::Fee, &at).bvuge(&BV::from_u64(ctx, group_fee, 64)),
        ];
        if actx.solver.is_sat(config.constraints.terms(), &query)
            && !config.constraints.is_constrained(TxnField::Sender, index)
        {
            debug!("arbitrary spend at index {index}");
            return Some(Finding::new(Vulnerability::ArbitrarySpend).at(index));
        }
    }
    None
}
