//! Detectors for smart contracts (application mode).

use super::{Finding, Vulnerability};
use crate::context::AnalysisContext;
use crate::fields::{self, TxnField, TxnIndex};
use crate::state::Configuration;
use log::debug;
use z3::ast::{Ast, Bool, BV};

// OnCompletion actions.
const NO_OP: u64 = 0;
const OPT_IN: u64 = 1;
const CLOSE_OUT: u64 = 2;
const UPDATE_APPLICATION: u64 = 4;
const DELETE_APPLICATION: u64 = 5;

/// The protocol caps groups at 16 transactions; a group of 17 being
/// consistent with the path proves the contract never inspected the size.
const IMPOSSIBLE_GROUP_SIZE: u64 = 17;

pub fn inspect<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Vec<Finding> {
    [
        arbitrary_update(actx, config),
        arbitrary_delete(actx, config),
        unchecked_group_size(actx, config),
        force_clear_state(actx, config),
        unchecked_payment_receiver(actx, config),
        unchecked_asset_receiver(actx, config),
        timestamp_dependency(actx, config),
        symbolic_inner_txn_fee(actx, config),
        check_optin(actx, config),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// `gtxn_ApplicationID[GroupIndex] != 0`: the transaction really is an
/// application call rather than a create.
fn is_app_call<'ctx>(actx: &AnalysisContext<'ctx>) -> Bool<'ctx> {
    let ctx = actx.z3;
    let gi = fields::group_index(ctx);
    fields::gtxn_uint(ctx, TxnField::ApplicationID, &gi)
        ._eq(&BV::from_u64(ctx, 0, 64))
        .not()
}

fn on_completion_is<'ctx>(actx: &AnalysisContext<'ctx>, action: u64) -> Bool<'ctx> {
    let ctx = actx.z3;
    let gi = fields::group_index(ctx);
    fields::gtxn_uint(ctx, TxnField::OnCompletion, &gi)._eq(&BV::from_u64(ctx, action, 64))
}

fn sender_unconstrained(config: &Configuration<'_>) -> bool {
    !config
        .constraints
        .is_constrained(TxnField::Sender, TxnIndex::Group)
}

pub fn arbitrary_update<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    if config.opcode_record.app_local_get {
        return None;
    }
    let query = [on_completion_is(actx, UPDATE_APPLICATION), is_app_call(actx)];
    if actx.solver.is_sat(config.constraints.terms(), &query) && sender_unconstrained(config) {
        Some(Finding::new(Vulnerability::ArbitraryUpdate).at(TxnIndex::Group))
    } else {
        None
    }
}

pub fn arbitrary_delete<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    if config.opcode_record.app_local_get {
        return None;
    }
    let query = [on_completion_is(actx, DELETE_APPLICATION), is_app_call(actx)];
    if actx.solver.is_sat(config.constraints.terms(), &query) && sender_unconstrained(config) {
        Some(Finding::new(Vulnerability::ArbitraryDelete).at(TxnIndex::Group))
    } else {
        None
    }
}

/// An irreversible effect (inner transaction or state write) reached without
/// any bound on the group size.
pub fn unchecked_group_size<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    let record = &config.opcode_record;
    if !(record.itxn_submit || record.app_global_put || record.app_local_put) {
        return None;
    }
    let ctx = actx.z3;
    let query = [
        fields::group_size(ctx)._eq(&BV::from_u64(ctx, IMPOSSIBLE_GROUP_SIZE, 64)),
        is_app_call(actx),
        on_completion_is(actx, NO_OP),
    ];
    if actx.solver.is_sat(config.constraints.terms(), &query) {
        Some(Finding::new(Vulnerability::UncheckedGroupSize))
    } else {
        None
    }
}

/// State was written for an account other than the sender, and that account
/// can clear its local state to revert the contract's bookkeeping.
pub fn force_clear_state<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    let record = &config.opcode_record;
    if !(record.itxn_submit || record.app_global_put || record.app_local_put) {
        return None;
    }
    let ctx = actx.z3;
    let gi = fields::group_index(ctx);
    let own_sender = fields::gtxn_bytes(ctx, TxnField::Sender, &gi).to_string();
    let zero_account = BV::from_u64(ctx, 0, 64).to_string();
    let zero_address = fields::zero_address(ctx).to_string();

    for local_user in &record.local_users {
        if *local_user == own_sender
            || *local_user == zero_account
            || *local_user == zero_address
        {
            continue;
        }
        let query = [
            is_app_call(actx),
            Bool::or(
                ctx,
                &[
                    &on_completion_is(actx, NO_OP),
                    &on_completion_is(actx, CLOSE_OUT),
                ],
            ),
        ];
        if actx.solver.is_sat(config.constraints.terms(), &query) {
            debug!("local state written for foreign account {local_user}");
            return Some(
                Finding::new(Vulnerability::ForceClearState).account(local_user.clone()),
            );
        }
    }
    None
}

/// A state write is conditioned on a payment whose amount is checked but
/// whose receiver is not.
pub fn unchecked_payment_receiver<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    let record = &config.opcode_record;
    if !(record.app_global_put || record.app_local_put) {
        return None;
    }
    let ctx = actx.z3;
    let group_shape = [
        fields::group_size(ctx).bvuge(&BV::from_u64(ctx, 2, 64)),
        is_app_call(actx),
    ];
    if !actx.solver.is_sat(config.constraints.terms(), &group_shape) {
        return None;
    }

    for &index in &record.gtxn_indices {
        let at = index.to_bv(ctx);
        if !actx
            .solver
            .is_sat(config.constraints.terms(), &[fields::is_pay(ctx, &at)])
        {
            continue;
        }
        if !config.constraints.is_constrained(TxnField::Amount, index) {
            continue;
        }
        if !config.constraints.is_constrained(TxnField::Receiver, index) {
            debug!("payment amount checked but receiver free at index {index}");
            return Some(
                Finding::new(Vulnerability::UncheckedPaymentReceiver)
                    .at(index)
                    .involving(record.gtxn_indices.iter().copied().filter(|i| *i != index)),
            );
        }
    }
    None
}

/// The asset-transfer analogue of the unchecked payment receiver.
pub fn unchecked_asset_receiver<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    let record = &config.opcode_record;
    if !(record.app_global_put || record.app_local_put) {
        return None;
    }
    let ctx = actx.z3;
    let group_shape = [
        fields::group_size(ctx).bvuge(&BV::from_u64(ctx, 2, 64)),
        is_app_call(actx),
    ];
    if !actx.solver.is_sat(config.constraints.terms(), &group_shape) {
        return None;
    }

    for &index in &record.gtxn_indices {
        let at = index.to_bv(ctx);
        if !actx
            .solver
            .is_sat(config.constraints.terms(), &[fields::is_axfer(ctx, &at)])
        {
            continue;
        }
        if !config.constraints.is_constrained(TxnField::AssetAmount, index)
            && !config.constraints.is_constrained(TxnField::XferAsset, index)
        {
            continue;
        }
        if !config
            .constraints
            .is_constrained(TxnField::AssetReceiver, index)
        {
            debug!("asset transfer checked but receiver free at index {index}");
            return Some(
                Finding::new(Vulnerability::UncheckedAssetReceiver)
                    .at(index)
                    .involving(record.gtxn_indices.iter().copied().filter(|i| *i != index)),
            );
        }
    }
    None
}

pub fn timestamp_dependency<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    if !config.opcode_record.timestamp {
        return None;
    }
    let query = [is_app_call(actx), on_completion_is(actx, NO_OP)];
    if actx.solver.is_sat(config.constraints.terms(), &query) {
        Some(Finding::new(Vulnerability::TimestampDependency))
    } else {
        None
    }
}

pub fn symbolic_inner_txn_fee<'ctx>(
    _actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    if config.symbolic_inner_txn_fee {
        Some(Finding::new(Vulnerability::SymbolicInnerTxnFee))
    } else {
        None
    }
}

/// Anyone can opt in, which costs the contract a local-state allocation per
/// account when the sender is never checked.
pub fn check_optin<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Option<Finding> {
    let query = [on_completion_is(actx, OPT_IN), is_app_call(actx)];
    if actx.solver.is_sat(config.constraints.terms(), &query) && sender_unconstrained(config) {
        Some(Finding::new(Vulnerability::UncheckedOptIn).at(TxnIndex::Group))
    } else {
        None
    }
}
