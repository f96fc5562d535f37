//! The vulnerability detection registry.
//!
//! Each detector is a predicate over a terminating configuration: a chain of
//! cheap syntactic filters over the opcode record and the constraint index,
//! followed by solver queries asking whether an adversarial transaction-group
//! shape is consistent with the reached state. All detectors share one guard:
//! a path that consumed a hash-derived value reports nothing, since hash
//! comparisons almost always are integrity checks the analysis cannot see
//! through.

pub mod application;
pub mod signature;

use crate::context::{AnalysisContext, AnalysisMode};
use crate::fields::TxnIndex;
use crate::state::Configuration;
use std::fmt;

/// The catalog of conditions the registry can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Vulnerability {
    ArbitraryUpdate,
    ArbitraryDelete,
    UncheckedGroupSize,
    ForceClearState,
    UncheckedPaymentReceiver,
    UncheckedAssetReceiver,
    TimestampDependency,
    SymbolicInnerTxnFee,
    UncheckedOptIn,
    UncheckedTransactionFee,
    UncheckedRekeyTo,
    UncheckedCloseRemainderTo,
    UncheckedAssetCloseTo,
    ArbitrarySpend,
}

impl Vulnerability {
    pub fn name(self) -> &'static str {
        match self {
            Self::ArbitraryUpdate => "arbitrary_update",
            Self::ArbitraryDelete => "arbitrary_delete",
            Self::UncheckedGroupSize => "unchecked_group_size",
            Self::ForceClearState => "force_clear_state",
            Self::UncheckedPaymentReceiver => "unchecked_payment_receiver",
            Self::UncheckedAssetReceiver => "unchecked_asset_receiver",
            Self::TimestampDependency => "timestamp_dependency",
            Self::SymbolicInnerTxnFee => "symbolic_inner_txn_fee",
            Self::UncheckedOptIn => "unchecked_optin",
            Self::UncheckedTransactionFee => "unchecked_transaction_fee_in_lsig",
            Self::UncheckedRekeyTo => "unchecked_rekey_to_in_lsig",
            Self::UncheckedCloseRemainderTo => "unchecked_close_remainder_to_in_lsig",
            Self::UncheckedAssetCloseTo => "unchecked_asset_close_to_in_lsig",
            Self::ArbitrarySpend => "smart_signature_arbitrary_spend",
        }
    }
}

/// One reported vulnerability: the condition, the group-transaction indices
/// involved, and the offending account where one exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Finding {
    pub kind: Vulnerability,
    pub indices: Vec<TxnIndex>,
    pub address: Option<String>,
}

impl Finding {
    pub fn new(kind: Vulnerability) -> Self {
        Self {
            kind,
            indices: Vec::new(),
            address: None,
        }
    }

    pub fn at(mut self, index: TxnIndex) -> Self {
        self.indices.push(index);
        self
    }

    pub fn involving(mut self, indices: impl IntoIterator<Item = TxnIndex>) -> Self {
        self.indices.extend(indices);
        self
    }

    pub fn account(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind.name())?;
        if !self.indices.is_empty() {
            let rendered: Vec<String> = self.indices.iter().map(|i| i.to_string()).collect();
            write!(f, " (txn {})", rendered.join(", "))?;
        }
        if let Some(address) = &self.address {
            write!(f, " account {address}")?;
        }
        Ok(())
    }
}

/// Run the registry for the analysis mode over one terminal configuration.
pub fn inspect<'ctx>(
    actx: &AnalysisContext<'ctx>,
    config: &Configuration<'ctx>,
) -> Vec<Finding> {
    if config.symbolic_hash_variable_used {
        return Vec::new();
    }
    match actx.mode {
        AnalysisMode::Application => application::inspect(actx, config),
        AnalysisMode::Signature => signature::inspect(actx, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finding_rendering() {
        let finding = Finding::new(Vulnerability::UncheckedTransactionFee)
            .at(TxnIndex::Literal(1))
            .at(TxnIndex::Group);
        assert_eq!(
            finding.to_string(),
            "unchecked_transaction_fee_in_lsig (txn 1, GroupIndex)"
        );
        let finding = Finding::new(Vulnerability::ForceClearState).account("acct");
        assert_eq!(finding.to_string(), "force_clear_state account acct");
    }
}
