//! The named symbolic-variable namespace shared by the executor and the
//! detectors: transaction fields, the per-group-transaction arrays, and the
//! distinguished `GroupIndex` / `global_GroupSize` variables.
//!
//! Z3 constants are identified by name and sort, so the accessors here build
//! terms on demand; two calls with the same field yield the same term.

use std::fmt;
use z3::ast::{Array, Ast, Bool, String as SymString, BV};
use z3::{Context, Sort};

/// The canonical textual rendering of the all-zero Algorand address.
pub const ZERO_ADDRESS: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ";

/// Transaction fields tracked precisely by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxnField {
    Sender,
    Fee,
    Receiver,
    Amount,
    CloseRemainderTo,
    RekeyTo,
    Type,
    TypeEnum,
    XferAsset,
    AssetAmount,
    AssetSender,
    AssetReceiver,
    AssetCloseTo,
    ApplicationID,
    OnCompletion,
}

impl TxnField {
    /// Parse an assembly field name.
    pub fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "Sender" => Self::Sender,
            "Fee" => Self::Fee,
            "Receiver" => Self::Receiver,
            "Amount" => Self::Amount,
            "CloseRemainderTo" => Self::CloseRemainderTo,
            "RekeyTo" => Self::RekeyTo,
            "Type" => Self::Type,
            "TypeEnum" => Self::TypeEnum,
            "XferAsset" => Self::XferAsset,
            "AssetAmount" => Self::AssetAmount,
            "AssetSender" => Self::AssetSender,
            "AssetReceiver" => Self::AssetReceiver,
            "AssetCloseTo" => Self::AssetCloseTo,
            "ApplicationID" => Self::ApplicationID,
            "OnCompletion" => Self::OnCompletion,
            _ => return None,
        };
        Some(field)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sender => "Sender",
            Self::Fee => "Fee",
            Self::Receiver => "Receiver",
            Self::Amount => "Amount",
            Self::CloseRemainderTo => "CloseRemainderTo",
            Self::RekeyTo => "RekeyTo",
            Self::Type => "Type",
            Self::TypeEnum => "TypeEnum",
            Self::XferAsset => "XferAsset",
            Self::AssetAmount => "AssetAmount",
            Self::AssetSender => "AssetSender",
            Self::AssetReceiver => "AssetReceiver",
            Self::AssetCloseTo => "AssetCloseTo",
            Self::ApplicationID => "ApplicationID",
            Self::OnCompletion => "OnCompletion",
        }
    }

    /// Whether the field's value is a byte string rather than a uint64.
    pub fn is_bytes(self) -> bool {
        matches!(
            self,
            Self::Sender
                | Self::Receiver
                | Self::CloseRemainderTo
                | Self::RekeyTo
                | Self::Type
                | Self::AssetSender
                | Self::AssetReceiver
                | Self::AssetCloseTo
        )
    }
}

impl fmt::Display for TxnField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A group-transaction position: either the program's own (symbolic)
/// `GroupIndex` or a literal position named by a `gtxn` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxnIndex {
    Group,
    Literal(u64),
}

impl TxnIndex {
    pub fn to_bv<'ctx>(self, ctx: &'ctx Context) -> BV<'ctx> {
        match self {
            Self::Group => group_index(ctx),
            Self::Literal(n) => BV::from_u64(ctx, n, 64),
        }
    }
}

impl fmt::Display for TxnIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Group => f.write_str("GroupIndex"),
            Self::Literal(n) => write!(f, "{n}"),
        }
    }
}

/// The symbolic index of the transaction under analysis.
pub fn group_index(ctx: &Context) -> BV<'_> {
    BV::new_const(ctx, "GroupIndex", 64)
}

/// The symbolic size of the transaction group.
pub fn group_size(ctx: &Context) -> BV<'_> {
    BV::new_const(ctx, "global_GroupSize", 64)
}

/// The uint64-valued array for `field`, named `gtxn_<field>`.
pub fn gtxn_uint_array<'ctx>(ctx: &'ctx Context, field: TxnField) -> Array<'ctx> {
    debug_assert!(!field.is_bytes());
    Array::new_const(
        ctx,
        format!("gtxn_{}", field.name()),
        &Sort::bitvector(ctx, 64),
        &Sort::bitvector(ctx, 64),
    )
}

/// The string-valued array for `field`, named `gtxn_<field>`.
pub fn gtxn_bytes_array<'ctx>(ctx: &'ctx Context, field: TxnField) -> Array<'ctx> {
    debug_assert!(field.is_bytes());
    Array::new_const(
        ctx,
        format!("gtxn_{}", field.name()),
        &Sort::bitvector(ctx, 64),
        &Sort::string(ctx),
    )
}

/// `gtxn_<field>[index]` for a uint64 field.
pub fn gtxn_uint<'ctx>(ctx: &'ctx Context, field: TxnField, index: &BV<'ctx>) -> BV<'ctx> {
    gtxn_uint_array(ctx, field)
        .select(index)
        .as_bv()
        .expect("uint64 transaction field array has bitvector range")
}

/// `gtxn_<field>[index]` for a byte-string field.
pub fn gtxn_bytes<'ctx>(ctx: &'ctx Context, field: TxnField, index: &BV<'ctx>) -> SymString<'ctx> {
    gtxn_bytes_array(ctx, field)
        .select(index)
        .as_string()
        .expect("byte transaction field array has string range")
}

/// A string literal term.
pub fn bytes_val<'ctx>(ctx: &'ctx Context, value: &str) -> SymString<'ctx> {
    SymString::from_str(ctx, value).expect("byte literal contains no interior NUL")
}

/// The zero-address literal term.
pub fn zero_address(ctx: &Context) -> SymString<'_> {
    bytes_val(ctx, ZERO_ADDRESS)
}

/// `gtxn_Type[index] == "pay" && gtxn_TypeEnum[index] == 1`.
pub fn is_pay<'ctx>(ctx: &'ctx Context, index: &BV<'ctx>) -> Bool<'ctx> {
    Bool::and(
        ctx,
        &[
            &gtxn_bytes(ctx, TxnField::Type, index)._eq(&bytes_val(ctx, "pay")),
            &gtxn_uint(ctx, TxnField::TypeEnum, index)._eq(&BV::from_u64(ctx, 1, 64)),
        ],
    )
}

/// `gtxn_Type[index] == "axfer" && gtxn_TypeEnum[index] == 4`.
pub fn is_axfer<'ctx>(ctx: &'ctx Context, index: &BV<'ctx>) -> Bool<'ctx> {
    Bool::and(
        ctx,
        &[
            &gtxn_bytes(ctx, TxnField::Type, index)._eq(&bytes_val(ctx, "axfer")),
            &gtxn_uint(ctx, TxnField::TypeEnum, index)._eq(&BV::from_u64(ctx, 4, 64)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::{Config, Context};

    #[test]
    fn field_parsing_round_trips() {
        for name in ["Sender", "Fee", "OnCompletion", "AssetCloseTo"] {
            assert_eq!(TxnField::parse(name).unwrap().name(), name);
        }
        assert!(TxnField::parse("NumAppArgs").is_none());
    }

    #[test]
    fn same_field_yields_identical_terms() {
        let ctx = Context::new(&Config::new());
        let i = TxnIndex::Group.to_bv(&ctx);
        let a = gtxn_uint(&ctx, TxnField::Fee, &i);
        let b = gtxn_uint(&ctx, TxnField::Fee, &i);
        assert_eq!(a, b);
    }

    #[test]
    fn index_display() {
        assert_eq!(TxnIndex::Group.to_string(), "GroupIndex");
        assert_eq!(TxnIndex::Literal(3).to_string(), "3");
    }
}
