//! Static opcode table for TEAL up to version 8.
//!
//! The table records, for every opcode the lexer may encounter, its assembly
//! arity (number of immediate parameters, `VARIADIC` for opcodes taking a
//! variable-length parameter list) and which execution modes accept it.

/// Arity marker for opcodes whose immediate parameter list has no fixed length.
pub const VARIADIC: i8 = -1;

/// Execution modes an opcode is legal in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Both,
    App,
    Sig,
}

/// `(arity, mode)` for `op`, or `None` for an unknown opcode.
fn info(op: &str) -> Option<(i8, Mode)> {
    use Mode::*;
    let entry = match op {
        // Flow control and subroutines.
        "err" | "return" | "retsub" | "assert" => (0, Both),
        "bnz" | "bz" | "b" | "callsub" => (1, Both),
        "switch" | "match" => (VARIADIC, Both),
        "proto" => (2, Both),
        "frame_dig" | "frame_bury" | "bury" | "popn" | "dupn" => (1, Both),

        // Cryptographic primitives.
        "sha256" | "keccak256" | "sha512_256" | "sha3_256" => (0, Both),
        "ed25519verify" | "ed25519verify_bare" => (0, Both),
        "ecdsa_verify" | "ecdsa_pk_decompress" | "ecdsa_pk_recover" | "vrf_verify" => (1, Both),

        // Arithmetic, comparison and logic.
        "+" | "-" | "/" | "*" | "%" | "<" | ">" | "<=" | ">=" | "&&" | "||" | "==" | "!=" | "!"
        | "|" | "&" | "^" | "~" | "shl" | "shr" | "sqrt" | "bitlen" | "exp" => (0, Both),
        "mulw" | "addw" | "expw" | "divmodw" | "divw" => (0, Both),

        // Byte-array math.
        "b+" | "b-" | "b/" | "b*" | "b%" | "b<" | "b>" | "b<=" | "b>=" | "b==" | "b!=" | "b|"
        | "b&" | "b^" | "b~" | "bsqrt" => (0, Both),
        "bzero" => (0, Both),

        // Byte-array manipulation.
        "len" | "itob" | "btoi" | "concat" | "substring3" | "getbit" | "setbit" | "getbyte"
        | "setbyte" | "extract3" | "extract_uint16" | "extract_uint32" | "extract_uint64"
        | "replace3" => (0, Both),
        "substring" | "extract" => (2, Both),
        "replace2" => (1, Both),
        "base64_decode" | "json_ref" => (1, Both),

        // Constants and pseudo-ops. Quoted byte literals may contain spaces,
        // so the byte-loading pseudo-ops are variadic at the token level.
        "intcblock" | "bytecblock" | "pushints" | "pushbytess" => (VARIADIC, Both),
        "intc" | "bytec" | "pushint" | "int" | "addr" => (1, Both),
        "byte" | "pushbytes" | "method" => (VARIADIC, Both),
        "intc_0" | "intc_1" | "intc_2" | "intc_3" => (0, Both),
        "bytec_0" | "bytec_1" | "bytec_2" | "bytec_3" => (0, Both),

        // Stack manipulation.
        "pop" | "dup" | "dup2" | "swap" | "select" => (0, Both),
        "dig" | "cover" | "uncover" => (1, Both),

        // Scratch space.
        "load" | "store" => (1, Both),
        "loads" | "stores" => (0, Both),

        // Transaction and global field access.
        "txn" | "gtxns" | "global" | "txnas" | "gtxnsas" => (1, Both),
        "txna" | "gtxn" | "gtxnsa" | "gtxnas" => (2, Both),
        "gtxna" => (3, Both),

        // Logic-signature arguments.
        "arg" => (1, Sig),
        "arg_0" | "arg_1" | "arg_2" | "arg_3" | "args" => (0, Sig),

        // Application state.
        "app_global_get" | "app_global_get_ex" | "app_global_put" | "app_global_del"
        | "app_local_get" | "app_local_get_ex" | "app_local_put" | "app_local_del"
        | "app_opted_in" | "balance" | "min_balance" | "log" => (0, App),
        "asset_holding_get" | "asset_params_get" | "app_params_get" | "acct_params_get"
        | "block" => (1, App),

        // Boxes.
        "box_create" | "box_extract" | "box_replace" | "box_del" | "box_len" | "box_get"
        | "box_put" => (0, App),

        // Inner transactions.
        "itxn_begin" | "itxn_next" | "itxn_submit" => (0, App),
        "itxn_field" | "itxn" | "itxnas" => (1, App),
        "itxna" | "gitxn" | "gitxnas" => (2, App),
        "gitxna" => (3, App),

        // Cross-program scratch and transaction ids.
        "gload" => (2, App),
        "gloads" | "gaid" => (1, App),
        "gloadss" | "gaids" => (0, App),

        _ => return None,
    };
    Some(entry)
}

/// The number of immediate parameters `op` takes, `VARIADIC` for opcodes with
/// a variable-length parameter list, or `None` for an unknown opcode.
pub fn params_number(op: &str) -> Option<i8> {
    info(op).map(|(arity, _)| arity)
}

/// Whether `op` is legal in application (smart contract) mode.
pub fn support_application_mode(op: &str) -> bool {
    matches!(info(op), Some((_, Mode::Both)) | Some((_, Mode::App)))
}

/// Whether `op` is legal in logic-signature mode.
pub fn support_signature_mode(op: &str) -> bool {
    matches!(info(op), Some((_, Mode::Both)) | Some((_, Mode::Sig)))
}

/// Whether `op` ends a basic block.
pub fn is_block_terminator(op: &str) -> bool {
    matches!(op, "bnz" | "bz" | "b" | "callsub" | "retsub")
}

/// Whether `op` is one of the branch instructions whose first parameter is a
/// label before resolution and an instruction address afterwards.
pub fn is_branch(op: &str) -> bool {
    matches!(op, "bnz" | "bz" | "b" | "callsub")
}

/// The numeric value of a named integer constant accepted by the `int`
/// pseudo-op, covering the on-completion actions and transaction types.
pub fn int_constant(name: &str) -> Option<u64> {
    let value = match name {
        "NoOp" | "unknown" => 0,
        "OptIn" | "pay" => 1,
        "CloseOut" | "keyreg" => 2,
        "ClearState" | "acfg" => 3,
        "UpdateApplication" | "axfer" => 4,
        "DeleteApplication" | "afrz" => 5,
        "appl" => 6,
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity() {
        assert_eq!(params_number("gtxn"), Some(2));
        assert_eq!(params_number("intcblock"), Some(VARIADIC));
        assert_eq!(params_number("+"), Some(0));
        assert_eq!(params_number("no_such_opcode"), None);
    }

    #[test]
    fn modes() {
        assert!(support_application_mode("app_global_put"));
        assert!(!support_signature_mode("app_global_put"));
        assert!(support_signature_mode("arg"));
        assert!(!support_application_mode("arg"));
        assert!(support_application_mode("txn") && support_signature_mode("txn"));
    }

    #[test]
    fn named_constants() {
        assert_eq!(int_constant("UpdateApplication"), Some(4));
        assert_eq!(int_constant("DeleteApplication"), Some(5));
        assert_eq!(int_constant("axfer"), Some(4));
        assert_eq!(int_constant("NoSuchName"), None);
    }

    #[test]
    fn terminators() {
        for op in ["bnz", "bz", "b", "callsub", "retsub"] {
            assert!(is_block_terminator(op));
        }
        assert!(!is_block_terminator("return"));
        assert!(is_branch("callsub") && !is_branch("retsub"));
    }
}
