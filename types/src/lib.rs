//! Shared types for the blackwhite commit-reveal wagering contract.
//!
//! `execution` holds everything that crosses the ledger boundary (transactions, state keys and
//! values, emitted events); `blackwhite` holds the round state machine's persisted data.

pub mod blackwhite;
pub mod execution;

pub use execution::{
    transaction_namespace, AccountOp, Event, ExecAccount, Instruction, Key, Output, Transaction,
    Value, NAMESPACE,
};
