//! Compensating rollback for multi-step ledger sequences.
//!
//! The ledger only offers single-account atomic calls, so an action that performs several of
//! them records each successful call in a [`Session`]. If a later step fails, [`Session::abort`]
//! replays the inverse of every recorded call, newest first. Receipts are gathered in a
//! [`Journal`] that the caller only sees when the whole action succeeds.

use blackwhite_types::execution::{Event, Key, Value};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};
use thiserror::Error as ThisError;
use tracing::{error, warn};

use crate::{
    ledger::{self, LedgerError, Receipt},
    state::State,
};

/// A ledger call that can be undone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCall {
    Freeze {
        owner: PublicKey,
        amount: u64,
    },
    Unfreeze {
        owner: PublicKey,
        amount: u64,
    },
    TransferFrozen {
        from: PublicKey,
        to: PublicKey,
        amount: u64,
    },
    Transfer {
        from: PublicKey,
        to: PublicKey,
        amount: u64,
    },
}

impl LedgerCall {
    /// Calls that restore the balances this call changed, in execution order.
    pub fn inverse(&self) -> Vec<LedgerCall> {
        match self {
            LedgerCall::Freeze { owner, amount } => vec![LedgerCall::Unfreeze {
                owner: owner.clone(),
                amount: *amount,
            }],
            LedgerCall::Unfreeze { owner, amount } => vec![LedgerCall::Freeze {
                owner: owner.clone(),
                amount: *amount,
            }],
            LedgerCall::TransferFrozen { from, to, amount } => vec![
                LedgerCall::Transfer {
                    from: to.clone(),
                    to: from.clone(),
                    amount: *amount,
                },
                LedgerCall::Freeze {
                    owner: from.clone(),
                    amount: *amount,
                },
            ],
            LedgerCall::Transfer { from, to, amount } => vec![LedgerCall::Transfer {
                from: to.clone(),
                to: from.clone(),
                amount: *amount,
            }],
        }
    }

    pub async fn execute<S: State>(
        &self,
        state: &mut S,
        contract: &Digest,
    ) -> Result<Receipt, LedgerError> {
        match self {
            LedgerCall::Freeze { owner, amount } => {
                ledger::freeze(state, owner, contract, *amount).await
            }
            LedgerCall::Unfreeze { owner, amount } => {
                ledger::unfreeze(state, owner, contract, *amount).await
            }
            LedgerCall::TransferFrozen { from, to, amount } => {
                ledger::transfer_frozen(state, from, to, contract, *amount).await
            }
            LedgerCall::Transfer { from, to, amount } => {
                ledger::transfer(state, from, to, contract, *amount).await
            }
        }
    }
}

/// Ordered key-value writes and audit events produced by one action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Journal {
    pub kv: Vec<(Key, Value)>,
    pub events: Vec<Event>,
}

impl Journal {
    pub fn absorb(&mut self, receipt: Receipt) {
        self.kv.extend(receipt.kv);
        self.events.extend(receipt.logs);
    }

    pub fn record(&mut self, key: Key, value: Value) {
        self.kv.push((key, value));
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

/// Failure of an inverse call while unwinding.
#[derive(Debug, ThisError)]
#[error("undo of {call:?} failed after {undone} calls were undone: {source}")]
pub struct RollbackError {
    /// Number of forward calls already undone.
    pub undone: usize,
    pub call: LedgerCall,
    pub source: LedgerError,
}

/// Ledger access for a single action: an undo stack plus the pending journal.
pub struct Session<'a, S: State> {
    state: &'a mut S,
    contract: Digest,
    undo: Vec<LedgerCall>,
    journal: Journal,
}

impl<'a, S: State> Session<'a, S> {
    pub fn new(state: &'a mut S, contract: Digest) -> Self {
        Self {
            state,
            contract,
            undo: Vec::new(),
            journal: Journal::default(),
        }
    }

    pub fn state(&mut self) -> &mut S {
        &mut *self.state
    }

    pub fn journal(&mut self) -> &mut Journal {
        &mut self.journal
    }

    /// Number of forward calls that would be undone by [`Session::abort`].
    pub fn depth(&self) -> usize {
        self.undo.len()
    }

    async fn call(&mut self, call: LedgerCall) -> Result<(), LedgerError> {
        let receipt = call.execute(&mut *self.state, &self.contract).await?;
        self.journal.absorb(receipt);
        self.undo.push(call);
        Ok(())
    }

    pub async fn freeze(&mut self, owner: &PublicKey, amount: u64) -> Result<(), LedgerError> {
        self.call(LedgerCall::Freeze {
            owner: owner.clone(),
            amount,
        })
        .await
    }

    pub async fn unfreeze(&mut self, owner: &PublicKey, amount: u64) -> Result<(), LedgerError> {
        self.call(LedgerCall::Unfreeze {
            owner: owner.clone(),
            amount,
        })
        .await
    }

    pub async fn transfer_frozen(
        &mut self,
        from: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.call(LedgerCall::TransferFrozen {
            from: from.clone(),
            to: to.clone(),
            amount,
        })
        .await
    }

    pub async fn transfer(
        &mut self,
        from: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.call(LedgerCall::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        })
        .await
    }

    /// Undoes every recorded call, newest first, and drops the journal.
    ///
    /// Stops at the first inverse that fails; the calls below it remain applied.
    pub async fn abort(self) -> Result<usize, RollbackError> {
        let Session {
            state,
            contract,
            undo,
            ..
        } = self;
        let total = undo.len();
        for (undone, call) in undo.into_iter().rev().enumerate() {
            for inverse in call.inverse() {
                if let Err(source) = inverse.execute(&mut *state, &contract).await {
                    error!(?call, ?inverse, undone, %source, "compensating call failed");
                    return Err(RollbackError {
                        undone,
                        call,
                        source,
                    });
                }
            }
        }
        if total > 0 {
            warn!(undone = total, "rolled back ledger calls");
        }
        Ok(total)
    }

    pub fn finish(self) -> Journal {
        self.journal
    }
}
